use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth token pair cached between runs.
///
/// The on-disk form matches the token cache written by earlier ecobee
/// command-line tools, so existing caches keep working.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Valid iff there is an access token and `expiry` is strictly after `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expiry.is_some_and(|expiry| expiry > now)
    }

    /// True for the zero credential returned when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty() && self.refresh_token.is_empty()
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        let kind = if self.token_type.is_empty() {
            "Bearer"
        } else {
            self.token_type.as_str()
        };
        format!("{kind} {}", self.access_token)
    }
}

const TOKEN_MASK_PREFIX_LEN: usize = 4;
const TOKEN_MASK_SUFFIX_LEN: usize = 4;

/// Short form of a token that is safe to log.
pub(crate) fn mask_token(token: &str) -> String {
    let len = token.len();
    if len <= TOKEN_MASK_PREFIX_LEN + TOKEN_MASK_SUFFIX_LEN || !token.is_ascii() {
        return "*".repeat(len.min(8));
    }
    format!(
        "{}...{}",
        &token[..TOKEN_MASK_PREFIX_LEN],
        &token[len - TOKEN_MASK_SUFFIX_LEN..]
    )
}
