use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use http::{Method, Request, StatusCode};
use http_body_util::Full;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use url::Url;

use crate::credential::{mask_token, Credential};
use crate::error::{Error, ExchangeError, Result};
use crate::store::TokenStore;
use crate::transport::Transport;

pub const DEFAULT_BASE_URL: &str = "https://api.ecobee.com/";
pub const SCOPES: &[&str] = &["smartRead", "smartWrite"];

/// Application key plus the token cache it owns.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub application_id: String,
    pub storage_location: PathBuf,
}

/// PIN and linked authorization code from the `/authorize` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PinResponse {
    #[serde(rename = "ecobeePin")]
    pub pin: String,
    pub code: String,
    #[serde(default)]
    pub scope: String,
    /// Minutes until the PIN lapses.
    #[serde(default)]
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    token_type: String,
}

impl TokenResponse {
    fn into_credential(self, now: DateTime<Utc>) -> Credential {
        Credential {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self.refresh_token,
            expiry: (self.expires_in > 0).then(|| now + Duration::seconds(self.expires_in)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Shows the PIN to the user and waits until they have entered it on the
/// ecobee portal.
#[async_trait]
pub trait PinPrompt: Send + Sync {
    async fn acknowledge(&self, pin: &PinResponse) -> std::io::Result<()>;
}

/// Prints the PIN and waits for <enter> on stdin.
pub struct ConsolePrompt;

#[async_trait]
impl PinPrompt for ConsolePrompt {
    async fn acknowledge(&self, pin: &PinResponse) -> std::io::Result<()> {
        println!(
            "Pin is {:?}\nPress <enter> after authorizing it on https://www.ecobee.com/consumerportal \
             in the menu under 'My Apps'",
            pin.pin
        );
        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        if read == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stdin closed before the PIN was confirmed",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    NoCredential,
    CredentialExpiredNoRefresh,
    CredentialExpiredHasRefresh,
    CredentialValid,
    AwaitingUserPin,
}

impl CredentialState {
    /// Classify a cached credential. Never yields `AwaitingUserPin`, which
    /// only exists while a PIN authorization is in flight.
    pub fn of(credential: &Credential, now: DateTime<Utc>) -> Self {
        if credential.is_valid_at(now) {
            Self::CredentialValid
        } else if credential.is_empty() {
            Self::NoCredential
        } else if credential.has_refresh_token() {
            Self::CredentialExpiredHasRefresh
        } else {
            Self::CredentialExpiredNoRefresh
        }
    }
}

/// Hands out a valid access credential, refreshing or running the PIN
/// authorization as needed.
///
/// The credential is guarded by an async mutex that stays locked across the
/// exchange and the save, so concurrent callers never refresh twice.
///
/// A failed save does not fail the call that obtained the credential. The
/// error is kept until [`take_persist_error`](Self::take_persist_error)
/// collects it.
pub struct TokenProvider {
    identity: ClientIdentity,
    store: TokenStore,
    transport: Arc<dyn Transport>,
    prompt: Arc<dyn PinPrompt>,
    base_url: Url,
    credential: Mutex<Credential>,
    persist_error: std::sync::Mutex<Option<Error>>,
}

impl TokenProvider {
    /// Create a provider, seeding it from the token cache.
    pub fn new(
        identity: ClientIdentity,
        transport: Arc<dyn Transport>,
        prompt: Arc<dyn PinPrompt>,
    ) -> Self {
        let store = TokenStore::new(identity.storage_location.clone());
        let credential = store.load();
        tracing::debug!(
            state = ?CredentialState::of(&credential, Utc::now()),
            cache = %store.path().display(),
            "loaded token cache"
        );
        Self {
            identity,
            store,
            transport,
            prompt,
            base_url: default_base_url(),
            credential: Mutex::new(credential),
            persist_error: std::sync::Mutex::new(None),
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Current state of the cached credential. Waits while an exchange is
    /// running, so `AwaitingUserPin` is never observed here.
    pub async fn state(&self) -> CredentialState {
        CredentialState::of(&*self.credential.lock().await, Utc::now())
    }

    /// Take the error from the last failed cache save, if any.
    ///
    /// The credential returned alongside it is valid for this process, but
    /// the next run will have to authorize again.
    pub fn take_persist_error(&self) -> Option<Error> {
        self.persist_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Return a valid credential, performing at most one exchange.
    ///
    /// A failed save of a fresh credential is recorded for
    /// [`take_persist_error`](Self::take_persist_error) instead of failing
    /// the call.
    pub async fn get_credential(&self) -> Result<Credential> {
        let mut credential = self.credential.lock().await;
        let state = CredentialState::of(&credential, Utc::now());

        let fresh = match state {
            CredentialState::CredentialValid => return Ok(credential.clone()),
            CredentialState::CredentialExpiredHasRefresh => {
                tracing::debug!(?state, "refreshing access token");
                self.refresh(&credential).await.map_err(Error::Refresh)?
            }
            CredentialState::NoCredential
            | CredentialState::CredentialExpiredNoRefresh
            | CredentialState::AwaitingUserPin => {
                tracing::debug!(?state, next = ?CredentialState::AwaitingUserPin, "starting PIN authorization");
                self.authorize().await.map_err(Error::Authorization)?
            }
        };

        tracing::debug!(
            access_token = %mask_token(&fresh.access_token),
            expiry = ?fresh.expiry,
            "obtained access token"
        );
        *credential = fresh;
        self.persist(&credential);
        Ok(credential.clone())
    }

    /// Request a new PIN without waiting for the user.
    pub async fn request_pin(&self) -> Result<PinResponse> {
        self.fetch_pin().await.map_err(Error::Authorization)
    }

    /// Exchange a code from an earlier [`request_pin`](Self::request_pin)
    /// and cache the resulting credential.
    pub async fn complete_authorization(&self, code: &str) -> Result<Credential> {
        let mut credential = self.credential.lock().await;
        *credential = self.exchange_code(code).await.map_err(Error::Authorization)?;
        self.persist(&credential);
        Ok(credential.clone())
    }

    async fn authorize(&self) -> std::result::Result<Credential, ExchangeError> {
        let pin = self.fetch_pin().await?;
        self.prompt
            .acknowledge(&pin)
            .await
            .map_err(ExchangeError::Prompt)?;
        self.exchange_code(&pin.code).await
    }

    async fn fetch_pin(&self) -> std::result::Result<PinResponse, ExchangeError> {
        let mut url = self.endpoint("authorize");
        url.query_pairs_mut()
            .append_pair("response_type", "ecobeePin")
            .append_pair("client_id", &self.identity.application_id)
            .append_pair("scope", &SCOPES.join(","));

        let body = self.call(Method::GET, url).await?;
        let pin: PinResponse = serde_json::from_slice(&body)?;
        tracing::debug!(expires_in = pin.expires_in, "received PIN");
        Ok(pin)
    }

    async fn exchange_code(&self, code: &str) -> std::result::Result<Credential, ExchangeError> {
        self.request_token(&[
            ("grant_type", "ecobeePin"),
            ("client_id", self.identity.application_id.as_str()),
            ("code", code),
        ])
        .await
    }

    async fn refresh(&self, current: &Credential) -> std::result::Result<Credential, ExchangeError> {
        let mut fresh = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.identity.application_id.as_str()),
                ("refresh_token", current.refresh_token.as_str()),
            ])
            .await?;
        if fresh.refresh_token.is_empty() {
            fresh.refresh_token.clone_from(&current.refresh_token);
        }
        Ok(fresh)
    }

    async fn request_token(
        &self,
        params: &[(&str, &str)],
    ) -> std::result::Result<Credential, ExchangeError> {
        let mut url = self.endpoint("token");
        url.query_pairs_mut().extend_pairs(params);

        let body = self.call(Method::POST, url).await?;
        let response: TokenResponse = serde_json::from_slice(&body)?;
        let now = Utc::now();
        let credential = response.into_credential(now);
        if !credential.is_valid_at(now) {
            return Err(ExchangeError::InvalidToken);
        }
        Ok(credential)
    }

    async fn call(&self, method: Method, url: Url) -> std::result::Result<Bytes, ExchangeError> {
        let request = Request::builder()
            .method(method)
            .uri(url.as_str())
            .body(Full::new(Bytes::new()))
            .map_err(crate::transport::TransportError::from)?;
        let response = self.transport.send(request).await?;

        if response.status() != StatusCode::OK {
            let detail = serde_json::from_slice::<TokenErrorResponse>(response.body())
                .map(|e| {
                    if e.error_description.is_empty() {
                        e.error
                    } else {
                        e.error_description
                    }
                })
                .unwrap_or_default();
            return Err(ExchangeError::Status {
                status: response.status(),
                detail,
            });
        }
        Ok(response.into_body())
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }

    fn persist(&self, credential: &Credential) {
        let outcome = self.store.save(credential).err();
        if let Some(err) = &outcome {
            tracing::warn!("{err}; the next run will need to authorize again");
        }
        *self
            .persist_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = outcome;
    }
}

pub(crate) fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("DEFAULT_BASE_URL is a valid URL")
}
