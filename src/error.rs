use std::path::PathBuf;

use http::StatusCode;

use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to save token cache {}: {source}", path.display())]
    CachePersist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("network error: {0}")]
    Network(#[from] TransportError),

    #[error("authorization failed: {0}")]
    Authorization(#[source] ExchangeError),

    #[error("token refresh failed: {0}")]
    Refresh(#[source] ExchangeError),

    /// Non-zero `status.code` inside an API response envelope.
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("failed to decode API response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode API request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("got {found} thermostats for {id}, wanted 1")]
    ThermostatCount { id: String, found: usize },

    #[error("invalid thermostat time {value:?}")]
    ThermostatTime { value: String },

    #[error("invalid hold duration: {0}")]
    Duration(String),
}

/// Failure of a single exchange with the authorization or token endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid server response {status}{}", detail_suffix(.detail))]
    Status { status: StatusCode, detail: String },

    #[error("error decoding response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid token")]
    InvalidToken,

    #[error("PIN was not acknowledged: {0}")]
    Prompt(#[source] std::io::Error),
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}
