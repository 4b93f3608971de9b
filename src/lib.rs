//! Client for the ecobee thermostat API.
//!
//! [`auth::TokenProvider`] runs the ecobee PIN authorization and keeps the
//! access token fresh, caching it on disk through [`store::TokenStore`].
//! [`client::Client`] issues thermostat reads and updates with that token.

pub mod auth;
pub mod client;
pub mod credential;
pub mod error;
pub mod objects;
pub mod store;
pub mod transport;

pub use auth::{ClientIdentity, ConsolePrompt, CredentialState, PinPrompt, PinResponse, TokenProvider};
pub use client::Client;
pub use credential::Credential;
pub use error::{Error, ExchangeError, Result};
pub use store::TokenStore;
pub use transport::{HyperTransport, Transport, TransportError};
