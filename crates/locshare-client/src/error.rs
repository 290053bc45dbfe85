use locshare_shared::{CryptoError, ProtocolError};
use locshare_store::StoreError;
use thiserror::Error;

use crate::auth::HandshakeStage;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No identity found. Generate keys first.")]
    MissingIdentity,

    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server rejected the bearer token")]
    Unauthorized,

    #[error("Server returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Key verification failed for {requested}: {reason}")]
    VerificationFailed { requested: String, reason: String },

    #[error("Decryption failed: {0}")]
    DecryptFailed(#[source] CryptoError),

    #[error("Failed to fetch groups: {0}")]
    GroupFetchFailed(#[source] Box<ClientError>),

    #[error("Authentication failed while {stage}: {source}")]
    AuthFailed {
        stage: HandshakeStage,
        source: Box<ClientError>,
    },

    #[error("Location post failed for all {attempted} groups")]
    AllPostsFailed { attempted: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// True when the user has to (re)authenticate before retrying.
    pub fn is_auth_problem(&self) -> bool {
        match self {
            ClientError::Unauthorized | ClientError::NotAuthenticated(_) => true,
            ClientError::GroupFetchFailed(inner) => inner.is_auth_problem(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Network(e.to_string())
    }
}
