use thiserror::Error;

pub type SdkResult<T> = Result<T, SdkError>;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid identifier, expected tenant$channelId, got: {0}")]
    InvalidIdentifier(String),

    #[error("PushApp not initialized. Call initialize() first.")]
    NotInitialized,

    #[error("No userId or guestId available")]
    NoIdentity,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for SdkError {
    fn from(err: config::ConfigError) -> Self {
        SdkError::Config(err.to_string())
    }
}
