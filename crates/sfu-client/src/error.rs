use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("transport closed")]
    TransportClosed,
    #[error("malformed gateway message: {0}")]
    MalformedMessage(#[source] serde_json::Error),
    #[error("failed to encode request: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("transaction '{0}' is already outstanding")]
    DuplicateTransaction(String),
    #[error("no gateway session has been established")]
    NoSession,
    #[error("media peer error: {0}")]
    Media(#[from] anyhow::Error),
}
