use thiserror::Error;

/// Errors raised while interpreting device or dashboard input.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("Unknown frame type: {0}")]
    UnknownFrame(String),

    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}
