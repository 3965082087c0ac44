use crate::types::Handle;

/// Errors raised by the stream bridge
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    #[error("handle {0} is not bound")]
    UnboundHandle(Handle),

    #[error("handle {0} already has a read in flight")]
    ReadInFlight(Handle),

    #[error("message channel closed")]
    ChannelClosed,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("fetch failed for {locator}: {reason}")]
    Fetch { locator: String, reason: String },

    #[error("random source unavailable: {0}")]
    Random(String),

    #[error("interpreter error: {0}")]
    Interpreter(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        BridgeError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Malformed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
