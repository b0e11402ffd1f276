//! Error types surfaced by the bridge resolver and acquisition session.

use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors from bridge configuration and acquisition.
///
/// Every message is meant to be shown to the user as-is.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The daemon or preference store could not be read, or replied with garbage.
    #[error("Failed to read bridge configuration: {0}")]
    ConfigRead(String),
    /// A write to the daemon or preference store failed. Earlier steps of
    /// the same write may already have been applied.
    #[error("Failed to write bridge configuration: {0}")]
    ConfigWrite(String),
    #[error("Failed to initialize transport: {0}")]
    TransportInit(String),
    #[error("Failed to fetch captcha challenge: {0}")]
    ChallengeFetch(String),
    #[error("The captcha solution was incorrect")]
    CaptchaIncorrect,
    #[error("Failed to obtain bridges: {0}")]
    Submit(String),
    #[error("Invalid session state: {0}")]
    InvalidState(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BridgeError {
    /// Whether the current session can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BridgeError::CaptchaIncorrect)
    }

    pub(crate) fn read(e: impl std::fmt::Display) -> Self {
        BridgeError::ConfigRead(e.to_string())
    }

    pub(crate) fn write(e: impl std::fmt::Display) -> Self {
        BridgeError::ConfigWrite(e.to_string())
    }
}
