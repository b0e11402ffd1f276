//! Bridge acquisition from BridgeDB over the captcha-gated moat protocol.

mod http;
mod protocol;
mod pt;
mod session;
mod transport;

pub use http::{
    HttpMoatChannel, HttpMoatConnector, DEFAULT_FRONT, DEFAULT_MOAT_URL, DEFAULT_REFLECTOR,
    DEFAULT_TIMEOUT,
};
pub use pt::{parse_pt_line, ManagedTransport, PtMessage};
pub use session::{BridgeAcquisitionSession, SessionEvent, SessionState};
pub use transport::{
    Challenge, MeekClient, MoatChannel, MoatConnector, SubmitReply, TransportConfig,
    DEFAULT_BRIDGE_TYPE,
};

/// Result type for moat transport operations.
pub type MoatResult<T> = Result<T, MoatError>;

/// Errors from the moat transport. The session maps these onto
/// [`crate::BridgeError`] kinds depending on the step that failed.
#[derive(Debug, thiserror::Error)]
pub enum MoatError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Server error {code}: {detail}")]
    Server { code: u16, detail: String },
    #[error("Malformed response: {0}")]
    Protocol(String),
    #[error("Pluggable transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for MoatError {
    fn from(e: reqwest::Error) -> Self {
        MoatError::Http(e.to_string())
    }
}

impl From<std::io::Error> for MoatError {
    fn from(e: std::io::Error) -> Self {
        MoatError::Transport(e.to_string())
    }
}
