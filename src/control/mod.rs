//! Tor daemon control channel.
//!
//! The daemon's own configuration (torrc + SETCONF) is the ground truth for
//! which bridges are active. Everything here goes through [`TorDaemon`], so
//! the resolver can run against a real control port or an in-memory fake.

mod client;
mod memory;
mod protocol;

pub use client::{ControlAuth, TorControlPort};
pub use memory::InMemoryTorDaemon;
pub use protocol::{quote_value, ControlReply};

use async_trait::async_trait;

/// Daemon configuration keys used by this crate.
pub mod keys {
    pub const USE_BRIDGES: &str = "UseBridges";
    pub const BRIDGE: &str = "Bridge";
    pub const CLIENT_TRANSPORT_PLUGIN: &str = "ClientTransportPlugin";
    pub const SOCKS4_PROXY: &str = "Socks4Proxy";
    pub const SOCKS5_PROXY: &str = "Socks5Proxy";
    pub const SOCKS5_PROXY_USERNAME: &str = "Socks5ProxyUsername";
    pub const SOCKS5_PROXY_PASSWORD: &str = "Socks5ProxyPassword";
    pub const HTTPS_PROXY: &str = "HTTPSProxy";
    pub const HTTPS_PROXY_AUTHENTICATOR: &str = "HTTPSProxyAuthenticator";
    pub const REACHABLE_ADDRESSES: &str = "ReachableAddresses";
}

/// Result type for control channel operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors from the daemon control channel.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// Non-2xx reply; carries the daemon's message verbatim.
    #[error("{code} {message}")]
    Rejected { code: u16, message: String },
    #[error("Malformed reply: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for ControlError {
    fn from(e: std::io::Error) -> Self {
        ControlError::Connection(e.to_string())
    }
}

/// One key in a SETCONF request. No values resets the key to its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfSetting {
    pub key: String,
    pub values: Vec<String>,
}

impl ConfSetting {
    /// Reset `key` to the daemon default.
    pub fn reset(key: &str) -> Self {
        Self {
            key: key.to_string(),
            values: Vec::new(),
        }
    }

    /// Set `key` to a single value.
    pub fn value(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            values: vec![value.into()],
        }
    }

    /// Set a repeatable `key` (like `Bridge`) to several values.
    pub fn values(key: &str, values: &[String]) -> Self {
        Self {
            key: key.to_string(),
            values: values.to_vec(),
        }
    }
}

/// Configuration access on a running Tor daemon.
///
/// A failed call aborts whatever read or write the caller was doing.
#[async_trait]
pub trait TorDaemon: Send + Sync {
    /// All values for `key`, empty when the key is unset.
    async fn get_conf(&self, key: &str) -> ControlResult<Vec<String>>;

    /// First value for `key`, `None` when unset or empty.
    async fn get_conf_str(&self, key: &str) -> ControlResult<Option<String>> {
        Ok(self
            .get_conf(key)
            .await?
            .into_iter()
            .find(|v| !v.is_empty()))
    }

    /// Apply all settings atomically (one SETCONF).
    async fn set_conf(&self, settings: &[ConfSetting]) -> ControlResult<()>;
}
