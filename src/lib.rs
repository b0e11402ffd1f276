//! torbridge - Tor bridge configuration and BridgeDB bridge acquisition.
//!
//! [`BridgeConfigResolver`] works out which bridges tor is using and where
//! they came from, and writes a new choice back to the daemon and the
//! preference store. [`BridgeAcquisitionSession`] requests fresh bridges from
//! BridgeDB over the captcha-gated moat protocol.

pub mod bridges;
pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod moat;
pub mod network;
pub mod prefs;

pub use bridges::{BridgeConfigResolver, BridgeConfiguration, BridgeSource};
pub use error::{BridgeError, BridgeResult};
pub use moat::{BridgeAcquisitionSession, SessionEvent, SessionState, TransportConfig};
