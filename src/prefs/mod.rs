//! Preference store holding the client-side half of the bridge state.
//!
//! The resolver only needs flat string keys, dotted into branches the way
//! Firefox preferences are:
//!
//! - `extensions.torlauncher.default_bridge_type` - selected builtin type
//! - `extensions.torlauncher.default_bridge.<type>.<n>` - builtin bridge table
//! - `extensions.torlauncher.bridgedb_bridge.<n>` - last bridges from BridgeDB

mod store;

pub use store::Preferences;

/// Selected builtin bridge type.
pub const PREF_DEFAULT_BRIDGE_TYPE: &str = "extensions.torlauncher.default_bridge_type";

/// Branch holding the builtin bridge table (`<type>.<n>`).
pub const PREF_BRANCH_DEFAULT_BRIDGE: &str = "extensions.torlauncher.default_bridge.";

/// Branch holding bridges previously distributed by BridgeDB (`<n>`).
pub const PREF_BRANCH_BRIDGEDB_BRIDGE: &str = "extensions.torlauncher.bridgedb_bridge.";

/// Result type for preference operations.
pub type PrefResult<T> = Result<T, PrefError>;

/// Errors from preference store operations.
#[derive(Debug, thiserror::Error)]
pub enum PrefError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed preference file: {0}")]
    Malformed(String),
    #[error("Preference store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value preference store.
///
/// Implementations must give read-after-write consistency within a process.
pub trait PreferenceStore: Send + Sync {
    /// Get a string preference, `None` when unset.
    fn get_string(&self, key: &str) -> PrefResult<Option<String>>;

    /// Set a string preference.
    fn set_string(&self, key: &str, value: &str) -> PrefResult<()>;

    /// Clear a user-set preference. Clearing an unset key is not an error.
    fn clear(&self, key: &str) -> PrefResult<()>;

    /// List keys under `prefix`, with the prefix stripped, in no particular order.
    fn child_keys(&self, prefix: &str) -> PrefResult<Vec<String>>;
}
