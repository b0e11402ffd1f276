//! Configuration management for torbridge using the prefer crate.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::ControlAuth;
use crate::moat::{
    HttpMoatConnector, DEFAULT_BRIDGE_TYPE, DEFAULT_FRONT, DEFAULT_MOAT_URL, DEFAULT_REFLECTOR,
};

/// Tor Browser's default control port.
pub const DEFAULT_CONTROL_ADDRESS: &str = "127.0.0.1:9151";

/// Default request timeout for the moat service in seconds.
pub const DEFAULT_MOAT_TIMEOUT_SECS: u64 = 60;

/// Tor control port connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_control_address")]
    pub address: String,
    /// Plaintext control password (`HashedControlPassword` in torrc).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Path to `control_auth_cookie`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_file: Option<String>,
}

fn default_control_address() -> String {
    DEFAULT_CONTROL_ADDRESS.to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            address: default_control_address(),
            password: None,
            cookie_file: None,
        }
    }
}

impl ControlConfig {
    /// Authentication method; a password takes precedence over a cookie.
    pub fn auth(&self) -> ControlAuth {
        if let Some(ref password) = self.password {
            ControlAuth::Password(password.clone())
        } else if let Some(ref cookie) = self.cookie_file {
            ControlAuth::Cookie(PathBuf::from(shellexpand::tilde(cookie).as_ref()))
        } else {
            ControlAuth::Null
        }
    }
}

/// BridgeDB moat endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoatConfig {
    #[serde(default = "default_moat_url")]
    pub url: String,
    /// Domain-fronting reflector meek connects through.
    #[serde(default = "default_reflector")]
    pub reflector: String,
    #[serde(default = "default_front")]
    pub front: String,
    /// Bridge type requested from the service.
    #[serde(default = "default_bridge_type")]
    pub bridge_type: String,
    #[serde(default = "default_moat_timeout")]
    pub timeout_secs: u64,
    /// `TOR_PT_STATE_LOCATION` for the meek client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,
}

fn default_moat_url() -> String {
    DEFAULT_MOAT_URL.to_string()
}

fn default_reflector() -> String {
    DEFAULT_REFLECTOR.to_string()
}

fn default_front() -> String {
    DEFAULT_FRONT.to_string()
}

fn default_bridge_type() -> String {
    DEFAULT_BRIDGE_TYPE.to_string()
}

fn default_moat_timeout() -> u64 {
    DEFAULT_MOAT_TIMEOUT_SECS
}

impl Default for MoatConfig {
    fn default() -> Self {
        Self {
            url: default_moat_url(),
            reflector: default_reflector(),
            front: default_front(),
            bridge_type: default_bridge_type(),
            timeout_secs: default_moat_timeout(),
            state_dir: None,
        }
    }
}

impl MoatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// PT state directory, defaulting to the data dir.
    pub fn state_dir(&self) -> PathBuf {
        match self.state_dir {
            Some(ref dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
            None => data_dir().join("pt_state"),
        }
    }

    /// HTTP connector for this endpoint.
    pub fn connector(&self) -> HttpMoatConnector {
        HttpMoatConnector::new(&self.url)
            .with_fronting(&self.reflector, &self.front)
            .with_state_dir(self.state_dir())
            .with_timeout(self.timeout())
    }
}

/// Configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub control: ControlConfig,
    /// Preference file path (`~` is expanded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<String>,
    #[serde(default)]
    pub moat: MoatConfig,
    /// Builtin bridge lines keyed by transport type.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub builtin_bridges: HashMap<String, Vec<String>>,
    /// Where this config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers torbridge config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("torbridge").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config {}: {}", path.display(), e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(_) => Self::default_with_env(),
        }
    }

    /// Create a default config with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML, and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        match ext {
            "toml" => {
                toml::from_str(contents).map_err(|e| format!("Failed to parse TOML config: {}", e))
            }
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Apply `TORBRIDGE_*` environment variables.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(address) = var("TORBRIDGE_CONTROL_ADDR") {
            self.control.address = address;
        }
        if let Some(password) = var("TORBRIDGE_CONTROL_PASSWORD") {
            self.control.password = Some(password);
        }
        if let Some(cookie) = var("TORBRIDGE_COOKIE_FILE") {
            self.control.cookie_file = Some(cookie);
        }
        if let Some(url) = var("TORBRIDGE_MOAT_URL") {
            self.moat.url = url;
        }
        if let Some(prefs) = var("TORBRIDGE_PREFS") {
            self.preferences = Some(prefs);
        }
        self
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.base_dir() {
            Some(base) => base.join(path),
            None => path.to_path_buf(),
        }
    }

    /// Preference file location.
    pub fn preferences_path(&self) -> PathBuf {
        match self.preferences {
            Some(ref path) => self.resolve_path(path),
            None => data_dir().join("prefs.json"),
        }
    }
}

/// Per-user data directory for torbridge.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("torbridge")
}
