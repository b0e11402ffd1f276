//! Where the active bridges came from.

use serde::{Deserialize, Serialize};

/// Bridge provisioning strategy.
///
/// Never stored directly; [`BridgeConfigResolver::read_settings`] infers it
/// from the preference store and the daemon.
///
/// [`BridgeConfigResolver::read_settings`]: super::BridgeConfigResolver::read_settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeSource {
    /// No bridges; connect to public relays.
    #[default]
    None,
    /// Bridges bundled with the client, selected by transport type.
    Builtin,
    /// Bridges obtained from BridgeDB via the moat captcha flow.
    #[serde(rename = "bridgedb")]
    FromDistributionService,
    /// Bridges typed in by the user.
    #[serde(rename = "user")]
    UserProvided,
}

impl BridgeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeSource::None => "none",
            BridgeSource::Builtin => "builtin",
            BridgeSource::FromDistributionService => "bridgedb",
            BridgeSource::UserProvided => "user",
        }
    }
}

impl std::fmt::Display for BridgeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BridgeSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(BridgeSource::None),
            "builtin" => Ok(BridgeSource::Builtin),
            "bridgedb" | "distribution" => Ok(BridgeSource::FromDistributionService),
            "user" | "custom" => Ok(BridgeSource::UserProvided),
            other => Err(format!("unknown bridge source: {}", other)),
        }
    }
}
