//! Bridge configuration value type.

use serde::Serialize;

use super::parse::parse_bridge_lines;
use super::BridgeSource;

/// One canonical bridge configuration.
///
/// Fields are private so the source/type/lines invariants hold:
/// `builtin_type` is set only for [`BridgeSource::Builtin`], and the lines
/// are empty for [`BridgeSource::None`]. A builtin type unknown to the table
/// yields a `Builtin` configuration with no lines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BridgeConfiguration {
    source: BridgeSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    builtin_type: Option<String>,
    bridge_lines: Vec<String>,
}

impl BridgeConfiguration {
    /// No bridges.
    pub fn none() -> Self {
        Self::default()
    }

    /// Builtin bridges of `bridge_type` with the lines already looked up.
    ///
    /// An empty type means nothing is selected and yields [`Self::none`].
    pub fn builtin(bridge_type: &str, lines: Vec<String>) -> Self {
        if bridge_type.is_empty() {
            return Self::none();
        }
        Self {
            source: BridgeSource::Builtin,
            builtin_type: Some(bridge_type.to_string()),
            bridge_lines: lines,
        }
    }

    /// Bridges handed out by BridgeDB. No lines yields [`Self::none`].
    pub fn from_distribution_service(lines: Vec<String>) -> Self {
        Self::with_lines(BridgeSource::FromDistributionService, lines)
    }

    /// Bridges entered by the user. No lines yields [`Self::none`].
    pub fn user_provided(lines: Vec<String>) -> Self {
        Self::with_lines(BridgeSource::UserProvided, lines)
    }

    /// Like [`Self::from_distribution_service`], from newline-separated text.
    pub fn from_distribution_service_text(text: &str) -> Self {
        Self::from_distribution_service(parse_bridge_lines(text))
    }

    /// Like [`Self::user_provided`], from newline-separated text.
    pub fn user_provided_text(text: &str) -> Self {
        Self::user_provided(parse_bridge_lines(text))
    }

    fn with_lines(source: BridgeSource, lines: Vec<String>) -> Self {
        if lines.is_empty() {
            return Self::none();
        }
        Self {
            source,
            builtin_type: None,
            bridge_lines: lines,
        }
    }

    pub fn source(&self) -> BridgeSource {
        self.source
    }

    /// Selected builtin type, only for [`BridgeSource::Builtin`].
    pub fn builtin_type(&self) -> Option<&str> {
        self.builtin_type.as_deref()
    }

    pub fn bridge_lines(&self) -> &[String] {
        &self.bridge_lines
    }

    /// Lines joined for display in a text area.
    pub fn bridge_text(&self) -> String {
        self.bridge_lines.join("\n")
    }

    /// Whether the daemon should be told to use bridges.
    pub fn uses_bridges(&self) -> bool {
        self.source != BridgeSource::None
    }
}
