//! Transport seam between the acquisition session and the distribution
//! service.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine;
use tracing::debug;

use super::MoatResult;
use crate::error::{BridgeError, BridgeResult};

/// Bridge type requested when the caller does not pick one.
pub const DEFAULT_BRIDGE_TYPE: &str = "obfs4";

/// A captcha challenge handed out by the distribution service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Transport the bridges will be for.
    pub transport: String,
    /// Opaque token echoed back with the solution.
    pub token: String,
    /// JPEG image bytes.
    pub image: Vec<u8>,
}

impl Challenge {
    /// The image as a `data:` URI suitable for an `<img>` element.
    pub fn image_data_uri(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.image)
        )
    }
}

/// Answer from the service to a submitted solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitReply {
    Bridges(Vec<String>),
    Incorrect,
}

/// Managed meek client taken from a `ClientTransportPlugin` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeekClient {
    /// `meek` or `meek_lite`.
    pub transport: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
}

/// How to reach the distribution service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Domain-fronting client, `None` to connect directly.
    pub meek: Option<MeekClient>,
    /// Upstream proxy URI (`socks4a://`, `socks5://`, `http://`).
    pub proxy_uri: Option<String>,
    /// Bridge type asked for in the challenge request.
    pub bridge_type: String,
}

impl TransportConfig {
    /// Connect to the service without a pluggable transport.
    pub fn direct(proxy_uri: Option<String>) -> Self {
        Self {
            meek: None,
            proxy_uri,
            bridge_type: DEFAULT_BRIDGE_TYPE.to_string(),
        }
    }

    /// Find the meek client among the daemon's `ClientTransportPlugin`
    /// values (`<t1,t2> exec <path> <args...>`).
    ///
    /// `meek` is preferred over `meek_lite` within a line; when several lines
    /// name a meek transport the last one wins.
    pub fn from_client_transport_plugins(
        lines: &[String],
        proxy_uri: Option<String>,
    ) -> BridgeResult<Self> {
        let mut meek = None;
        for line in lines {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 3 || tokens[1] != "exec" {
                continue;
            }
            let transports: Vec<&str> = tokens[0].split(',').map(str::trim).collect();
            let transport = ["meek", "meek_lite"]
                .into_iter()
                .find(|name| transports.contains(name));
            if let Some(transport) = transport {
                debug!("Found {} client: {}", transport, tokens[2]);
                meek = Some(MeekClient {
                    transport: transport.to_string(),
                    executable: PathBuf::from(tokens[2]),
                    args: tokens[3..].iter().map(|s| s.to_string()).collect(),
                });
            }
        }

        let meek = meek.ok_or_else(|| {
            BridgeError::TransportInit(
                "no meek or meek_lite transport in ClientTransportPlugin".to_string(),
            )
        })?;

        Ok(Self {
            meek: Some(meek),
            ..Self::direct(proxy_uri)
        })
    }

    pub fn with_bridge_type(mut self, bridge_type: &str) -> Self {
        self.bridge_type = bridge_type.to_string();
        self
    }
}

/// Opens channels to the distribution service.
#[async_trait]
pub trait MoatConnector: Send + Sync {
    async fn connect(&self, config: &TransportConfig) -> MoatResult<Box<dyn MoatChannel>>;
}

/// One open connection to the distribution service.
///
/// Dropping a channel must release whatever it holds; `close` does the same
/// eagerly.
#[async_trait]
pub trait MoatChannel: Send {
    async fn fetch_challenge(&mut self, bridge_types: &[String]) -> MoatResult<Challenge>;

    async fn submit(&mut self, challenge: &Challenge, solution: &str) -> MoatResult<SubmitReply>;

    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_image_data_uri() {
        let challenge = Challenge {
            transport: "obfs4".into(),
            token: "t".into(),
            image: vec![0xff, 0xd8, 0xff],
        };
        assert_eq!(challenge.image_data_uri(), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn test_prefers_meek_over_meek_lite() {
        let config = TransportConfig::from_client_transport_plugins(
            &lines(&["meek_lite,meek exec /usr/bin/meek-client --log x"]),
            None,
        )
        .unwrap();
        let meek = config.meek.unwrap();
        assert_eq!(meek.transport, "meek");
        assert_eq!(meek.executable, PathBuf::from("/usr/bin/meek-client"));
        assert_eq!(meek.args, ["--log", "x"]);
    }

    #[test]
    fn test_last_matching_line_wins() {
        let config = TransportConfig::from_client_transport_plugins(
            &lines(&[
                "meek exec /first",
                "obfs4,meek_lite exec /usr/bin/obfs4proxy",
                "snowflake exec /usr/bin/snowflake-client",
                "obfs4 socks5 127.0.0.1:9000",
            ]),
            Some("socks5://127.0.0.1:1080".into()),
        )
        .unwrap();
        let meek = config.meek.unwrap();
        assert_eq!(meek.transport, "meek_lite");
        assert_eq!(meek.executable, PathBuf::from("/usr/bin/obfs4proxy"));
        assert!(meek.args.is_empty());
        assert_eq!(config.proxy_uri.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(config.bridge_type, DEFAULT_BRIDGE_TYPE);
    }

    #[test]
    fn test_no_meek_is_transport_init_error() {
        let err = TransportConfig::from_client_transport_plugins(
            &lines(&["obfs4 exec /usr/bin/obfs4proxy"]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::TransportInit(_)));
    }
}
