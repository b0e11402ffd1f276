//! Upstream proxy tor uses to reach the network.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::parse::{parse_addr_port, parse_username_password};
use crate::control::{keys, ConfSetting, TorDaemon};
use crate::error::{BridgeError, BridgeResult};

/// Proxy protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    None,
    Socks4,
    Socks5,
    Https,
}

impl std::fmt::Display for ProxyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyType::None => write!(f, "none"),
            ProxyType::Socks4 => write!(f, "socks4"),
            ProxyType::Socks5 => write!(f, "socks5"),
            ProxyType::Https => write!(f, "https"),
        }
    }
}

/// Proxy settings as stored in the daemon's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ProxySettings {
    pub proxy_type: ProxyType,
    pub address: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl ProxySettings {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn socks4(address: &str, port: u16) -> Self {
        Self {
            proxy_type: ProxyType::Socks4,
            address: address.to_string(),
            port,
            ..Default::default()
        }
    }

    pub fn socks5(address: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            proxy_type: ProxyType::Socks5,
            address: address.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn https(address: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            proxy_type: ProxyType::Https,
            ..Self::socks5(address, port, username, password)
        }
    }

    /// Read the first configured proxy, checking SOCKS4, SOCKS5, then HTTPS.
    pub async fn read(daemon: &dyn TorDaemon) -> BridgeResult<Self> {
        if let Some(addr) = conf_str(daemon, keys::SOCKS4_PROXY).await? {
            let (address, port) = parse_addr_port(&addr).map_err(BridgeError::read)?;
            return Ok(Self::socks4(&address, port));
        }

        if let Some(addr) = conf_str(daemon, keys::SOCKS5_PROXY).await? {
            let (address, port) = parse_addr_port(&addr).map_err(BridgeError::read)?;
            let username = conf_str(daemon, keys::SOCKS5_PROXY_USERNAME)
                .await?
                .unwrap_or_default();
            let password = conf_str(daemon, keys::SOCKS5_PROXY_PASSWORD)
                .await?
                .unwrap_or_default();
            return Ok(Self::socks5(&address, port, &username, &password));
        }

        if let Some(addr) = conf_str(daemon, keys::HTTPS_PROXY).await? {
            let (address, port) = parse_addr_port(&addr).map_err(BridgeError::read)?;
            let (username, password) =
                match conf_str(daemon, keys::HTTPS_PROXY_AUTHENTICATOR).await? {
                    Some(auth) => parse_username_password(&auth).map_err(BridgeError::read)?,
                    None => (String::new(), String::new()),
                };
            return Ok(Self::https(&address, port, &username, &password));
        }

        Ok(Self::none())
    }

    /// Reset every proxy key, then set the ones for this proxy type.
    pub async fn write(&self, daemon: &dyn TorDaemon) -> BridgeResult<()> {
        let mut settings: Vec<ConfSetting> = [
            keys::SOCKS4_PROXY,
            keys::SOCKS5_PROXY,
            keys::SOCKS5_PROXY_USERNAME,
            keys::SOCKS5_PROXY_PASSWORD,
            keys::HTTPS_PROXY,
            keys::HTTPS_PROXY_AUTHENTICATOR,
        ]
        .into_iter()
        .map(ConfSetting::reset)
        .collect();

        let addr = format!("{}:{}", self.address, self.port);
        let mut set = |key: &str, value: String| {
            if let Some(setting) = settings.iter_mut().find(|s| s.key == key) {
                setting.values = vec![value];
            }
        };
        match self.proxy_type {
            ProxyType::None => {}
            ProxyType::Socks4 => set(keys::SOCKS4_PROXY, addr),
            ProxyType::Socks5 => {
                set(keys::SOCKS5_PROXY, addr);
                if !self.username.is_empty() {
                    set(keys::SOCKS5_PROXY_USERNAME, self.username.clone());
                    set(keys::SOCKS5_PROXY_PASSWORD, self.password.clone());
                }
            }
            ProxyType::Https => {
                set(keys::HTTPS_PROXY, addr);
                if !self.username.is_empty() {
                    set(
                        keys::HTTPS_PROXY_AUTHENTICATOR,
                        format!("{}:{}", self.username, self.password),
                    );
                }
            }
        }

        daemon
            .set_conf(&settings)
            .await
            .map_err(BridgeError::write)?;
        info!("Proxy settings written: {}", self.proxy_type);
        Ok(())
    }

    /// Proxy URI for clients outside tor (the moat transport).
    pub fn proxy_uri(&self) -> Option<String> {
        let auth = if self.username.is_empty() {
            String::new()
        } else {
            format!(
                "{}:{}@",
                urlencoding::encode(&self.username),
                urlencoding::encode(&self.password)
            )
        };
        match self.proxy_type {
            ProxyType::None => None,
            ProxyType::Socks4 => Some(format!("socks4a://{}:{}", self.address, self.port)),
            ProxyType::Socks5 => Some(format!(
                "socks5://{}{}:{}",
                auth, self.address, self.port
            )),
            ProxyType::Https => Some(format!("http://{}{}:{}", auth, self.address, self.port)),
        }
    }
}

async fn conf_str(daemon: &dyn TorDaemon, key: &str) -> BridgeResult<Option<String>> {
    daemon.get_conf_str(key).await.map_err(BridgeError::read)
}
