//! Firewall restrictions: the set of ports tor may connect out on.

use serde::Serialize;
use tracing::info;

use super::parse::parse_addr_port_list;
use crate::control::{keys, ConfSetting, TorDaemon};
use crate::error::{BridgeError, BridgeResult};

/// Allowed outgoing ports. Empty means unrestricted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FirewallSettings {
    pub allowed_ports: Vec<u16>,
}

impl FirewallSettings {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn allow(ports: Vec<u16>) -> Self {
        Self {
            allowed_ports: ports,
        }
    }

    pub fn is_restricted(&self) -> bool {
        !self.allowed_ports.is_empty()
    }

    /// Read `ReachableAddresses`, keeping only the ports.
    pub async fn read(daemon: &dyn TorDaemon) -> BridgeResult<Self> {
        let value = daemon
            .get_conf_str(keys::REACHABLE_ADDRESSES)
            .await
            .map_err(BridgeError::read)?;
        match value {
            Some(list) => Ok(Self::allow(
                parse_addr_port_list(&list).map_err(BridgeError::read)?,
            )),
            None => Ok(Self::unrestricted()),
        }
    }

    /// Write `ReachableAddresses` as `*:p1,*:p2`, or reset it when unrestricted.
    pub async fn write(&self, daemon: &dyn TorDaemon) -> BridgeResult<()> {
        let setting = if self.is_restricted() {
            ConfSetting::value(keys::REACHABLE_ADDRESSES, self.reachable_addresses())
        } else {
            ConfSetting::reset(keys::REACHABLE_ADDRESSES)
        };
        daemon
            .set_conf(&[setting])
            .await
            .map_err(BridgeError::write)?;
        info!("Firewall settings written: {:?}", self.allowed_ports);
        Ok(())
    }

    fn reachable_addresses(&self) -> String {
        self.allowed_ports
            .iter()
            .map(|port| format!("*:{}", port))
            .collect::<Vec<_>>()
            .join(",")
    }
}
