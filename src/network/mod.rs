//! Network settings stored in the daemon next to the bridges: upstream proxy
//! and firewall port restrictions.

mod firewall;
mod parse;
mod proxy;

pub use firewall::FirewallSettings;
pub use parse::{parse_addr_port, parse_port, parse_port_list, parse_username_password};
pub use proxy::{ProxySettings, ProxyType};
