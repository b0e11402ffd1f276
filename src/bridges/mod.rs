//! Bridge configuration: which bridges are active and where they came from.

mod parse;
mod resolver;
mod settings;
mod source;

pub use parse::parse_bridge_lines;
pub use resolver::BridgeConfigResolver;
pub use settings::BridgeConfiguration;
pub use source::BridgeSource;
