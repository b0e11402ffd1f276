//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod bridges;
mod network;
mod request;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::debug;

use crate::bridges::{BridgeConfigResolver, BridgeConfiguration};
use crate::config::Config;
use crate::control::{TorControlPort, TorDaemon};
use crate::network::ProxyType;
use crate::prefs::Preferences;

#[derive(Parser)]
#[command(name = "torbridge")]
#[command(about = "Configure and request Tor bridges")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Bridge configuration
    Bridges {
        #[command(subcommand)]
        command: BridgeCommands,
    },

    /// Upstream proxy settings
    Proxy {
        #[command(subcommand)]
        command: ProxyCommands,
    },

    /// Firewall port restrictions
    Firewall {
        #[command(subcommand)]
        command: FirewallCommands,
    },
}

#[derive(Subcommand)]
enum BridgeCommands {
    /// Show the active bridge configuration
    Show,

    /// List builtin bridge types
    Types,

    /// Change the bridge configuration
    Set {
        #[command(subcommand)]
        source: SetBridges,
    },

    /// Request bridges from BridgeDB (solves a captcha)
    Request {
        /// Connect to BridgeDB without meek domain fronting
        #[arg(long)]
        direct: bool,
        /// Where to save the captcha image
        #[arg(long)]
        image: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SetBridges {
    /// Disable bridges
    None,
    /// Use builtin bridges of a type
    Builtin {
        /// Bridge type (see `bridges types`)
        bridge_type: String,
    },
    /// Use bridge lines you provide
    User {
        /// Bridge lines, one per argument
        #[arg(required = true)]
        lines: Vec<String>,
    },
    /// Use bridge lines obtained from BridgeDB
    Bridgedb {
        /// Bridge lines, one per argument
        #[arg(required = true)]
        lines: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ProxyCommands {
    /// Show the configured proxy
    Show,
    /// Configure a proxy
    Set {
        #[arg(value_enum)]
        proxy_type: ProxyType,
        /// ADDRESS:PORT
        address: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long, env = "TORBRIDGE_PROXY_PASSWORD")]
        password: Option<String>,
    },
    /// Remove the proxy
    Clear,
}

#[derive(Subcommand)]
enum FirewallCommands {
    /// Show allowed ports
    Show,
    /// Only allow these ports (comma separated)
    Set { ports: String },
    /// Allow all ports
    Clear,
}

/// Shared state for commands: config plus open stores.
pub(crate) struct CommandContext {
    pub config: Config,
    pub daemon: Arc<dyn TorDaemon>,
    pub resolver: BridgeConfigResolver,
}

impl CommandContext {
    async fn open(config: Config) -> anyhow::Result<Self> {
        let address = config.control.address.clone();
        let port = TorControlPort::connect(&address, &config.control.auth())
            .await
            .with_context(|| format!("Failed to connect to Tor control port {}", address))?;
        debug!("Connected to Tor control port {}", port.address());
        let daemon: Arc<dyn TorDaemon> = Arc::new(port);

        let prefs_path = config.preferences_path();
        let prefs = Preferences::open(&prefs_path)
            .with_context(|| format!("Failed to open preferences {}", prefs_path.display()))?
            .with_builtin_bridges(&config.builtin_bridges);
        if let Some(path) = prefs.path() {
            debug!("Using preferences at {}", path.display());
        }

        let resolver = BridgeConfigResolver::new(Arc::new(prefs), daemon.clone());
        Ok(Self {
            config,
            daemon,
            resolver,
        })
    }
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load_from_path(path)
            .await
            .map_err(anyhow::Error::msg)?,
        None => Config::load().await,
    };
    let ctx = CommandContext::open(config).await?;

    match cli.command {
        Commands::Bridges { command } => match command {
            BridgeCommands::Show => bridges::cmd_show(&ctx).await,
            BridgeCommands::Types => bridges::cmd_types(&ctx),
            BridgeCommands::Set { source } => {
                let config = match source {
                    SetBridges::None => BridgeConfiguration::none(),
                    SetBridges::Builtin { bridge_type } => {
                        ctx.resolver.select_builtin(&bridge_type)?
                    }
                    SetBridges::User { lines } => {
                        BridgeConfiguration::user_provided_text(&lines.join("\n"))
                    }
                    SetBridges::Bridgedb { lines } => {
                        BridgeConfiguration::from_distribution_service_text(
                            &lines.join("\n"),
                        )
                    }
                };
                bridges::cmd_set(&ctx, &config).await
            }
            BridgeCommands::Request { direct, image } => {
                request::cmd_request(&ctx, direct, image).await
            }
        },
        Commands::Proxy { command } => match command {
            ProxyCommands::Show => network::cmd_proxy_show(&ctx).await,
            ProxyCommands::Set {
                proxy_type,
                address,
                username,
                password,
            } => {
                network::cmd_proxy_set(
                    &ctx,
                    proxy_type,
                    &address,
                    username.as_deref(),
                    password.as_deref(),
                )
                .await
            }
            ProxyCommands::Clear => network::cmd_proxy_clear(&ctx).await,
        },
        Commands::Firewall { command } => match command {
            FirewallCommands::Show => network::cmd_firewall_show(&ctx).await,
            FirewallCommands::Set { ports } => network::cmd_firewall_set(&ctx, &ports).await,
            FirewallCommands::Clear => network::cmd_firewall_clear(&ctx).await,
        },
    }
}
