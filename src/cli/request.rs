//! Interactive bridge request from BridgeDB.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use console::{style, Term};

use crate::bridges::BridgeConfiguration;
use crate::control::keys;
use crate::moat::{BridgeAcquisitionSession, TransportConfig};
use crate::network::ProxySettings;

use super::bridges::print_configuration;
use super::CommandContext;

/// Request bridges, prompting for captcha answers until one is accepted.
pub async fn cmd_request(
    ctx: &CommandContext,
    direct: bool,
    image: Option<PathBuf>,
) -> anyhow::Result<()> {
    let proxy_uri = ProxySettings::read(ctx.daemon.as_ref()).await?.proxy_uri();
    let transport = if direct {
        TransportConfig::direct(proxy_uri)
    } else {
        let plugins = ctx
            .daemon
            .get_conf(keys::CLIENT_TRANSPORT_PLUGIN)
            .await
            .context("Failed to read ClientTransportPlugin")?;
        TransportConfig::from_client_transport_plugins(&plugins, proxy_uri)?
    }
    .with_bridge_type(&ctx.config.moat.bridge_type);

    let image_path = image.unwrap_or_else(|| std::env::temp_dir().join("torbridge-captcha.jpg"));
    let connector = ctx.config.moat.connector();
    println!("Contacting BridgeDB at {}...", connector.url());
    let mut session = BridgeAcquisitionSession::new(Arc::new(connector));
    let term = Term::stdout();

    fetch_challenge(&mut session, &transport, &image_path).await?;

    loop {
        term.write_str(&format!(
            "{} ",
            style("Solution (r = new captcha, q = quit):").bold()
        ))?;
        let answer = term.read_line()?;

        match answer.trim() {
            "q" => {
                session.close().await;
                println!("{} Cancelled", style("!").yellow());
                return Ok(());
            }
            "r" => {
                fetch_challenge(&mut session, &transport, &image_path).await?;
                continue;
            }
            _ => {}
        }

        match session.submit_solution(&answer).await {
            Ok(None) => continue,
            Ok(Some(lines)) => {
                let config = BridgeConfiguration::from_distribution_service(lines);
                ctx.resolver.write_settings(&config).await?;
                println!("{} Received new bridges", style("✓").green());
                print_configuration(&config);
                return Ok(());
            }
            Err(e) if e.is_recoverable() => {
                println!("{} {}", style("✗").red(), e);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn fetch_challenge(
    session: &mut BridgeAcquisitionSession,
    transport: &TransportConfig,
    image_path: &Path,
) -> anyhow::Result<()> {
    let challenge = session.request_challenge(transport).await?;
    tokio::fs::write(image_path, &challenge.image)
        .await
        .with_context(|| format!("Failed to write captcha to {}", image_path.display()))?;
    println!(
        "{} Captcha saved to {}",
        style("→").cyan(),
        image_path.display()
    );
    Ok(())
}
