//! Proxy and firewall commands.

use console::style;

use crate::network::{parse_addr_port, parse_port_list, FirewallSettings, ProxySettings, ProxyType};

use super::CommandContext;

pub async fn cmd_proxy_show(ctx: &CommandContext) -> anyhow::Result<()> {
    let proxy = ProxySettings::read(ctx.daemon.as_ref()).await?;
    match proxy.proxy_type {
        ProxyType::None => println!("No proxy configured."),
        _ => {
            println!(
                "{} {}:{}",
                style(proxy.proxy_type).cyan(),
                proxy.address,
                proxy.port
            );
            if !proxy.username.is_empty() {
                println!("Username: {}", proxy.username);
            }
        }
    }
    Ok(())
}

pub async fn cmd_proxy_set(
    ctx: &CommandContext,
    proxy_type: ProxyType,
    address: &str,
    username: Option<&str>,
    password: Option<&str>,
) -> anyhow::Result<()> {
    let (host, port) = parse_addr_port(address)?;
    let username = username.unwrap_or_default();
    let password = password.unwrap_or_default();

    let proxy = match proxy_type {
        ProxyType::None => ProxySettings::none(),
        ProxyType::Socks4 => {
            if !username.is_empty() {
                anyhow::bail!("SOCKS4 proxies do not support authentication");
            }
            ProxySettings::socks4(&host, port)
        }
        ProxyType::Socks5 => ProxySettings::socks5(&host, port, username, password),
        ProxyType::Https => ProxySettings::https(&host, port, username, password),
    };
    proxy.write(ctx.daemon.as_ref()).await?;
    println!("{} Proxy set to {}", style("✓").green(), proxy.proxy_type);
    Ok(())
}

pub async fn cmd_proxy_clear(ctx: &CommandContext) -> anyhow::Result<()> {
    ProxySettings::none().write(ctx.daemon.as_ref()).await?;
    println!("{} Proxy removed", style("✓").green());
    Ok(())
}

pub async fn cmd_firewall_show(ctx: &CommandContext) -> anyhow::Result<()> {
    let firewall = FirewallSettings::read(ctx.daemon.as_ref()).await?;
    if firewall.is_restricted() {
        let ports: Vec<String> = firewall
            .allowed_ports
            .iter()
            .map(|p| p.to_string())
            .collect();
        println!("Allowed ports: {}", ports.join(", "));
    } else {
        println!("All ports allowed.");
    }
    Ok(())
}

pub async fn cmd_firewall_set(ctx: &CommandContext, ports: &str) -> anyhow::Result<()> {
    let ports = parse_port_list(ports)?;
    if ports.is_empty() {
        anyhow::bail!("No ports given; use `firewall clear` to allow all ports");
    }
    FirewallSettings::allow(ports)
        .write(ctx.daemon.as_ref())
        .await?;
    println!("{} Firewall settings saved", style("✓").green());
    Ok(())
}

pub async fn cmd_firewall_clear(ctx: &CommandContext) -> anyhow::Result<()> {
    FirewallSettings::unrestricted()
        .write(ctx.daemon.as_ref())
        .await?;
    println!("{} All ports allowed", style("✓").green());
    Ok(())
}
