//! Bridge configuration commands.

use console::style;

use crate::bridges::{BridgeConfiguration, BridgeSource};

use super::CommandContext;

/// Print a configuration the way `bridges show` does.
pub fn print_configuration(config: &BridgeConfiguration) {
    let source = match config.builtin_type() {
        Some(bridge_type) => format!("{} ({})", config.source(), bridge_type),
        None => config.source().to_string(),
    };
    println!("\n{}", style("Bridges").bold());
    println!("{}", "-".repeat(60));
    println!("Source: {}", style(source).cyan());

    if config.source() == BridgeSource::None {
        println!("Bridges are disabled.");
        return;
    }
    if config.bridge_lines().is_empty() {
        println!(
            "{} No bridge lines known for this type",
            style("!").yellow()
        );
    }
    for line in config.bridge_lines() {
        println!("  {}", line);
    }
}

/// Show the active bridge configuration.
pub async fn cmd_show(ctx: &CommandContext) -> anyhow::Result<()> {
    let config = ctx.resolver.read_settings().await?;
    print_configuration(&config);
    Ok(())
}

/// List builtin bridge types.
pub fn cmd_types(ctx: &CommandContext) -> anyhow::Result<()> {
    let types = ctx.resolver.builtin_types()?;
    if types.is_empty() {
        println!(
            "{} No builtin bridges configured. Add them under [builtin_bridges] in the config.",
            style("!").yellow()
        );
        return Ok(());
    }

    let selected = ctx.resolver.selected_builtin_type()?;
    for bridge_type in types {
        let marker = if selected.as_deref() == Some(bridge_type.as_str()) {
            style("*").green().to_string()
        } else {
            " ".to_string()
        };
        println!("{} {}", marker, bridge_type);
    }
    Ok(())
}

/// Write a configuration and confirm it.
pub async fn cmd_set(ctx: &CommandContext, config: &BridgeConfiguration) -> anyhow::Result<()> {
    ctx.resolver.write_settings(config).await?;
    println!(
        "{} Bridge configuration saved: {}",
        style("✓").green(),
        config.source()
    );
    Ok(())
}
