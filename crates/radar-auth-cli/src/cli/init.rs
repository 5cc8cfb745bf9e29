/*
[INPUT]:  Interactive user input via CLI
[OUTPUT]: Generated YAML auth configuration file
[POS]:    CLI initialization layer
[UPDATE]: When AuthConfig schema changes
*/

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Input, Select, theme::ColorfulTheme};
use radar_auth::AuthConfig;
use std::path::PathBuf;

const NETWORKS: &[(&str, u64)] = &[("Scroll Sepolia", 534351), ("Scroll", 534352)];

pub fn run_init(output: PathBuf) -> Result<()> {
    println!("{}", style("Welcome to Radar Auth Init").bold().cyan());
    println!(
        "{}",
        style("This will guide you through creating a sign-in configuration.").dim()
    );

    let theme = ColorfulTheme::default();
    let defaults = AuthConfig::default();

    println!("\n{}", style("--- Backend ---").bold());
    let base_url: String = Input::with_theme(&theme)
        .with_prompt("Backend base URL")
        .default(defaults.base_url.clone())
        .interact_text()?;

    println!("\n{}", style("--- Sign-in binding ---").bold());
    let domain: String = Input::with_theme(&theme)
        .with_prompt("Expected domain")
        .default(defaults.domain.clone())
        .interact_text()?;

    let uri: String = Input::with_theme(&theme)
        .with_prompt("Expected origin URI")
        .default(defaults.uri.clone())
        .interact_text()?;

    let labels: Vec<String> = NETWORKS
        .iter()
        .map(|(name, id)| format!("{name} ({id})"))
        .collect();
    let network = Select::with_theme(&theme)
        .with_prompt("Network")
        .items(&labels)
        .default(0)
        .interact()?;
    let chain_id = NETWORKS[network].1;

    let statement: String = Input::with_theme(&theme)
        .with_prompt("Statement shown in the wallet (empty for none)")
        .default(defaults.statement.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;

    let config = AuthConfig {
        base_url,
        domain,
        uri,
        chain_id,
        statement: Some(statement).filter(|s| !s.trim().is_empty()),
        challenge_ttl_secs: defaults.challenge_ttl_secs,
    };
    config.validate().context("configuration is invalid")?;

    let yaml = serde_yaml::to_string(&config).context("failed to serialize config to YAML")?;

    std::fs::write(&output, yaml)
        .context(format!("failed to write config to {}", output.display()))?;

    println!("\n{}", style("SUCCESS!").bold().green());
    println!(
        "Configuration written to: {}",
        style(output.display()).cyan()
    );

    Ok(())
}
