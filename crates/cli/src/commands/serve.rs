//! `finchat serve`: Start the HTTP API server.

use anyhow::{Context, bail};
use finchat_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        bail!(
            "No API key configured. Set FINCHAT_API_KEY or OPENAI_API_KEY, or add api_key to {}",
            AppConfig::config_dir().join("config.toml").display()
        );
    }

    println!("finchat gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.model.name);
    println!(
        "   News:      {}",
        if config.market.finnhub_api_key.is_some() {
            "enabled"
        } else {
            "disabled (set FINNHUB_API_KEY)"
        }
    );

    finchat_gateway::start(config).await?;

    Ok(())
}
