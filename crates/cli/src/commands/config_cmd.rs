//! `cardsmith config` — Configuration management commands.

use anyhow::Context;
use cardsmith_config::AppConfig;

pub fn validate() -> anyhow::Result<()> {
    println!("Validating {} ...", AppConfig::config_path().display());

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   ✗ {e}");
            return Err(e.into());
        }
    };
    println!("   ✓ Config parsed and validated");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✓ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ! {w}");
        }
    }

    println!();
    println!("   Provider:   {}", config.default_provider);
    println!("   Model:      {}", config.model());
    println!(
        "   Budget:     {} iterations, {} tool calls",
        config.agent.max_iterations, config.agent.max_tool_calls
    );
    println!(
        "   Search:     {} ({}..={} results)",
        if config.search.api_key.is_some() {
            "enabled"
        } else {
            "disabled"
        },
        config.search.min_results,
        config.search.max_results
    );
    println!(
        "   Telemetry:  {}",
        if config.telemetry.enabled { "on" } else { "off" }
    );

    Ok(())
}

/// Problems that do not stop loading but will bite at ask time.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !config.has_api_key() && !cardsmith_providers::is_local(&config.default_provider) {
        warnings.push(format!(
            "No API key for '{}' (set CARDSMITH_API_KEY or the provider's key variable)",
            config.default_provider
        ));
    }

    if config.search.api_key.is_none() {
        warnings.push("No search key set (SERPER_API_KEY); web search is disabled".into());
    }

    if config.agent.max_tool_calls >= config.agent.max_iterations {
        warnings.push(format!(
            "agent.max_tool_calls ({}) >= agent.max_iterations ({}); every iteration can be spent searching",
            config.agent.max_tool_calls, config.agent.max_iterations
        ));
    }

    warnings
}

pub fn show() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let toml_str = toml::to_string_pretty(&config.without_secrets())?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_path().display());
}
