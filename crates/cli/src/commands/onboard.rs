//! `cardsmith onboard` — First-time setup.

use std::path::Path;

use cardsmith_config::AppConfig;

pub fn run() -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();

    println!("Cardsmith — First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✓ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    let config_path = AppConfig::config_path();
    if write_default_config(&config_path)? {
        println!("✓ Created config.toml at: {}", config_path.display());
        println!("\nNext steps:");
        println!("   1. Set OPENROUTER_API_KEY (or edit api_key in the config)");
        println!("   2. Set SERPER_API_KEY to enable web search");
        println!("   3. Run: cardsmith ask \"What is spaced repetition?\"\n");
    } else {
        println!("\n! Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run onboard.\n");
    }

    Ok(())
}

/// Write the default config unless a file is already there. Returns
/// whether a file was written.
fn write_default_config(path: &Path) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_loadable_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert!(write_default_config(&path).unwrap());
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_provider, "openrouter");
        assert_eq!(config.agent.max_tool_calls, 3);
    }

    #[test]
    fn never_overwrites_existing_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_model = \"mine\"\n").unwrap();

        assert!(!write_default_config(&path).unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "default_model = \"mine\"\n");
    }
}
