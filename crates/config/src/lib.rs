//! Configuration loading, validation, and management for Cardsmith.
//!
//! Loads configuration from `~/.cardsmith/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use cardsmith_core::AgentConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.cardsmith/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Agent loop budgets and sampling
    #[serde(default)]
    pub agent: AgentSection,

    /// Web search collaborator
    #[serde(default)]
    pub search: SearchConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Usage tracking
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_max_iterations() -> u32 {
    5
}
fn default_max_tool_calls() -> u32 {
    3
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_search_url() -> String {
    "https://google.serper.dev/search".into()
}
fn default_min_results() -> u32 {
    1
}
fn default_max_results() -> u32 {
    10
}
fn default_results() -> u32 {
    5
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("agent", &self.agent)
            .field("search", &self.search)
            .field("providers", &self.providers)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

/// `[agent]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Provider round-trips allowed per question
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Tool executions allowed per question
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Abandon a question after this many seconds (unset = no limit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_tool_calls: default_max_tool_calls(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: None,
        }
    }
}

/// `[search]` section.
#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_search_url")]
    pub api_url: String,

    #[serde(default = "default_min_results")]
    pub min_results: u32,

    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Used when the model does not ask for a count
    #[serde(default = "default_results")]
    pub default_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_search_url(),
            min_results: default_min_results(),
            max_results: default_max_results(),
            default_results: default_results(),
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("min_results", &self.min_results)
            .field("max_results", &self.max_results)
            .field("default_results", &self.default_results)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// `[telemetry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether usage records are kept
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.cardsmith/config.toml).
    ///
    /// Also checks environment variables:
    /// - `CARDSMITH_API_KEY` (highest priority), then the provider's own
    ///   key variable (`OPENROUTER_API_KEY`, `OPENAI_API_KEY`,
    ///   `ANTHROPIC_API_KEY`)
    /// - `CARDSMITH_PROVIDER`, `CARDSMITH_MODEL`
    /// - `SERPER_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = lookup("CARDSMITH_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("CARDSMITH_MODEL") {
            self.default_model = model;
        }

        if self.api_key.is_none() {
            let provider_var = match self.default_provider.as_str() {
                "anthropic" => Some("ANTHROPIC_API_KEY"),
                "openai" => Some("OPENAI_API_KEY"),
                "openrouter" => Some("OPENROUTER_API_KEY"),
                _ => None,
            };
            self.api_key = lookup("CARDSMITH_API_KEY")
                .or_else(|| provider_var.and_then(&lookup))
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if self.search.api_key.is_none() {
            self.search.api_key = lookup("SERPER_API_KEY");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".cardsmith")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tokens must be at least 1".into(),
            ));
        }

        let search = &self.search;
        if search.min_results == 0 || search.min_results > search.max_results {
            return Err(ConfigError::ValidationError(
                "search.min_results must be >= 1 and <= search.max_results".into(),
            ));
        }

        if !(search.min_results..=search.max_results).contains(&search.default_results) {
            return Err(ConfigError::ValidationError(format!(
                "search.default_results must be within {}..={}",
                search.min_results, search.max_results
            )));
        }

        Ok(())
    }

    /// API key for `provider`: its own section first, then the global key.
    pub fn provider_api_key(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider_api_key(&self.default_provider).is_some()
    }

    /// The model to use: the provider section's default, then the global one.
    pub fn model(&self) -> String {
        self.providers
            .get(&self.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| self.default_model.clone())
    }

    /// Agent loop settings derived from this configuration.
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            model: self.model(),
            max_iterations: self.agent.max_iterations,
            max_tool_calls: self.agent.max_tool_calls,
            temperature: self.agent.temperature,
            max_tokens: Some(self.agent.max_tokens),
        }
    }

    /// A copy with every API key removed, for display.
    pub fn without_secrets(&self) -> Self {
        let mut shown = self.clone();
        shown.api_key = None;
        shown.search.api_key = None;
        for provider in shown.providers.values_mut() {
            provider.api_key = None;
        }
        shown
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            agent: AgentSection::default(),
            search: SearchConfig::default(),
            providers: HashMap::new(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
