//! Agent configuration types.

use serde::{Deserialize, Serialize};

/// Limits and sampling settings for one agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model to request
    #[serde(default = "default_model")]
    pub model: String,

    /// Caps total provider round-trips
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Caps total executed tool invocations
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output length cap per provider call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
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

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_iterations: default_max_iterations(),
            max_tool_calls: default_max_tool_calls(),
            temperature: default_temperature(),
            max_tokens: Some(2048),
        }
    }
}
