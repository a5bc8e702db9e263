//! Web search tool.
//!
//! Calls the configured [`SearchBackend`] once per invocation and hands the
//! model a compact JSON payload: `{"results": [{title, snippet, link}],
//! "answer": ...}`. No retries happen here.

use std::sync::Arc;

use async_trait::async_trait;
use cardsmith_core::error::ToolError;
use cardsmith_core::search::SearchBackend;
use cardsmith_core::tool::{Tool, ToolResult};
use tracing::debug;

pub const TOOL_NAME: &str = "webSearch";

pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
    min_results: u32,
    max_results: u32,
    default_results: u32,
}

impl WebSearchTool {
    /// Results per call are clamped to `min_results..=max_results`; the
    /// default is the middle of that range.
    pub fn new(backend: Arc<dyn SearchBackend>, min_results: u32, max_results: u32) -> Self {
        let (min_results, max_results) = if min_results <= max_results {
            (min_results, max_results)
        } else {
            (max_results, min_results)
        };
        Self {
            backend,
            min_results,
            max_results,
            default_results: min_results + (max_results - min_results) / 2,
        }
    }

    /// Override the count used when the model does not ask for one.
    pub fn with_default_results(mut self, default_results: u32) -> Self {
        self.default_results = default_results.clamp(self.min_results, self.max_results);
        self
    }

    fn requested_results(&self, arguments: &serde_json::Value) -> u32 {
        match arguments.get("numResults").and_then(|v| v.as_i64()) {
            Some(n) => n.clamp(self.min_results as i64, self.max_results as i64) as u32,
            None => self.default_results,
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns ranked results with titles, snippets, and links, plus a short answer when one is available."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "numResults": {
                    "type": "integer",
                    "description": format!(
                        "Number of results to return ({}-{}, default {})",
                        self.min_results, self.max_results, self.default_results
                    ),
                    "minimum": self.min_results,
                    "maximum": self.max_results
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| {
                ToolError::InvalidArguments("'query' must be a non-empty string".into())
            })?;

        let num_results = self.requested_results(&arguments);
        debug!(backend = self.backend.name(), query, num_results, "Running web search");

        let mut response = self.backend.search(query, num_results).await?;
        response.results.truncate(num_results as usize);

        let payload = serde_json::json!({
            "results": response.results,
            "answer": response.answer,
        });
        Ok(ToolResult::json(payload))
    }
}
