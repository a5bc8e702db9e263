//! Search collaborator: the external web search the `webSearch` tool calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

/// What the search collaborator returns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Ranked results, best first. May be empty.
    #[serde(default)]
    pub results: Vec<SearchHit>,

    /// Highlighted answer summary, when the backend has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

/// A web search backend.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Run one search. Implementations must not retry.
    async fn search(&self, query: &str, num_results: u32) -> Result<SearchResponse, ToolError>;
}
