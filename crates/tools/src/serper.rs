//! Serper-style HTTP search backend.
//!
//! `POST {api_url}` with an `X-API-KEY` header and body `{"q", "num"}`;
//! reads `organic[]` and the optional `answerBox`.

use std::time::Duration;

use async_trait::async_trait;
use cardsmith_core::error::ToolError;
use cardsmith_core::search::{SearchBackend, SearchHit, SearchResponse};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::web_search::TOOL_NAME;

pub struct SerperSearch {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl SerperSearch {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| failed(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            client,
        })
    }
}

fn failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: TOOL_NAME.into(),
        reason,
    }
}

#[async_trait]
impl SearchBackend for SerperSearch {
    fn name(&self) -> &str {
        "serper"
    }

    async fn search(&self, query: &str, num_results: u32) -> Result<SearchResponse, ToolError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("X-API-KEY", &self.api_key)
            .json(&serde_json::json!({ "q": query, "num": num_results }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool_name: TOOL_NAME.into(),
                        timeout_secs: 30,
                    }
                } else {
                    failed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Search request failed");
            return Err(failed(format!("search API returned {status}")));
        }

        let body: SerperResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("unreadable search response: {e}")))?;

        debug!(hits = body.organic.len(), "Search completed");

        Ok(SearchResponse {
            results: body
                .organic
                .into_iter()
                .map(|hit| SearchHit {
                    title: hit.title,
                    snippet: hit.snippet,
                    link: hit.link,
                })
                .collect(),
            answer: body.answer_box.and_then(AnswerBox::summary),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicHit>,
    #[serde(default, rename = "answerBox")]
    answer_box: Option<AnswerBox>,
}

#[derive(Debug, Deserialize)]
struct OrganicHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

#[derive(Debug, Deserialize)]
struct AnswerBox {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl AnswerBox {
    fn summary(self) -> Option<String> {
        self.answer.or(self.snippet).or(self.title)
    }
}
