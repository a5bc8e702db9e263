//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly (not OpenAI-compatible proxy).
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE with typed `content_block_*` events

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use cardsmith_core::error::ProviderError;
use cardsmith_core::message::Turn;
use cardsmith_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::{answered_call_ids, build_client, ensure_success, send_error};
use crate::sse::{FrameError, FrameParser, SseFrame, spawn_decoder};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: build_client(Duration::from_secs(300))?,
        })
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Gather system turns into the top-level `system` field.
    fn extract_system(turns: &[Turn]) -> Option<String> {
        let parts: Vec<&str> = turns
            .iter()
            .filter_map(|t| match t {
                Turn::System { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();

        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// Convert non-system turns to Anthropic messages.
    ///
    /// Consecutive tool results share one `user` message, and tool calls
    /// that were never answered are left out.
    fn to_api_messages(turns: &[Turn]) -> Vec<AnthropicMessage> {
        let answered = answered_call_ids(turns);
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for turn in turns {
            match turn {
                Turn::System { .. } => {}
                Turn::User { content } => result.push(AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Text(content.clone()),
                }),
                Turn::Assistant {
                    content,
                    tool_calls,
                } => {
                    let mut blocks: Vec<ContentBlock> = Vec::new();
                    if let Some(text) = content.as_deref().filter(|t| !t.is_empty()) {
                        blocks.push(ContentBlock::Text { text: text.into() });
                    }
                    for tc in tool_calls
                        .iter()
                        .filter(|tc| answered.contains(tc.id.as_str()))
                    {
                        let input = serde_json::from_str(&tc.arguments)
                            .unwrap_or_else(|_| serde_json::json!({}));
                        blocks.push(ContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input,
                        });
                    }
                    if blocks.is_empty() {
                        continue;
                    }
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                Turn::Tool {
                    tool_call_id,
                    content,
                } => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: tool_call_id.clone(),
                        content: content.clone(),
                    };
                    match result.last_mut() {
                        Some(AnthropicMessage {
                            role,
                            content: AnthropicContent::Blocks(blocks),
                        }) if role == "user" => blocks.push(block),
                        _ => result.push(AnthropicMessage {
                            role: "user".into(),
                            content: AnthropicContent::Blocks(vec![block]),
                        }),
                    }
                }
            }
        }

        result
    }

    /// Convert tool definitions to Anthropic format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn request_body(request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.turns),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
            "stream": true,
        });

        if let Some(system) = Self::extract_system(&request.turns) {
            body["system"] = serde_json::json!(system);
        }

        if request.offers_tools() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_turn(
        &self,
        request: ChatRequest,
    ) -> std::result::Result<FragmentReceiver, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::request_body(&request);

        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;

        let response = ensure_success(&self.name, response).await?;

        Ok(spawn_decoder(
            response.bytes_stream(),
            AnthropicFrameParser::default(),
            self.name.clone(),
        ))
    }
}

/// Translates Anthropic's typed stream events into stream events.
///
/// Content blocks are indexed across text and tool use; tool-use blocks
/// are renumbered so tool-call indices stay dense.
#[derive(Debug, Default)]
struct AnthropicFrameParser {
    tool_blocks: HashMap<u32, u32>,
    input_tokens: u32,
}

impl FrameParser for AnthropicFrameParser {
    fn parse(&mut self, frame: &SseFrame) -> Result<Vec<StreamEvent>, FrameError> {
        let event: StreamPayload = serde_json::from_str(&frame.data)?;

        let events = match event {
            StreamPayload::MessageStart { message } => {
                self.input_tokens = message.usage.map(|u| u.input_tokens).unwrap_or(0);
                Vec::new()
            }
            StreamPayload::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                StartBlock::ToolUse { id, name } => {
                    let tool_index = self.tool_blocks.len() as u32;
                    self.tool_blocks.insert(index, tool_index);
                    vec![StreamEvent::Fragment(StreamFragment::tool_call(
                        ToolCallFragment {
                            index: tool_index,
                            id: Some(id),
                            name: Some(name),
                            arguments: None,
                        },
                    ))]
                }
                StartBlock::Other => Vec::new(),
            },
            StreamPayload::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => {
                    vec![StreamEvent::Fragment(StreamFragment::text(text))]
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    match self.tool_blocks.get(&index) {
                        Some(&tool_index) => vec![StreamEvent::Fragment(
                            StreamFragment::tool_call(ToolCallFragment {
                                index: tool_index,
                                id: None,
                                name: None,
                                arguments: Some(partial_json),
                            }),
                        )],
                        None => {
                            return Err(FrameError::Malformed(format!(
                                "input_json_delta for unknown block {index}"
                            )));
                        }
                    }
                }
                BlockDelta::Other => Vec::new(),
            },
            StreamPayload::MessageDelta { usage } => match usage {
                Some(usage) => {
                    let prompt_tokens = usage.input_tokens.unwrap_or(self.input_tokens);
                    vec![StreamEvent::Usage(Usage {
                        prompt_tokens,
                        completion_tokens: usage.output_tokens,
                        total_tokens: prompt_tokens + usage.output_tokens,
                    })]
                }
                None => Vec::new(),
            },
            StreamPayload::MessageStop => vec![StreamEvent::Done],
            StreamPayload::Error { error } => {
                return Err(FrameError::Provider(ProviderError::StreamInterrupted(
                    format!("{}: {}", error.r#type, error.message),
                )));
            }
            StreamPayload::Other => Vec::new(),
        };

        Ok(events)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

// --- Streaming SSE types ---

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamPayload {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: StartBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    MessageStop,
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StartMessage {
    #[serde(default)]
    usage: Option<StartUsage>,
}

#[derive(Debug, Deserialize)]
struct StartUsage {
    #[serde(default)]
    input_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StartBlock {
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    message: String,
}
