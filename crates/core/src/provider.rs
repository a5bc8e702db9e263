//! Provider trait: the abstraction over chat-completion backends.
//!
//! A Provider knows how to send a transcript to an LLM and hand back the
//! reply as an ordered stream of fragments. Every concrete backend is one
//! adapter implementing [`Provider::send_turn`]; the agent loop never knows
//! which one it is talking to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Turn;

/// A single chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "openai/gpt-4o-mini")
    pub model: String,

    /// The full transcript
    pub turns: Vec<Turn>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools the model may call. Empty means tools are not offered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_stream() -> bool {
    true
}

impl ChatRequest {
    /// Whether this request offers any tool to the model.
    pub fn offers_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Add another usage report into this one.
    pub fn absorb(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One tool-call increment, tagged with the positional index of the
/// invocation it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    pub index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Name increment (appended, not replaced)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Argument text increment (appended, not replaced)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// The smallest unit decoded from the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFragment {
    /// Content text increment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool-call increments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallFragment>,
}

impl StreamFragment {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(fragment: ToolCallFragment) -> Self {
        Self {
            content: None,
            tool_calls: vec![fragment],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(str::is_empty) && self.tool_calls.is_empty()
    }
}

/// What a provider stream yields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A content and/or tool-call increment.
    Fragment(StreamFragment),

    /// Token usage for the turn (typically near the end).
    Usage(Usage),

    /// Explicit end of the assistant turn.
    Done,
}

/// Receiving half of a provider stream.
pub type FragmentReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<StreamEvent, ProviderError>>;

/// The core Provider trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter", "anthropic").
    fn name(&self) -> &str;

    /// Send the transcript and return the reply as a fragment stream.
    ///
    /// Errors returned here mean the request never produced a stream
    /// (network failure, non-success status). Failures after the stream
    /// started arrive as `Err` items on the receiver. Dropping the receiver
    /// abandons the in-flight read.
    async fn send_turn(&self, request: ChatRequest) -> std::result::Result<FragmentReceiver, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_defaults_to_streaming() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"model":"gpt-4o-mini","turns":[]}"#).unwrap();
        assert!(req.stream);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(!req.offers_tools());
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "webSearch".into(),
            description: "Search the web".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" }
                },
                "required": ["query"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("webSearch"));
        assert!(json.contains("required"));
    }

    #[test]
    fn empty_fragment_detection() {
        assert!(StreamFragment::default().is_empty());
        assert!(StreamFragment::text("").is_empty());
        assert!(!StreamFragment::text("a").is_empty());
        assert!(!StreamFragment::tool_call(ToolCallFragment::default()).is_empty());
    }

    #[test]
    fn usage_absorb_sums_fields() {
        let mut total = Usage::default();
        total.absorb(&Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        total.absorb(&Usage {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
        });
        assert_eq!(total.total_tokens, 18);
        assert_eq!(total.prompt_tokens, 11);
    }
}
