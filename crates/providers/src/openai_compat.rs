//! OpenAI-compatible provider adapter.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, Fireworks AI,
//! and any endpoint exposing a streaming `/chat/completions`.
//!
//! Each SSE event carries at most one `delta` with optional `content` and
//! `tool_calls[{index, id?, function{name?, arguments?}}]`; the stream ends
//! with `data: [DONE]`.

use std::time::Duration;

use async_trait::async_trait;
use cardsmith_core::error::ProviderError;
use cardsmith_core::message::Turn;
use cardsmith_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::{answered_call_ids, build_client, ensure_success, send_error};
use crate::sse::{FrameError, FrameParser, SseFrame, spawn_decoder};

/// The OpenAI end-of-stream sentinel.
const DONE_SENTINEL: &str = "[DONE]";

/// An OpenAI-compatible chat provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: build_client(Duration::from_secs(120))?,
        })
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Convert transcript turns to OpenAI API messages.
    fn to_api_messages(turns: &[Turn]) -> Vec<ApiMessage> {
        let answered = answered_call_ids(turns);

        turns
            .iter()
            .map(|turn| match turn {
                Turn::System { content } => ApiMessage::text("system", content),
                Turn::User { content } => ApiMessage::text("user", content),
                Turn::Assistant {
                    content,
                    tool_calls,
                } => {
                    let tool_calls: Vec<ApiToolCall> = tool_calls
                        .iter()
                        .filter(|tc| answered.contains(tc.id.as_str()))
                        .map(|tc| ApiToolCall {
                            id: tc.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect();
                    let content = match (content, tool_calls.is_empty()) {
                        (Some(text), _) => Some(text.clone()),
                        (None, true) => Some(String::new()),
                        (None, false) => None,
                    };
                    ApiMessage {
                        role: "assistant".into(),
                        content,
                        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        tool_call_id: None,
                    }
                }
                Turn::Tool {
                    tool_call_id,
                    content,
                } => ApiMessage {
                    role: "tool".into(),
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: Some(tool_call_id.clone()),
                },
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.turns),
            "temperature": request.temperature,
            "stream": request.stream,
        });

        if request.stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if request.offers_tools() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_turn(
        &self,
        request: ChatRequest,
    ) -> std::result::Result<FragmentReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&ChatRequest {
            stream: true,
            ..request
        });

        debug!(
            provider = %self.name,
            model = %body["model"],
            tools = body.get("tools").is_some(),
            "Sending streaming request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;

        let response = ensure_success(&self.name, response).await?;

        Ok(spawn_decoder(
            response.bytes_stream(),
            OpenAiFrameParser,
            self.name.clone(),
        ))
    }
}

/// Translates OpenAI `chat.completion.chunk` events into stream events.
struct OpenAiFrameParser;

impl FrameParser for OpenAiFrameParser {
    fn parse(&mut self, frame: &SseFrame) -> Result<Vec<StreamEvent>, FrameError> {
        let data = frame.data.trim();
        if data == DONE_SENTINEL {
            return Ok(vec![StreamEvent::Done]);
        }
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let chunk: StreamResponse = serde_json::from_str(data)?;

        if let Some(error) = chunk.error {
            return Err(FrameError::Provider(ProviderError::StreamInterrupted(
                error.message,
            )));
        }

        let mut events = Vec::new();

        if let Some(choice) = chunk.choices.into_iter().next() {
            let fragment = StreamFragment {
                content: choice.delta.content,
                tool_calls: choice
                    .delta
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| {
                        let (name, arguments) = match tc.function {
                            Some(f) => (f.name, f.arguments),
                            None => (None, None),
                        };
                        ToolCallFragment {
                            index: tc.index,
                            id: tc.id,
                            name,
                            arguments,
                        }
                    })
                    .collect(),
            };
            if !fragment.is_empty() {
                events.push(StreamEvent::Fragment(fragment));
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(StreamEvent::Usage(Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }));
        }

        Ok(events)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta. Arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardsmith_core::message::ToolInvocation;

    fn frame(data: &str) -> SseFrame {
        SseFrame {
            event: None,
            data: data.into(),
        }
    }

    fn parse(data: &str) -> Vec<StreamEvent> {
        OpenAiFrameParser.parse(&frame(data)).unwrap()
    }

    fn search_tool() -> ToolDefinition {
        ToolDefinition {
            name: "webSearch".into(),
            description: "Search the web".into(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn openrouter_constructor() {
        let provider = OpenAiCompatProvider::openrouter("sk-test").unwrap();
        assert_eq!(provider.name(), "openrouter");
        assert!(provider.base_url.contains("openrouter.ai"));
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url.contains("localhost:11434"));
    }

    #[test]
    fn message_conversion() {
        let turns = vec![Turn::system("You are helpful"), Turn::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&turns);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn unanswered_tool_calls_stay_off_the_wire() {
        let turns = vec![
            Turn::user("q"),
            Turn::Assistant {
                content: None,
                tool_calls: vec![
                    ToolInvocation::new("call_a", "webSearch", r#"{"query":"a"}"#),
                    ToolInvocation::new("call_b", "webSearch", r#"{"query":"b"}"#),
                ],
            },
            Turn::Tool {
                tool_call_id: "call_a".into(),
                content: "[]".into(),
            },
        ];
        let api = OpenAiCompatProvider::to_api_messages(&turns);
        let calls = api[1].tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_a");
        assert!(api[1].content.is_none());
        assert_eq!(api[2].tool_call_id.as_deref(), Some("call_a"));
    }

    #[test]
    fn assistant_without_content_or_answered_calls_sends_empty_text() {
        let turns = vec![Turn::Assistant {
            content: None,
            tool_calls: vec![ToolInvocation::new("x", "webSearch", "{}")],
        }];
        let api = OpenAiCompatProvider::to_api_messages(&turns);
        assert_eq!(api[0].content.as_deref(), Some(""));
        assert!(api[0].tool_calls.is_none());
    }

    #[test]
    fn body_omits_tools_when_not_offered() {
        let mut request = ChatRequest {
            model: "gpt-4o-mini".into(),
            turns: vec![Turn::user("hi")],
            temperature: 0.2,
            max_tokens: Some(256),
            tools: vec![],
            stream: true,
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert!(body.get("tools").is_none());
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["stream_options"]["include_usage"], true);

        request.tools = vec![search_tool()];
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["tools"][0]["function"]["name"], "webSearch");
        assert_eq!(body["tools"][0]["type"], "function");
    }

    // --- SSE parsing tests ---

    #[test]
    fn parse_content_delta() {
        let events =
            parse(r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#);
        assert_eq!(
            events,
            vec![StreamEvent::Fragment(StreamFragment::text("Hello"))]
        );
    }

    #[test]
    fn parse_done_sentinel() {
        assert_eq!(parse("[DONE]"), vec![StreamEvent::Done]);
    }

    #[test]
    fn parse_finish_chunk_yields_nothing() {
        assert!(parse(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).is_empty());
    }

    #[test]
    fn parse_tool_call_deltas_keep_index() {
        let events = parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"webSearch","arguments":""}},{"index":1,"function":{"arguments":"{\"q"}}]}}]}"#,
        );
        let StreamEvent::Fragment(fragment) = &events[0] else {
            panic!("expected fragment");
        };
        assert_eq!(fragment.tool_calls.len(), 2);
        assert_eq!(fragment.tool_calls[0].id.as_deref(), Some("call_a"));
        assert_eq!(fragment.tool_calls[0].name.as_deref(), Some("webSearch"));
        assert_eq!(fragment.tool_calls[1].index, 1);
        assert!(fragment.tool_calls[1].id.is_none());
        assert_eq!(fragment.tool_calls[1].arguments.as_deref(), Some("{\"q"));
    }

    #[test]
    fn parse_usage_chunk() {
        let events = parse(
            r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
        );
        assert_eq!(
            events,
            vec![StreamEvent::Usage(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            })]
        );
    }

    #[test]
    fn malformed_payload_is_reported_as_malformed() {
        let err = OpenAiFrameParser.parse(&frame("{oops")).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn in_band_error_ends_stream() {
        let err = OpenAiFrameParser
            .parse(&frame(r#"{"error":{"message":"overloaded"}}"#))
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::Provider(ProviderError::StreamInterrupted(m)) if m == "overloaded"
        ));
    }

    // --- HTTP round-trip tests ---

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".into(),
            turns: vec![Turn::user("Say hello")],
            temperature: 0.0,
            max_tokens: None,
            tools: vec![search_tool()],
            stream: true,
        }
    }

    #[tokio::test]
    async fn streams_fragments_from_server() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let provider = OpenAiCompatProvider::new("test", server.url(), "sk-test").unwrap();
        let mut rx = provider.send_turn(request()).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event.unwrap());
        }

        mock.assert_async().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Fragment(StreamFragment::text("Hel")),
                StreamEvent::Fragment(StreamFragment::text("lo")),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn rate_limit_status_maps_to_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_header("retry-after", "12")
            .create_async()
            .await;

        let provider = OpenAiCompatProvider::new("test", server.url(), "sk-test").unwrap();
        let err = provider.send_turn(request()).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after_secs: 12
            }
        ));
    }

    #[tokio::test]
    async fn server_error_carries_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let provider = OpenAiCompatProvider::new("test", server.url(), "sk-test").unwrap();
        let err = provider.send_turn(request()).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::ApiError { status_code: 500, ref message } if message.contains("exploded")
        ));
    }
}
