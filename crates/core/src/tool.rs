//! Tool trait: the abstraction over agent capabilities.
//!
//! A tool takes structured arguments and returns a compact,
//! JSON-serializable payload that goes back to the model as a tool result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ToolError;
use crate::message::parse_arguments;
use crate::provider::ToolDefinition;

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content handed back to the model
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    /// A successful result carrying a JSON payload.
    pub fn json(data: serde_json::Value) -> Self {
        Self {
            success: true,
            output: data.to_string(),
            data: Some(data),
        }
    }

    /// A failed result the model can read and recover from.
    pub fn from_error(error: &ToolError) -> Self {
        let data = serde_json::json!({ "error": error.to_string() });
        Self {
            success: false,
            output: data.to_string(),
            data: Some(data),
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "webSearch").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-parsed arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Parse raw argument text and execute a tool when the LLM requests it
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tool definitions, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Parse `raw_arguments` and execute the named tool once.
    ///
    /// Malformed argument text fails this call only, with
    /// [`ToolError::ArgumentParse`]; nothing is executed in that case.
    pub async fn invoke(
        &self,
        name: &str,
        raw_arguments: &str,
    ) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let arguments = parse_arguments(name, raw_arguments)?;
        tool.execute(arguments).await
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A simple test tool that echoes its `text` argument.
    struct EchoTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolResult::json(arguments["text"].clone()))
        }
    }

    fn registry() -> (ToolRegistry, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool { calls: calls.clone() }));
        (registry, calls)
    }

    #[test]
    fn registry_register_and_lookup() {
        let (registry, _) = registry();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.definitions()[0].name, "echo");
    }

    #[tokio::test]
    async fn invoke_parses_and_executes() {
        let (registry, calls) = registry();
        let result = registry.invoke("echo", r#"{"text":"hello"}"#).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "\"hello\"");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_arguments_short_circuit() {
        let (registry, calls) = registry();
        let err = registry.invoke("echo", r#"{"text": "hel"#).await.unwrap_err();
        assert!(matches!(err, ToolError::ArgumentParse { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_arguments_short_circuit() {
        let (registry, calls) = registry();
        let err = registry.invoke("echo", "").await.unwrap_err();
        assert!(matches!(err, ToolError::ArgumentParse { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_tool_is_not_found() {
        let (registry, _) = registry();
        let err = registry.invoke("nonexistent", "{}").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn error_payload_is_json() {
        let result = ToolResult::from_error(&ToolError::NotFound("calc".into()));
        assert!(!result.success);
        let parsed: serde_json::Value = serde_json::from_str(&result.output).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("calc"));
    }
}
