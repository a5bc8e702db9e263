//! Shared test helpers for agent loop tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use cardsmith_core::error::{ProviderError, ToolError};
use cardsmith_core::provider::{
    ChatRequest, FragmentReceiver, Provider, StreamEvent, StreamFragment, ToolCallFragment, Usage,
};
use cardsmith_core::tool::{Tool, ToolRegistry, ToolResult};
use cardsmith_core::usage::{UsageRecord, UsageSink};
use tokio::sync::mpsc;

pub type ScriptedEvent = Result<StreamEvent, ProviderError>;

/// A provider that replays one scripted stream per call and records
/// every request it receives.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Vec<ScriptedEvent>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Vec<ScriptedEvent>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send_turn(&self, request: ChatRequest) -> Result<FragmentReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Network("script exhausted".into()))?;

        let (tx, rx) = mpsc::channel(script.len().max(1));
        for event in script {
            tx.try_send(event).unwrap();
        }
        Ok(rx)
    }
}

/// A provider whose stream never produces anything. Keeps the sender so
/// tests can see when the receiver goes away.
#[derive(Default)]
pub struct StalledProvider {
    sender: Mutex<Option<mpsc::Sender<ScriptedEvent>>>,
}

impl StalledProvider {
    pub fn receiver_dropped(&self) -> bool {
        self.sender
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| tx.is_closed())
    }
}

#[async_trait]
impl Provider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn send_turn(&self, _request: ChatRequest) -> Result<FragmentReceiver, ProviderError> {
        let (tx, rx) = mpsc::channel(1);
        *self.sender.lock().unwrap() = Some(tx);
        Ok(rx)
    }
}

/// A `webSearch` stand-in that echoes the query and counts executions.
pub struct SearchStub {
    pub executions: Arc<AtomicUsize>,
}

impl SearchStub {
    pub fn new() -> Self {
        Self {
            executions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn registry(&self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SearchStub {
            executions: self.executions.clone(),
        }));
        registry
    }
}

#[async_trait]
impl Tool for SearchStub {
    fn name(&self) -> &str {
        "webSearch"
    }

    fn description(&self) -> &str {
        "Search the web"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let query = arguments["query"].as_str().unwrap_or_default();
        Ok(ToolResult::json(serde_json::json!({
            "results": [{
                "title": format!("About {query}"),
                "snippet": format!("Notes on {query}"),
                "link": "https://example.com"
            }]
        })))
    }
}

/// A `webSearch` stand-in that never returns. Records when a call starts
/// and when its future is dropped.
#[derive(Default)]
pub struct HangingSearch {
    pub started: Arc<AtomicBool>,
    pub dropped: Arc<AtomicBool>,
}

impl HangingSearch {
    pub fn registry(&self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(HangingSearch {
            started: self.started.clone(),
            dropped: self.dropped.clone(),
        }));
        registry
    }
}

/// Sets its flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Tool for HangingSearch {
    fn name(&self) -> &str {
        "webSearch"
    }

    fn description(&self) -> &str {
        "Search the web, slowly"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let _flag = DropFlag(self.dropped.clone());
        self.started.store(true, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Collects every usage record.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<UsageRecord>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl UsageSink for RecordingSink {
    fn record(&self, record: UsageRecord) {
        self.records.lock().unwrap().push(record);
    }
}

pub fn text(content: &str) -> ScriptedEvent {
    Ok(StreamEvent::Fragment(StreamFragment::text(content)))
}

pub fn fragment(
    index: u32,
    id: Option<&str>,
    name: Option<&str>,
    arguments: Option<&str>,
) -> ScriptedEvent {
    Ok(StreamEvent::Fragment(StreamFragment::tool_call(
        ToolCallFragment {
            index,
            id: id.map(Into::into),
            name: name.map(Into::into),
            arguments: arguments.map(Into::into),
        },
    )))
}

pub fn done() -> ScriptedEvent {
    Ok(StreamEvent::Done)
}

/// A plain text reply.
pub fn reply(content: &str) -> Vec<ScriptedEvent> {
    vec![text(content), done()]
}

/// A reply requesting `(id, name, arguments)` calls, with the arguments
/// split across two fragments.
pub fn calls(requested: &[(&str, &str, &str)]) -> Vec<ScriptedEvent> {
    let mut events = Vec::new();
    for (index, &(id, name, arguments)) in requested.iter().enumerate() {
        let index = index as u32;
        let split = arguments.len() / 2;
        let split = (split..=arguments.len())
            .find(|i| arguments.is_char_boundary(*i))
            .unwrap_or(arguments.len());
        events.push(fragment(index, Some(id), Some(name), Some(&arguments[..split])));
        events.push(fragment(index, None, None, Some(&arguments[split..])));
    }
    events.push(done());
    events
}

/// Insert a usage report just before the end marker.
pub fn with_usage(mut events: Vec<ScriptedEvent>, prompt: u32, completion: u32) -> Vec<ScriptedEvent> {
    let at = events.len().saturating_sub(1);
    events.insert(
        at,
        Ok(StreamEvent::Usage(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        })),
    );
    events
}
