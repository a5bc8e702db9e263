//! Domain event system. Lets callers observe an agent run as it happens.
//!
//! The agent loop publishes events (streamed text, tool executions,
//! corrective nudges, the final outcome). A UI or logger subscribes and
//! filters for what it cares about; with no subscribers, events are dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A provider round-trip is starting
    IterationStarted {
        transcript_id: String,
        iteration: u32,
        tools_offered: bool,
        timestamp: DateTime<Utc>,
    },

    /// A piece of assistant text arrived on the stream
    ContentDelta {
        transcript_id: String,
        content: String,
    },

    /// A tool invocation was executed
    ToolExecuted {
        transcript_id: String,
        call_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The loop told the model to stop requesting tools
    CorrectionInjected {
        transcript_id: String,
        iteration: u32,
        skipped_calls: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// The run finished (successfully or not)
    AgentFinished {
        transcript_id: String,
        success: bool,
        iterations_used: u32,
        tool_calls_used: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolExecuted {
            transcript_id: "t1".into(),
            call_id: "call_1".into(),
            tool_name: "webSearch".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "webSearch");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ContentDelta {
            transcript_id: "t1".into(),
            content: "no one listening".into(),
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = DomainEvent::ContentDelta {
            transcript_id: "t1".into(),
            content: "Hel".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"content_delta""#));
    }
}
