//! Usage sink: where the agent loop reports provider round-trips and tool
//! executions for cost/usage bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::Usage;

/// What a usage record describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsageKind {
    /// One chat-completion round-trip.
    Completion {
        provider: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    /// One executed tool invocation.
    ToolCall {
        tool_name: String,
        success: bool,
        duration_ms: u64,
    },
}

/// A single usage record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// The transcript this record belongs to
    pub transcript_id: String,

    pub kind: UsageKind,

    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn completion(
        transcript_id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        usage: Option<Usage>,
    ) -> Self {
        Self {
            transcript_id: transcript_id.into(),
            kind: UsageKind::Completion {
                provider: provider.into(),
                model: model.into(),
                usage,
            },
            timestamp: Utc::now(),
        }
    }

    pub fn tool_call(
        transcript_id: impl Into<String>,
        tool_name: impl Into<String>,
        success: bool,
        duration_ms: u64,
    ) -> Self {
        Self {
            transcript_id: transcript_id.into(),
            kind: UsageKind::ToolCall {
                tool_name: tool_name.into(),
                success,
                duration_ms,
            },
            timestamp: Utc::now(),
        }
    }
}

/// Receives usage records. Recording must not fail the caller.
pub trait UsageSink: Send + Sync {
    fn record(&self, record: UsageRecord);
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUsageSink;

impl UsageSink for NoopUsageSink {
    fn record(&self, _record: UsageRecord) {}
}
