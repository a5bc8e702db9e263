//! Thread-safe in-memory usage ledger.

use std::sync::RwLock;

use cardsmith_core::usage::{UsageKind, UsageRecord, UsageSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Running totals across every recorded question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Provider round-trips.
    pub completions: u64,
    /// Round-trips whose provider reported no token counts.
    pub completions_without_usage: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Executed tool invocations, failed ones included.
    pub tool_calls: u64,
    pub failed_tool_calls: u64,
    /// Wall time spent inside tools.
    pub tool_time_ms: u64,
}

impl UsageTotals {
    fn absorb(&mut self, kind: &UsageKind) {
        match kind {
            UsageKind::Completion { usage, .. } => {
                self.completions += 1;
                match usage {
                    Some(u) => {
                        self.prompt_tokens += u64::from(u.prompt_tokens);
                        self.completion_tokens += u64::from(u.completion_tokens);
                        self.total_tokens += u64::from(u.total_tokens);
                    }
                    None => self.completions_without_usage += 1,
                }
            }
            UsageKind::ToolCall {
                success,
                duration_ms,
                ..
            } => {
                self.tool_calls += 1;
                if !success {
                    self.failed_tool_calls += 1;
                }
                self.tool_time_ms += duration_ms;
            }
        }
    }
}

/// The in-process usage sink.
///
/// Thread-safe via `RwLock`. A disabled ledger drops every record.
pub struct UsageLedger {
    enabled: bool,
    records: RwLock<Vec<UsageRecord>>,
    totals: RwLock<UsageTotals>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self {
            enabled: true,
            records: RwLock::new(Vec::new()),
            totals: RwLock::new(UsageTotals::default()),
        }
    }

    /// A ledger that keeps nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Totals over everything recorded so far.
    pub fn totals(&self) -> UsageTotals {
        self.totals.read().map(|t| *t).unwrap_or_default()
    }

    /// Totals for one transcript.
    pub fn totals_for(&self, transcript_id: &str) -> UsageTotals {
        let mut totals = UsageTotals::default();
        if let Ok(records) = self.records.read() {
            records
                .iter()
                .filter(|r| r.transcript_id == transcript_id)
                .for_each(|r| totals.absorb(&r.kind));
        }
        totals
    }

    /// Records for one transcript, oldest first.
    pub fn records_for(&self, transcript_id: &str) -> Vec<UsageRecord> {
        self.records
            .read()
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.transcript_id == transcript_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn record_count(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Drop records older than `cutoff`. Totals are kept. Returns how many
    /// records were removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let Ok(mut records) = self.records.write() else {
            return 0;
        };
        let before = records.len();
        records.retain(|r| r.timestamp >= cutoff);
        before - records.len()
    }
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageSink for UsageLedger {
    fn record(&self, record: UsageRecord) {
        if !self.enabled {
            return;
        }
        trace!(transcript_id = %record.transcript_id, kind = ?record.kind, "Usage recorded");
        if let Ok(mut totals) = self.totals.write() {
            totals.absorb(&record.kind);
        }
        if let Ok(mut records) = self.records.write() {
            records.push(record);
        }
    }
}
