//! Folds streamed fragments into one assistant turn.

use std::collections::BTreeMap;

use cardsmith_core::error::ProviderError;
use cardsmith_core::message::{ToolInvocation, Turn};
use cardsmith_core::provider::StreamFragment;
use tracing::trace;

/// Collects the fragments of a single assistant turn.
///
/// Text increments concatenate in arrival order. Tool-call increments are
/// grouped by their positional index; the name and argument increments of
/// an index are appended, never replaced. Arguments are kept as raw text
/// and only parsed once the turn is finished.
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    content: String,
    calls: BTreeMap<u32, PendingCall>,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment in.
    ///
    /// Fails with [`ProviderError::Protocol`] when a fragment tries to give
    /// an invocation a different id than the one it already has.
    pub fn push(&mut self, fragment: StreamFragment) -> Result<(), ProviderError> {
        if let Some(text) = fragment.content {
            self.content.push_str(&text);
        }

        for delta in fragment.tool_calls {
            let call = self.calls.entry(delta.index).or_default();

            if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                if call.id.is_empty() {
                    call.id = id;
                } else if call.id != id {
                    return Err(ProviderError::Protocol(format!(
                        "tool call at index {} changed id from '{}' to '{}'",
                        delta.index, call.id, id
                    )));
                }
            }
            if let Some(name) = delta.name {
                call.name.push_str(&name);
            }
            if let Some(arguments) = delta.arguments {
                call.arguments.push_str(&arguments);
            }
        }

        Ok(())
    }

    /// Produce the finished assistant turn.
    ///
    /// Invocations that never received an id are dropped; the rest are
    /// ordered by index.
    pub fn finish(self) -> Turn {
        let tool_calls = self
            .calls
            .into_iter()
            .filter_map(|(index, call)| {
                if call.id.is_empty() {
                    trace!(index, name = %call.name, "Dropping tool call without id");
                    return None;
                }
                Some(ToolInvocation::new(call.id, call.name, call.arguments))
            })
            .collect();

        Turn::Assistant {
            content: (!self.content.is_empty()).then_some(self.content),
            tool_calls,
        }
    }
}
