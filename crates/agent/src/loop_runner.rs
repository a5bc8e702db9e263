//! The agent reasoning loop implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use cardsmith_core::agent::AgentConfig;
use cardsmith_core::error::{ProviderError, ToolError, TranscriptError};
use cardsmith_core::event::{DomainEvent, EventBus};
use cardsmith_core::message::{ToolInvocation, Transcript, Turn};
use cardsmith_core::provider::{ChatRequest, Provider, StreamEvent, Usage};
use cardsmith_core::tool::{ToolRegistry, ToolResult};
use cardsmith_core::usage::{NoopUsageSink, UsageRecord, UsageSink};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::accumulator::DeltaAccumulator;
use crate::budget::Budget;

/// Default tool-usage policy for the study assistant.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a study assistant helping students understand \
their course material. Use the webSearch tool only when the question needs current or external \
facts you do not already know. Search at most a few times, then answer clearly and concisely \
from what you found.";

/// Appended when the model may not call tools any more.
const ANSWER_NOW: &str = "You have no tool calls left. Do not request any more tools. \
Answer the user's question now using the information already gathered.";

/// How one question ended without an answer.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The request failed, the stream broke, or it was corrupt.
    #[error("transport failure: {0}")]
    Transport(#[from] ProviderError),

    /// The provider replied with neither text nor tool calls.
    #[error("empty response from provider at iteration {iteration}")]
    EmptyResponse { iteration: u32 },

    /// The iteration cap was reached without a final answer.
    #[error("no answer after {iterations} iterations ({tool_calls} tool calls used)")]
    BudgetExhausted { iterations: u32, tool_calls: u32 },

    /// The caller abandoned the question.
    #[error("cancelled")]
    Cancelled,

    #[error("transcript invariant violated: {0}")]
    Transcript(#[from] TranscriptError),
}

/// A finished answer plus what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tool_calls_used: u32,
    pub iterations_used: u32,
    /// Token usage summed over every provider round-trip that reported it
    pub usage: Usage,
}

/// The core agent loop that orchestrates LLM calls and tool execution.
///
/// Holds no per-question state, so one loop can serve any number of
/// concurrent questions.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Model, budgets and sampling
    config: AgentConfig,

    /// Tool-usage policy sent as the first turn
    system_prompt: String,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    /// Where round-trips and tool executions are reported
    usage_sink: Arc<dyn UsageSink>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            provider,
            tools,
            config,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            event_bus: Arc::new(EventBus::default()),
            usage_sink: Arc::new(NoopUsageSink),
        }
    }

    /// Replace the tool-usage system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Publish domain events on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Report usage to `sink`.
    pub fn with_usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage_sink = sink;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Answer a single question.
    pub async fn run(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Completion, AgentError> {
        let transcript = Transcript::seeded(self.system_prompt.clone(), question);
        self.execute(transcript, cancel).await
    }

    /// Continue an existing conversation. The system prompt is added in
    /// front when the transcript does not start with one.
    pub async fn run_transcript(
        &self,
        mut transcript: Transcript,
        cancel: &CancellationToken,
    ) -> Result<Completion, AgentError> {
        transcript.ensure_system_prompt(&self.system_prompt);
        self.execute(transcript, cancel).await
    }

    async fn execute(
        &self,
        mut transcript: Transcript,
        cancel: &CancellationToken,
    ) -> Result<Completion, AgentError> {
        let mut budget = Budget::new(self.config.max_iterations, self.config.max_tool_calls);
        let mut usage = Usage::default();

        info!(
            transcript_id = %transcript.id,
            turns = transcript.len(),
            max_iterations = self.config.max_iterations,
            max_tool_calls = self.config.max_tool_calls,
            "Processing question"
        );

        let outcome = self
            .drive(&mut transcript, &mut budget, &mut usage, cancel)
            .await;

        self.event_bus.publish(DomainEvent::AgentFinished {
            transcript_id: transcript.id.to_string(),
            success: outcome.is_ok(),
            iterations_used: budget.iterations_used(),
            tool_calls_used: budget.tool_calls_used(),
            timestamp: Utc::now(),
        });

        match &outcome {
            Ok(_) => info!(
                transcript_id = %transcript.id,
                iterations = budget.iterations_used(),
                tool_calls = budget.tool_calls_used(),
                "Question answered"
            ),
            Err(e) => warn!(transcript_id = %transcript.id, error = %e, "Question failed"),
        }

        outcome.map(|text| Completion {
            text,
            tool_calls_used: budget.tool_calls_used(),
            iterations_used: budget.iterations_used(),
            usage,
        })
    }

    /// The state machine. Returns the final answer text.
    async fn drive(
        &self,
        transcript: &mut Transcript,
        budget: &mut Budget,
        usage: &mut Usage,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let transcript_id = transcript.id.to_string();

        while budget.can_iterate() {
            let iteration = budget.iterations_used() + 1;
            let offer_tools = budget.allows_tool_call() && !self.tools.is_empty();

            if !budget.allows_tool_call()
                && iteration > 1
                && !matches!(transcript.last(), Some(Turn::System { .. }))
            {
                self.inject_correction(transcript, iteration, &[]);
            }

            debug!(transcript_id = %transcript_id, iteration, offer_tools, "Agent loop iteration");
            self.event_bus.publish(DomainEvent::IterationStarted {
                transcript_id: transcript_id.clone(),
                iteration,
                tools_offered: offer_tools,
                timestamp: Utc::now(),
            });

            let request = ChatRequest {
                model: self.config.model.clone(),
                turns: transcript.turns().to_vec(),
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
                tools: if offer_tools {
                    self.tools.definitions()
                } else {
                    Vec::new()
                },
                stream: true,
            };

            let (turn, turn_usage) = self.stream_turn(request, &transcript_id, cancel).await?;
            if let Some(turn_usage) = &turn_usage {
                usage.absorb(turn_usage);
            }
            self.usage_sink.record(UsageRecord::completion(
                transcript_id.clone(),
                self.provider.name(),
                self.config.model.clone(),
                turn_usage,
            ));

            let tool_calls = turn.tool_calls().to_vec();
            let text = turn.text().map(str::to_owned);
            transcript.push(turn);
            budget.record_iteration();

            if !tool_calls.is_empty() {
                let skipped = self
                    .run_tool_calls(transcript, budget, &tool_calls, cancel)
                    .await?;
                if !skipped.is_empty() {
                    self.inject_correction(transcript, iteration, &skipped);
                }
                continue;
            }

            return match text {
                Some(text) => Ok(text),
                None => Err(AgentError::EmptyResponse { iteration }),
            };
        }

        Err(AgentError::BudgetExhausted {
            iterations: budget.iterations_used(),
            tool_calls: budget.tool_calls_used(),
        })
    }

    /// Send one request and fold its stream into an assistant turn.
    async fn stream_turn(
        &self,
        request: ChatRequest,
        transcript_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(Turn, Option<Usage>), AgentError> {
        let mut rx = cancellable(cancel, self.provider.send_turn(request)).await??;
        let mut accumulator = DeltaAccumulator::new();
        let mut usage = None;

        // Dropping `rx` on any early return abandons the read.
        loop {
            let Some(event) = cancellable(cancel, rx.recv()).await? else {
                return Err(ProviderError::StreamInterrupted(
                    "stream closed before end of turn".into(),
                )
                .into());
            };
            match event? {
                StreamEvent::Fragment(fragment) => {
                    if let Some(text) = fragment.content.as_ref().filter(|t| !t.is_empty()) {
                        self.event_bus.publish(DomainEvent::ContentDelta {
                            transcript_id: transcript_id.to_string(),
                            content: text.clone(),
                        });
                    }
                    accumulator.push(fragment)?;
                }
                StreamEvent::Usage(reported) => usage = Some(reported),
                StreamEvent::Done => break,
            }
        }

        Ok((accumulator.finish(), usage))
    }

    /// Execute invocations in order until the tool budget runs out.
    /// Returns the invocations left unexecuted.
    async fn run_tool_calls(
        &self,
        transcript: &mut Transcript,
        budget: &mut Budget,
        tool_calls: &[ToolInvocation],
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolInvocation>, AgentError> {
        let mut skipped = Vec::new();
        let mut seen: Vec<&str> = Vec::new();

        for call in tool_calls {
            if seen.contains(&call.id.as_str()) {
                warn!(call_id = %call.id, "Ignoring repeated tool call id in one turn");
                continue;
            }
            seen.push(&call.id);

            if !budget.try_take_tool_call() {
                skipped.push(call.clone());
                continue;
            }

            let start = Instant::now();
            let result = cancellable(cancel, self.tools.invoke(&call.name, &call.arguments)).await?;
            let duration_ms = start.elapsed().as_millis() as u64;

            let result = result.unwrap_or_else(|e| {
                match &e {
                    ToolError::ArgumentParse { .. } => {
                        warn!(tool = %call.name, call_id = %call.id, error = %e, "Malformed tool arguments")
                    }
                    _ => warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool execution failed"),
                }
                ToolResult::from_error(&e)
            });

            let transcript_id = transcript.id.to_string();
            self.event_bus.publish(DomainEvent::ToolExecuted {
                transcript_id: transcript_id.clone(),
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                success: result.success,
                duration_ms,
                timestamp: Utc::now(),
            });
            self.usage_sink.record(UsageRecord::tool_call(
                transcript_id,
                call.name.clone(),
                result.success,
                duration_ms,
            ));

            transcript.push_tool_result(call.id.clone(), result.output)?;
        }

        Ok(skipped)
    }

    /// Tell the model to stop asking for tools, naming any calls that were
    /// left unanswered.
    fn inject_correction(&self, transcript: &mut Transcript, iteration: u32, skipped: &[ToolInvocation]) {
        let mut content = ANSWER_NOW.to_string();
        if !skipped.is_empty() {
            let listed: Vec<String> = skipped
                .iter()
                .map(|c| format!("{} ({})", c.id, c.name))
                .collect();
            content.push_str(&format!(
                " These tool calls were not executed and will not receive results: {}.",
                listed.join(", ")
            ));
        }

        debug!(transcript_id = %transcript.id, iteration, skipped = skipped.len(), "Injecting corrective system turn");
        self.event_bus.publish(DomainEvent::CorrectionInjected {
            transcript_id: transcript.id.to_string(),
            iteration,
            skipped_calls: skipped.iter().map(|c| c.id.clone()).collect(),
            timestamp: Utc::now(),
        });
        transcript.push(Turn::system(content));
    }
}

/// Race `future` against cancellation. The future is dropped on cancel.
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, AgentError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        output = future => Ok(output),
    }
}
