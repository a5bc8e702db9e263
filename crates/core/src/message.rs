//! Turn and Transcript domain types.
//!
//! A transcript is the append-only conversation the agent loop sends to the
//! provider on every iteration: system instructions, the user's question,
//! assistant replies (possibly requesting tools) and tool results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ToolError, TranscriptError};

/// Unique identifier for a transcript (one agent invocation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TranscriptId(pub String);

impl TranscriptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TranscriptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TranscriptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn, as the wire formats name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Turn {
    /// Instructions for the model (tool policy, corrective nudges).
    System { content: String },

    /// The end user's question.
    User { content: String },

    /// A finalized model reply.
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolInvocation>,
    },

    /// The output of one executed tool invocation.
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// A text-only assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    /// Text content of the turn, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::User { content } | Self::Tool { content, .. } => {
                Some(content)
            }
            Self::Assistant { content, .. } => content.as_deref(),
        }
    }

    /// Tool invocations requested by this turn (empty for non-assistant turns).
    pub fn tool_calls(&self) -> &[ToolInvocation] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// A tool call requested by the model.
///
/// `arguments` is the raw text accumulated from the stream. It is only
/// parsed once the owning assistant turn is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Provider-assigned id, immutable once observed
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

impl ToolInvocation {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the accumulated argument text. Only call this once the turn
    /// is finished.
    pub fn parse_arguments(&self) -> std::result::Result<serde_json::Value, ToolError> {
        parse_arguments(&self.name, &self.arguments)
    }
}

/// Parse raw tool-call argument text into JSON.
pub fn parse_arguments(
    tool_name: &str,
    raw: &str,
) -> std::result::Result<serde_json::Value, ToolError> {
    serde_json::from_str(raw).map_err(|e| ToolError::ArgumentParse {
        tool_name: tool_name.to_string(),
        reason: e.to_string(),
    })
}

/// The ordered conversation for one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Unique transcript ID
    pub id: TranscriptId,

    /// Ordered turns
    turns: Vec<Turn>,

    /// When this transcript was created
    pub created_at: DateTime<Utc>,

    /// When the last turn was appended
    pub updated_at: DateTime<Utc>,
}

impl Transcript {
    /// Create a new empty transcript.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: TranscriptId::new(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Seed a transcript with a system prompt and a user question.
    pub fn seeded(system_prompt: impl Into<String>, question: impl Into<String>) -> Self {
        let mut transcript = Self::new();
        transcript.push(Turn::system(system_prompt));
        transcript.push(Turn::user(question));
        transcript
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Append a system, user or assistant turn.
    ///
    /// Tool results must go through [`Transcript::push_tool_result`]; a
    /// `Turn::Tool` handed to this method is checked the same way.
    pub fn push(&mut self, turn: Turn) {
        if let Turn::Tool {
            tool_call_id,
            content,
        } = turn
        {
            if let Err(e) = self.push_tool_result(tool_call_id, content) {
                tracing::warn!(error = %e, "Dropping tool result that violates transcript order");
            }
            return;
        }
        self.append(turn);
    }

    /// Insert a system prompt at the front unless one is already there.
    pub fn ensure_system_prompt(&mut self, prompt: &str) {
        if !matches!(self.turns.first(), Some(Turn::System { .. })) {
            self.turns.insert(0, Turn::system(prompt));
            self.updated_at = Utc::now();
        }
    }

    /// Append a tool result answering one invocation of the nearest
    /// preceding assistant turn.
    pub fn push_tool_result(
        &mut self,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> std::result::Result<(), TranscriptError> {
        let tool_call_id = tool_call_id.into();

        let mut answered = Vec::new();
        let mut requester = None;
        for turn in self.turns.iter().rev() {
            match turn {
                Turn::Tool { tool_call_id, .. } => answered.push(tool_call_id.as_str()),
                Turn::Assistant { tool_calls, .. } => {
                    requester = Some(tool_calls);
                    break;
                }
                _ => break,
            }
        }

        let requested = requester
            .map(|calls| calls.iter().any(|c| c.id == tool_call_id))
            .unwrap_or(false);
        if !requested {
            return Err(TranscriptError::OrphanToolResult(tool_call_id));
        }
        if answered.contains(&tool_call_id.as_str()) {
            return Err(TranscriptError::DuplicateToolResult(tool_call_id));
        }

        self.append(Turn::Tool {
            tool_call_id,
            content: content.into(),
        });
        Ok(())
    }

    fn append(&mut self, turn: Turn) {
        self.updated_at = Utc::now();
        self.turns.push(turn);
    }

    /// Rough token estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.turns
            .iter()
            .map(|t| {
                t.text().map_or(0, str::len)
                    + t.tool_calls()
                        .iter()
                        .map(|c| c.name.len() + c.arguments.len())
                        .sum::<usize>()
            })
            .sum::<usize>()
            / 4
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
