//! # Cardsmith Core
//!
//! Domain types, traits, and error definitions for the Cardsmith study
//! assistant's agent runtime. This crate has **no HTTP dependencies**; it
//! defines the domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (chat provider, search backend, usage sink)
//! is a trait here. Implementations live in their respective crates, which
//! keeps the agent loop testable with scripted stand-ins.

pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod search;
pub mod tool;
pub mod usage;

// Re-export key types at crate root for ergonomics
pub use agent::AgentConfig;
pub use error::{Error, ProviderError, Result, ToolError, TranscriptError};
pub use event::{DomainEvent, EventBus};
pub use message::{Role, ToolInvocation, Transcript, TranscriptId, Turn};
pub use provider::{
    ChatRequest, FragmentReceiver, Provider, StreamEvent, StreamFragment, ToolCallFragment,
    ToolDefinition, Usage,
};
pub use search::{SearchBackend, SearchHit, SearchResponse};
pub use tool::{Tool, ToolRegistry, ToolResult};
pub use usage::{NoopUsageSink, UsageKind, UsageRecord, UsageSink};
