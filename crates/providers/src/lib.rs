//! LLM Provider implementations for Cardsmith.
//!
//! All providers implement the `cardsmith_core::Provider` trait and stream
//! their replies through the shared SSE decoder. The factory builds the
//! one provider named in configuration.

pub mod anthropic;
pub mod factory;
mod http;
pub mod openai_compat;
pub mod sse;

pub use anthropic::AnthropicProvider;
pub use factory::{build_from_config, is_local};
pub use openai_compat::OpenAiCompatProvider;
pub use sse::{SseDecoder, SseFrame};
