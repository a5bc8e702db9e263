//! The agent loop: the heart of Cardsmith.
//!
//! One question runs as a bounded **ask → act → observe** cycle:
//!
//! 1. **Seed** the transcript (tool-usage policy + the user's question)
//! 2. **Stream** a reply from the provider, offering tools while the
//!    tool-call budget lasts
//! 3. **Accumulate** fragments into one assistant turn
//! 4. **If tool calls**: execute them in order, append results, loop back
//! 5. **If text**: that is the answer
//!
//! Both the number of provider round-trips and the number of executed tool
//! calls are capped, so every question terminates.

pub mod accumulator;
pub mod budget;
pub mod loop_runner;

#[cfg(test)]
mod test_helpers;

pub use accumulator::DeltaAccumulator;
pub use budget::Budget;
pub use loop_runner::{AgentError, AgentLoop, Completion, DEFAULT_SYSTEM_PROMPT};
