//! Usage bookkeeping for Cardsmith agents.
//!
//! The agent loop reports every provider round-trip and tool execution to
//! a [`UsageSink`](cardsmith_core::UsageSink). [`UsageLedger`] is the
//! in-process sink: it keeps the records and running totals per process.

pub mod ledger;

pub use ledger::{UsageLedger, UsageTotals};
