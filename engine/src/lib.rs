//! Standard-agnostic conformance-testing engine.
//!
//! This crate implements the core of a multi-party conformance harness: it
//! expands a small combinator algebra into the set of valid conversation
//! scenarios for a messaging standard, tracks per-step action state that can
//! be persisted and replayed, attributes interleaved request/response
//! exchanges to the correct in-progress scenario instance, and rolls the
//! verdicts up into a per-role conformance report. The architecture enforces
//! a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (scenario expansion, action
//!   state, exchange correlation, status reduction). No I/O, fully testable
//!   in isolation.
//! - **[`state`]**: The partitioned key-value persistence shared by every
//!   scenario instance, including optimistic locking and transparent
//!   chunking of oversized values.
//!
//! Standard modules supply the content (action factories, correlation
//! predicates, schemas); the orchestrator that drives instances lives in the
//! `harness` crate.

pub mod core;
pub mod exchange;
pub mod prompt;
pub mod schema;
pub mod state;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
