//! Pure, deterministic engine logic.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod action;
pub mod check;
pub mod params;
pub mod report;
pub mod scenario;
pub mod status;
