//! Conformance harness runtime.
//!
//! Wires a standard module (scenario tree, check tree, schemas) to the
//! engine: the [`orchestrator`] drives concurrent scenario instances and
//! feeds their traffic to the check tree, [`config`] and [`logging`] cover
//! the operational surface, and [`standard`] ships the sample document
//! release standard.

pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod simulate;
pub mod standard;
