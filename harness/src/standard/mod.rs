//! Standard modules: the content the engine runs.
//!
//! A standard module contributes a scenario tree (what conversations the
//! parties must hold), a mirroring check tree (how traffic is attributed
//! and judged), and the schemas its message bodies must satisfy.

pub mod document_release;
