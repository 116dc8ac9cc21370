//! Partitioned key/value persistence.
//!
//! All durable state lives in sorted partitions: a partition key groups
//! related items, a sort key orders them within the partition. Two access
//! disciplines share that keyspace: a non-locking map for append-only
//! records such as traffic logs, and a version-token map for state that
//! concurrent handlers mutate. The chunking layer sits transparently under
//! the non-locking map so callers never see backend item-size limits.

pub mod chunking;
pub mod executor;
pub mod memory;

use std::sync::Arc;

use serde_json::Value;

use crate::state::chunking::ChunkedMap;
use crate::state::executor::StatefulExecutor;
use crate::state::memory::{MemoryLockingMap, MemoryNonLockingMap};

/// Unconditional reads and writes over sorted partitions.
pub trait NonLockingMap: Send + Sync {
    fn get(&self, pk: &str, sk: &str) -> Option<Value>;

    fn set(&self, pk: &str, sk: &str, value: Value);

    /// All items of `pk` whose sort key starts with `prefix`, in sort-key
    /// order.
    fn scan_prefix(&self, pk: &str, prefix: &str) -> Vec<(String, Value)>;
}

/// A value together with the version token guarding its next write.
///
/// Version `0` means the item does not exist yet; its value reads as JSON
/// `null` so transformations can treat first and later writes uniformly.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedValue {
    pub value: Value,
    pub version: u64,
}

impl VersionedValue {
    pub fn absent() -> Self {
        Self {
            value: Value::Null,
            version: 0,
        }
    }
}

/// Compare-and-set writes over sorted partitions.
pub trait LockingMap: Send + Sync {
    fn load(&self, pk: &str, sk: &str) -> VersionedValue;

    /// Store `value` if the item's version still equals `expected_version`.
    /// Returns `false` when another writer got there first.
    fn store(&self, pk: &str, sk: &str, value: Value, expected_version: u64) -> bool;
}

/// The two persistence disciplines bundled for the orchestrator. Clones
/// share the same underlying maps.
#[derive(Clone)]
pub struct PersistenceProvider {
    pub non_locking: Arc<dyn NonLockingMap>,
    pub executor: StatefulExecutor,
}

impl PersistenceProvider {
    /// In-memory provider; `chunk_threshold` bounds the serialized size of
    /// any single stored item.
    pub fn in_memory(chunk_threshold: usize) -> Self {
        Self {
            non_locking: Arc::new(ChunkedMap::new(
                MemoryNonLockingMap::default(),
                chunk_threshold,
            )),
            executor: StatefulExecutor::new(Arc::new(MemoryLockingMap::default())),
        }
    }
}
