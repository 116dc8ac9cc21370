//! In-memory map backends.

use std::collections::BTreeMap;
use std::ops::Bound;

use dashmap::DashMap;
use serde_json::Value;

use crate::state::{LockingMap, NonLockingMap, VersionedValue};

/// Partitions are independent `DashMap` shards; within a partition, a
/// `BTreeMap` keeps items in sort-key order for prefix scans.
#[derive(Default)]
pub struct MemoryNonLockingMap {
    partitions: DashMap<String, BTreeMap<String, Value>>,
}

impl NonLockingMap for MemoryNonLockingMap {
    fn get(&self, pk: &str, sk: &str) -> Option<Value> {
        self.partitions
            .get(pk)
            .and_then(|partition| partition.get(sk).cloned())
    }

    fn set(&self, pk: &str, sk: &str, value: Value) {
        self.partitions
            .entry(pk.to_string())
            .or_default()
            .insert(sk.to_string(), value);
    }

    fn scan_prefix(&self, pk: &str, prefix: &str) -> Vec<(String, Value)> {
        let Some(partition) = self.partitions.get(pk) else {
            return Vec::new();
        };
        partition
            .range::<String, _>((Bound::Included(prefix.to_string()), Bound::Unbounded))
            .take_while(|(sk, _)| sk.starts_with(prefix))
            .map(|(sk, value)| (sk.clone(), value.clone()))
            .collect()
    }
}

/// Version-token compare-and-set over a flat item map. The entry lock makes
/// each load-check-write atomic per item.
#[derive(Default)]
pub struct MemoryLockingMap {
    items: DashMap<(String, String), (u64, Value)>,
}

impl LockingMap for MemoryLockingMap {
    fn load(&self, pk: &str, sk: &str) -> VersionedValue {
        self.items
            .get(&(pk.to_string(), sk.to_string()))
            .map(|item| VersionedValue {
                version: item.0,
                value: item.1.clone(),
            })
            .unwrap_or_else(VersionedValue::absent)
    }

    fn store(&self, pk: &str, sk: &str, value: Value, expected_version: u64) -> bool {
        let mut entry = self
            .items
            .entry((pk.to_string(), sk.to_string()))
            .or_insert((0, Value::Null));
        if entry.0 != expected_version {
            return false;
        }
        *entry = (expected_version + 1, value);
        true
    }
}
