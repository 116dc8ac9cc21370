//! Transparent chunking of oversized values.
//!
//! Backends impose per-item size limits; callers should not care. Values
//! whose serialized form exceeds the threshold are split into chunk items
//! stored under `chunk#<sk>#<generation>#<index>` keys, with a small
//! sentinel written under the original sort key. Each write uses a fresh
//! generation id and writes the sentinel last, so a reader either sees the
//! previous complete generation or the new one, never a torn mix.

use serde_json::{json, Value};
use tracing::warn;

use crate::state::NonLockingMap;

const SENTINEL_FIELD: &str = "__chunked__";

pub struct ChunkedMap<M> {
    inner: M,
    threshold: usize,
}

impl<M: NonLockingMap> ChunkedMap<M> {
    pub fn new(inner: M, threshold: usize) -> Self {
        // 4 bytes is the widest UTF-8 codepoint; below that a single char
        // could not fit in any chunk.
        assert!(threshold >= 4, "chunk threshold must be at least 4 bytes");
        Self { inner, threshold }
    }

    fn resolve(&self, pk: &str, sk: &str, stored: Value) -> Option<Value> {
        let Some(sentinel) = stored.get(SENTINEL_FIELD) else {
            return Some(stored);
        };
        let generation = sentinel.get("generation").and_then(Value::as_str)?;
        let count = sentinel.get("count").and_then(Value::as_u64)? as usize;

        let prefix = format!("chunk#{sk}#{generation}#");
        let chunks = self.inner.scan_prefix(pk, &prefix);
        if chunks.len() != count {
            warn!(
                pk,
                sk,
                generation,
                expected = count,
                found = chunks.len(),
                "incomplete chunk generation, treating item as absent"
            );
            return None;
        }
        let serialized: String = chunks
            .iter()
            .filter_map(|(_, chunk)| chunk.as_str())
            .collect();
        match serde_json::from_str(&serialized) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(pk, sk, generation, %err, "reassembled chunks are not valid JSON");
                None
            }
        }
    }
}

/// Split `text` into pieces of at most `limit` bytes, on char boundaries.
fn split_chunks(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if current.len() + ch.len_utf8() > limit {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

impl<M: NonLockingMap> NonLockingMap for ChunkedMap<M> {
    fn get(&self, pk: &str, sk: &str) -> Option<Value> {
        let stored = self.inner.get(pk, sk)?;
        self.resolve(pk, sk, stored)
    }

    fn set(&self, pk: &str, sk: &str, value: Value) {
        let serialized = value.to_string();
        if serialized.len() <= self.threshold {
            self.inner.set(pk, sk, value);
            return;
        }

        let generation = uuid::Uuid::new_v4().simple().to_string();
        let chunks = split_chunks(&serialized, self.threshold);
        for (index, chunk) in chunks.iter().enumerate() {
            let chunk_sk = format!("chunk#{sk}#{generation}#{index:08}");
            self.inner.set(pk, &chunk_sk, Value::String(chunk.clone()));
        }
        // The sentinel goes last; until it lands, readers keep seeing the
        // previous generation.
        self.inner.set(
            pk,
            sk,
            json!({ SENTINEL_FIELD: { "generation": generation, "count": chunks.len() } }),
        );
    }

    fn scan_prefix(&self, pk: &str, prefix: &str) -> Vec<(String, Value)> {
        self.inner
            .scan_prefix(pk, prefix)
            .into_iter()
            .filter(|(sk, _)| !sk.starts_with("chunk#"))
            .filter_map(|(sk, stored)| {
                self.resolve(pk, &sk, stored).map(|value| (sk, value))
            })
            .collect()
    }
}
