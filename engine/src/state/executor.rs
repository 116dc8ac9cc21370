//! Atomic read-transform-write over the locking map.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::Value;
use tracing::debug;

use crate::state::LockingMap;

/// Upper bound on contention retries before the operation is abandoned.
const MAX_ATTEMPTS: u32 = 1000;

/// Runs pure transformations atomically: load the current value, apply the
/// function, write back under the loaded version token, and retry the whole
/// cycle if another writer slipped in between.
#[derive(Clone)]
pub struct StatefulExecutor {
    map: Arc<dyn LockingMap>,
}

impl StatefulExecutor {
    pub fn new(map: Arc<dyn LockingMap>) -> Self {
        Self { map }
    }

    /// Apply `transform` to the item at `pk`/`sk` and persist the result.
    ///
    /// Absent items are presented to `transform` as JSON `null`. The
    /// transform must be pure: under contention it is re-invoked on the
    /// fresher value, and only the final invocation's result is persisted.
    /// Returns the persisted value.
    pub fn execute(
        &self,
        operation: &str,
        pk: &str,
        sk: &str,
        transform: impl Fn(Value) -> Value,
    ) -> Result<Value> {
        for attempt in 1..=MAX_ATTEMPTS {
            let current = self.map.load(pk, sk);
            let next = transform(current.value);
            if self.map.store(pk, sk, next.clone(), current.version) {
                return Ok(next);
            }
            debug!(operation, pk, sk, attempt, "version conflict, retrying");
        }
        bail!("operation '{operation}' on {pk}/{sk} exceeded {MAX_ATTEMPTS} attempts");
    }

    /// Read the current value without writing anything back.
    ///
    /// Absent items read as JSON `null`, matching what a transform would
    /// see. Unlike [`StatefulExecutor::execute`], this never touches the
    /// item's version token.
    pub fn load(&self, pk: &str, sk: &str) -> Value {
        self.map.load(pk, sk).value
    }
}
