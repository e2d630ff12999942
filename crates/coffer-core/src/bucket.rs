//! A bucket: one named container of key/document pairs.
//!
//! Buckets hold the node-local share of the data. Single-key writes that need
//! read-then-write semantics (conditional put, update) serialize through a
//! per-key guard; plain puts and reads go straight to the map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value as Json;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ErrorMessage, StoreError};
use crate::features::{Range, Update};
use crate::operators::{Comparator, Condition, Function};
use crate::value::Value;

/// Cached sorted key index, reused by range queries within their
/// time-to-live window.
struct KeyIndex {
    keys: Vec<String>,
    comparator_name: String,
    taken_at: Instant,
}

pub struct Bucket {
    name: String,
    data: DashMap<String, Value>,
    /// Per-key serialization guards for read-modify-write operations.
    key_guards: DashMap<String, Arc<Mutex<()>>>,
    index_cache: Mutex<Option<KeyIndex>>,
}

impl Bucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: DashMap::new(),
            key_guards: DashMap::new(),
            index_cache: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Unconditional put.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Plain read.
    pub fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.data.get(key).map(|v| v.clone()).ok_or_else(|| self.key_not_found(key))
    }

    /// Guarded read: the value is returned only when the condition holds.
    /// An unsatisfied guard reads the same as an absent key.
    pub fn get_guarded(
        &self,
        key: &str,
        condition: &dyn Condition,
        expression: &str,
    ) -> Result<Value, StoreError> {
        let value = self.get(key)?;
        if condition.is_satisfied(key, &value.json()?, expression) {
            Ok(value)
        } else {
            Err(self.key_not_found(key))
        }
    }

    /// Delete. Absent keys are a `NotFound`.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.data.remove(key).map(|_| ()).ok_or_else(|| self.key_not_found(key))
    }

    /// Conditional put: when the key exists, the condition is evaluated
    /// against the current value under the per-key guard and the put happens
    /// only if it holds. An absent key inserts unconditionally.
    pub async fn conditional_put(
        &self,
        key: &str,
        value: Value,
        condition: &dyn Condition,
        expression: &str,
    ) -> Result<(), StoreError> {
        let guard = self.guard_for(key);
        let _held = guard.lock().await;

        if let Some(existing) = self.data.get(key).map(|v| v.clone()) {
            if !condition.is_satisfied(key, &existing.json()?, expression) {
                return Err(StoreError(ErrorMessage::conflict(format!(
                    "unsatisfied condition '{expression}' for key: {key}"
                ))));
            }
        }
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    /// Read-modify-write: runs `function` on the current document within
    /// `update.timeout_ms`, then stores the result. The per-key guard is held
    /// for the whole call, so concurrent updates of one key serialize. On
    /// timeout the update is abandoned and the old value stays.
    pub async fn update(
        &self,
        key: &str,
        update: &Update,
        function: Arc<dyn Function>,
    ) -> Result<Value, StoreError> {
        let guard = self.guard_for(key);
        let _held = guard.lock().await;

        let current = self.get(key)?.json()?;
        let deadline = Duration::from_millis(update.timeout_ms);
        let owned_key = key.to_string();
        let params = update.params.clone();

        let applied = tokio::time::timeout(
            deadline,
            tokio::task::spawn_blocking(move || function.apply(&owned_key, current, &params)),
        )
        .await;

        let updated: Json = match applied {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                return Err(StoreError(ErrorMessage::internal(format!(
                    "update function '{}' aborted: {join_error}",
                    update.function_name
                ))));
            }
            Err(_elapsed) => {
                debug!(bucket = %self.name, key, function = %update.function_name,
                       "update timed out after {}ms", update.timeout_ms);
                return Err(StoreError(ErrorMessage::timeout(format!(
                    "update function '{}' exceeded {}ms for key: {key}",
                    update.function_name, update.timeout_ms
                ))));
            }
        };

        let value = Value::from_json(&updated)?;
        self.data.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// All keys currently held by this node for the bucket.
    pub fn keys(&self) -> Vec<String> {
        self.data.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Ordered key subset within `range`, sorted by `comparator`.
    ///
    /// The sorted index is cached: a query with `time_to_live > 0` reuses a
    /// snapshot taken within that window for the same comparator; `0` always
    /// recomputes.
    pub async fn keys_in_range(
        &self,
        range: &Range,
        comparator: Arc<dyn Comparator>,
        time_to_live: Duration,
    ) -> Vec<String> {
        let sorted = self.sorted_index(&range.comparator_name, &*comparator, time_to_live).await;

        let mut selected: Vec<String> = sorted
            .into_iter()
            .filter(|key| {
                comparator.compare(key, &range.start_key) != std::cmp::Ordering::Less
                    && range
                        .end_key
                        .as_deref()
                        .map_or(true, |end| comparator.compare(key, end) != std::cmp::Ordering::Greater)
            })
            .collect();
        if range.limit > 0 {
            selected.truncate(range.limit);
        }
        selected
    }

    /// Bulk read. With a condition, entries whose value does not satisfy it
    /// are silently omitted; absent keys are omitted too.
    pub fn get_values(
        &self,
        keys: &[String],
        guard: Option<(&dyn Condition, &str)>,
    ) -> Result<HashMap<String, Value>, StoreError> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            let Some(value) = self.data.get(key).map(|v| v.clone()) else {
                continue;
            };
            if let Some((condition, expression)) = guard {
                if !condition.is_satisfied(key, &value.json()?, expression) {
                    continue;
                }
            }
            found.insert(key.clone(), value);
        }
        Ok(found)
    }

    async fn sorted_index(
        &self,
        comparator_name: &str,
        comparator: &dyn Comparator,
        time_to_live: Duration,
    ) -> Vec<String> {
        let mut cache = self.index_cache.lock().await;
        if time_to_live > Duration::ZERO {
            if let Some(index) = cache.as_ref() {
                if index.comparator_name == comparator_name && index.taken_at.elapsed() <= time_to_live
                {
                    return index.keys.clone();
                }
            }
        }

        let mut keys = self.keys();
        keys.sort_by(|a, b| comparator.compare(a, b));
        *cache = Some(KeyIndex {
            keys: keys.clone(),
            comparator_name: comparator_name.to_string(),
            taken_at: Instant::now(),
        });
        keys
    }

    fn guard_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.key_guards
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn key_not_found(&self, key: &str) -> StoreError {
        StoreError(ErrorMessage::not_found(format!(
            "key not found in bucket '{}': {key}",
            self.name
        )))
    }
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}
