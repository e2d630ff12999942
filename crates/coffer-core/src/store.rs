//! The node-local store: a concurrent map of named buckets.

use std::sync::Arc;

use dashmap::DashMap;

use crate::bucket::Bucket;
use crate::error::{ErrorMessage, StoreError};

/// All buckets hosted by this node.
///
/// `Clone` is cheap; clones share the same bucket map.
#[derive(Debug, Clone, Default)]
pub struct Store {
    buckets: Arc<DashMap<String, Arc<Bucket>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an existing bucket.
    pub fn get(&self, name: &str) -> Option<Arc<Bucket>> {
        self.buckets.get(name).map(|b| b.clone())
    }

    /// Looks up a bucket, creating it on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<Bucket> {
        self.buckets
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Bucket::new(name)))
            .clone()
    }

    /// Looks up a bucket that must already exist.
    pub fn require(&self, name: &str) -> Result<Arc<Bucket>, StoreError> {
        self.get(name)
            .ok_or_else(|| StoreError(ErrorMessage::not_found(format!("bucket not found: {name}"))))
    }

    /// Drops a bucket and all its data.
    pub fn remove(&self, name: &str) {
        self.buckets.remove(name);
    }

    /// Names of all buckets hosted here.
    pub fn bucket_names(&self) -> Vec<String> {
        self.buckets.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn get_or_create_is_idempotent() {
        let store = Store::new();
        let first = store.get_or_create("b");
        let second = store.get_or_create("b");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.bucket_names(), ["b"]);
    }

    #[test]
    fn require_missing_bucket_is_not_found() {
        let store = Store::new();
        assert_eq!(store.require("nope").unwrap_err().code(), ErrorCode::NotFound);
    }

    #[test]
    fn remove_drops_bucket() {
        let store = Store::new();
        store.get_or_create("b");
        store.remove("b");
        assert!(store.get("b").is_none());
        assert!(store.bucket_names().is_empty());
    }

    #[test]
    fn clones_share_state() {
        let store = Store::new();
        let clone = store.clone();
        store.get_or_create("b");
        assert!(clone.get("b").is_some());
    }
}
