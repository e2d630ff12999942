//! Point operations: puts, removes, schema changes, updates.

use std::sync::Arc;

use tracing::debug;

use coffer_cluster::{execute_on_router, Router};
use coffer_core::{ErrorMessage, OperatorRegistry, Predicate, Update, Value};
use coffer_protocol::Command;

use super::ServiceError;

pub struct UpdateService {
    router: Arc<Router>,
    operators: Arc<OperatorRegistry>,
}

impl UpdateService {
    pub fn new(router: Arc<Router>, operators: Arc<OperatorRegistry>) -> Self {
        Self { router, operators }
    }

    /// Creates a bucket on the local node. Other clusters learn the name
    /// lazily, through discovery and reads.
    pub async fn add_bucket(&self, bucket: &str) -> Result<(), ServiceError> {
        debug!(bucket, "adding bucket");
        self.router
            .route_to_local_node()
            .send(Command::AddBucket { bucket: bucket.into() })
            .await?;
        Ok(())
    }

    pub async fn remove_bucket(&self, bucket: &str) -> Result<(), ServiceError> {
        debug!(bucket, "removing bucket");
        self.router
            .route_to_local_node()
            .send(Command::RemoveBucket { bucket: bucket.into() })
            .await?;
        Ok(())
    }

    /// Stores a document on its owning node, optionally guarded. A non-empty
    /// predicate must name a registered condition before anything is routed.
    pub async fn put_value(
        &self,
        bucket: &str,
        key: &str,
        value: Value,
        predicate: Predicate,
    ) -> Result<(), ServiceError> {
        if !predicate.is_empty() {
            self.operators.condition(predicate.condition_type())?;
        }
        debug!(bucket, key, "putting value");
        execute_on_router(
            Command::PutValue {
                bucket: bucket.into(),
                key: key.into(),
                value,
                predicate,
            },
            &self.router,
        )
        .await?;
        Ok(())
    }

    pub async fn remove_value(&self, bucket: &str, key: &str) -> Result<(), ServiceError> {
        debug!(bucket, key, "removing value");
        execute_on_router(
            Command::RemoveValue {
                bucket: bucket.into(),
                key: key.into(),
            },
            &self.router,
        )
        .await?;
        Ok(())
    }

    /// Runs a named update function on the owning node. The function name is
    /// resolved here first so an unknown name fails fast; the receiving node
    /// resolves it again from its own registry. The reply carries no value —
    /// callers re-read.
    pub async fn execute_update(
        &self,
        bucket: &str,
        key: &str,
        update: Update,
    ) -> Result<(), ServiceError> {
        if update.function_name.is_empty() {
            return Err(ServiceError(ErrorMessage::bad_request("update function name is empty")));
        }
        self.operators.function(&update.function_name)?;
        debug!(bucket, key, function = %update.function_name, "executing update");
        execute_on_router(
            Command::Update {
                bucket: bucket.into(),
                key: key.into(),
                update,
            },
            &self.router,
        )
        .await?;
        Ok(())
    }
}
