//! Command dispatch: the two execution surfaces.
//!
//! A command is born on some node, handed to [`execute_on_router`] to reach
//! its owner, and finally run by [`execute_on_store`] on whichever node holds
//! the data. Point commands take both hops; fan-out commands are routed by
//! the service layer and only ever hit the store surface here.

use std::sync::Arc;
use std::time::Duration;

use coffer_core::{ErrorMessage, OperatorRegistry, Store, StoreError};
use coffer_protocol::{Command, Reply};

use crate::error::ClusterError;
use crate::membership::LocalMembership;
use crate::router::Router;

/// Everything store-side execution needs besides the command itself.
#[derive(Clone)]
pub struct StoreContext {
    store: Store,
    operators: Arc<OperatorRegistry>,
    membership: Arc<LocalMembership>,
}

impl StoreContext {
    pub fn new(store: Store, operators: Arc<OperatorRegistry>, membership: Arc<LocalMembership>) -> Self {
        Self {
            store,
            operators,
            membership,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }
}

/// Originating-side dispatch for point commands: resolve the single owning
/// node and forward. Fan-out commands never come through here.
pub async fn execute_on_router(command: Command, router: &Router) -> Result<Reply, ClusterError> {
    let node = match &command {
        // bucket schema ops are local; other clusters learn lazily
        Command::AddBucket { .. } | Command::RemoveBucket { .. } => router.route_to_local_node(),
        Command::PutValue { bucket, key, .. }
        | Command::RemoveValue { bucket, key }
        | Command::GetValue { bucket, key, .. }
        | Command::Update { bucket, key, .. } => router.route_to_node_for(bucket, key)?,
        other => {
            return Err(ClusterError::Processing(
                StoreError::from(ErrorMessage::internal(format!(
                    "{} is not a point command",
                    other.kind()
                )))
                .into(),
            ));
        }
    };
    Ok(node.send(command).await?)
}

/// Terminal-side dispatch: run the command against the local store.
pub async fn execute_on_store(command: Command, ctx: &StoreContext) -> Result<Reply, StoreError> {
    match command {
        Command::AddBucket { bucket } => {
            ctx.store.get_or_create(&bucket);
            Ok(Reply::None)
        }

        Command::RemoveBucket { bucket } => {
            ctx.store.remove(&bucket);
            Ok(Reply::None)
        }

        Command::PutValue {
            bucket,
            key,
            value,
            predicate,
        } => {
            let bucket = ctx.store.get_or_create(&bucket);
            if predicate.is_empty() {
                bucket.put(key, value);
            } else {
                let condition = ctx.operators.condition(predicate.condition_type())?;
                bucket
                    .conditional_put(&key, value, &*condition, predicate.expression())
                    .await?;
            }
            Ok(Reply::None)
        }

        Command::RemoveValue { bucket, key } => {
            ctx.store.require(&bucket)?.remove(&key)?;
            Ok(Reply::None)
        }

        Command::GetValue {
            bucket,
            key,
            predicate,
        } => {
            let bucket = ctx.store.require(&bucket)?;
            let value = if predicate.is_empty() {
                bucket.get(&key)?
            } else {
                let condition = ctx.operators.condition(predicate.condition_type())?;
                bucket.get_guarded(&key, &*condition, predicate.expression())?
            };
            Ok(Reply::Value(value))
        }

        Command::GetValues {
            bucket,
            keys,
            predicate,
        } => {
            let Some(bucket) = ctx.store.get(&bucket) else {
                return Ok(Reply::ValueMap(Default::default()));
            };
            let entries = if predicate.is_empty() {
                bucket.get_values(&keys, None)?
            } else {
                let condition = ctx.operators.condition(predicate.condition_type())?;
                bucket.get_values(&keys, Some((&*condition, predicate.expression())))?
            };
            Ok(Reply::ValueMap(entries))
        }

        Command::GetKeys { bucket } => {
            let keys = ctx.store.get(&bucket).map(|b| b.keys()).unwrap_or_default();
            Ok(Reply::Keys(keys))
        }

        Command::GetBuckets => Ok(Reply::Buckets(ctx.store.bucket_names())),

        Command::RangeQuery {
            bucket,
            range,
            time_to_live_ms,
        } => {
            let Some(bucket) = ctx.store.get(&bucket) else {
                return Ok(Reply::Keys(Vec::new()));
            };
            let comparator = ctx.operators.comparator_or_default(&range.comparator_name);
            let keys = bucket
                .keys_in_range(&range, comparator, Duration::from_millis(time_to_live_ms))
                .await;
            Ok(Reply::Keys(keys))
        }

        Command::Update {
            bucket,
            key,
            update,
        } => {
            // function names must resolve on the receiving node too
            let function = ctx.operators.function(&update.function_name)?;
            if let Some(bucket) = ctx.store.get(&bucket) {
                bucket.update(&key, &update, function).await?;
            }
            // callers re-read; the reply intentionally carries nothing
            Ok(Reply::None)
        }

        Command::Membership => Ok(Reply::View(ctx.membership.current())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use coffer_core::{ErrorCode, Predicate, Range, Update, Value};
    use coffer_protocol::Member;
    use serde_json::Map;

    fn context() -> StoreContext {
        StoreContext::new(
            Store::new(),
            Arc::new(OperatorRegistry::with_defaults()),
            Arc::new(LocalMembership::new("main", [Member::new("n1", "127.0.0.1", 7070)])),
        )
    }

    fn doc(raw: &'static str) -> Value {
        Value::from_bytes(Bytes::from_static(raw.as_bytes())).unwrap()
    }

    async fn run(ctx: &StoreContext, command: Command) -> Result<Reply, StoreError> {
        execute_on_store(command, ctx).await
    }

    #[tokio::test]
    async fn put_then_get() {
        let ctx = context();
        run(&ctx, Command::PutValue {
            bucket: "b".into(),
            key: "k1".into(),
            value: doc("{\"v\":1}"),
            predicate: Predicate::empty(),
        })
        .await
        .unwrap();

        let reply = run(&ctx, Command::GetValue {
            bucket: "b".into(),
            key: "k1".into(),
            predicate: Predicate::empty(),
        })
        .await
        .unwrap();
        assert_eq!(reply, Reply::Value(doc("{\"v\":1}")));
    }

    #[tokio::test]
    async fn conditional_put_conflict_preserves_value() {
        let ctx = context();
        run(&ctx, Command::PutValue {
            bucket: "b".into(),
            key: "k1".into(),
            value: doc("{\"v\":1}"),
            predicate: Predicate::empty(),
        })
        .await
        .unwrap();

        let err = run(&ctx, Command::PutValue {
            bucket: "b".into(),
            key: "k1".into(),
            value: doc("{\"v\":2}"),
            predicate: Predicate::new("pointer", "/v=2"),
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);

        let reply = run(&ctx, Command::GetValue {
            bucket: "b".into(),
            key: "k1".into(),
            predicate: Predicate::empty(),
        })
        .await
        .unwrap();
        assert_eq!(reply, Reply::Value(doc("{\"v\":1}")));
    }

    #[tokio::test]
    async fn unknown_condition_type_is_bad_request() {
        let ctx = context();
        let err = run(&ctx, Command::GetValue {
            bucket: "b".into(),
            key: "k1".into(),
            predicate: Predicate::new("nope", "x"),
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
    }

    #[tokio::test]
    async fn reads_on_missing_bucket() {
        let ctx = context();

        // single-key read demands the bucket
        let err = run(&ctx, Command::GetValue {
            bucket: "nope".into(),
            key: "k".into(),
            predicate: Predicate::empty(),
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        // inventory-style reads degrade to empty
        assert_eq!(
            run(&ctx, Command::GetKeys { bucket: "nope".into() }).await.unwrap(),
            Reply::Keys(Vec::new())
        );
        assert_eq!(
            run(&ctx, Command::GetValues {
                bucket: "nope".into(),
                keys: vec!["k".into()],
                predicate: Predicate::empty(),
            })
            .await
            .unwrap(),
            Reply::ValueMap(Default::default())
        );
    }

    #[tokio::test]
    async fn range_query_orders_keys() {
        let ctx = context();
        for key in ["d", "b", "a", "c"] {
            run(&ctx, Command::PutValue {
                bucket: "b".into(),
                key: key.into(),
                value: doc("{\"v\":1}"),
                predicate: Predicate::empty(),
            })
            .await
            .unwrap();
        }

        let reply = run(&ctx, Command::RangeQuery {
            bucket: "b".into(),
            range: Range::new("a", Some("c".into()), 0, "lexicographical"),
            time_to_live_ms: 0,
        })
        .await
        .unwrap();
        assert_eq!(reply, Reply::Keys(vec!["a".into(), "b".into(), "c".into()]));
    }

    #[tokio::test]
    async fn update_replies_nothing_and_callers_reread() {
        let ctx = context();
        run(&ctx, Command::PutValue {
            bucket: "b".into(),
            key: "k1".into(),
            value: doc("{\"a\":1}"),
            predicate: Predicate::empty(),
        })
        .await
        .unwrap();

        let mut params = Map::new();
        params.insert("b".into(), serde_json::json!(2));
        let reply = run(&ctx, Command::Update {
            bucket: "b".into(),
            key: "k1".into(),
            update: Update::new("merge", 1_000, params),
        })
        .await
        .unwrap();
        assert_eq!(reply, Reply::None);

        let reread = run(&ctx, Command::GetValue {
            bucket: "b".into(),
            key: "k1".into(),
            predicate: Predicate::empty(),
        })
        .await
        .unwrap();
        assert_eq!(
            reread,
            Reply::Value(doc("{\"a\":1,\"b\":2}"))
        );
    }

    #[tokio::test]
    async fn update_with_unknown_function_is_bad_request() {
        let ctx = context();
        let err = run(&ctx, Command::Update {
            bucket: "b".into(),
            key: "k1".into(),
            update: Update::new("nope", 1_000, Map::new()),
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
    }

    #[tokio::test]
    async fn membership_reports_local_view() {
        let ctx = context();
        let reply = run(&ctx, Command::Membership).await.unwrap();
        match reply {
            Reply::View(view) => {
                assert_eq!(view.cluster, "main");
                assert_eq!(view.members.len(), 1);
            }
            other => panic!("expected view, got {other:?}"),
        }
    }
}
