//! Fan-out queries: whole-bucket reads, range queries, predicate scans.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use coffer_cluster::{Node, Router};
use coffer_core::{ErrorMessage, OperatorRegistry, Predicate, Range, Value};
use coffer_protocol::{Command, Reply};

use super::ServiceError;
use crate::parallel::{parallel_map, parallel_merge};

pub struct QueryService {
    router: Arc<Router>,
    operators: Arc<OperatorRegistry>,
}

impl QueryService {
    pub fn new(router: Arc<Router>, operators: Arc<OperatorRegistry>) -> Self {
        Self { router, operators }
    }

    /// Single-key read from the owning node, optionally guarded.
    pub async fn get_value(
        &self,
        bucket: &str,
        key: &str,
        predicate: Predicate,
    ) -> Result<Value, ServiceError> {
        if !predicate.is_empty() {
            self.operators.condition(predicate.condition_type())?;
        }
        debug!(bucket, key, "getting value");
        let node = self.router.route_to_node_for(bucket, key)?;
        let reply = node
            .send(Command::GetValue {
                bucket: bucket.into(),
                key: key.into(),
                predicate,
            })
            .await?;
        match reply {
            Reply::Value(value) => Ok(value),
            other => Err(unexpected_reply("get-value", &other)),
        }
    }

    /// Bucket-name inventory across the whole ensemble: one answering node
    /// per cluster, all clusters in parallel, results unioned.
    pub async fn get_buckets(&self) -> Result<HashSet<String>, ServiceError> {
        debug!("getting bucket names");
        let per_cluster = self.multicast(Command::GetBuckets, |reply| match reply {
            Reply::Buckets(buckets) => Some(buckets),
            _ => None,
        });
        Ok(per_cluster.await.into_iter().flatten().collect())
    }

    /// Every value of a bucket: broadcast the key inventory, group keys by
    /// owner, fetch each group in parallel, union the partial maps.
    pub async fn get_all_values(
        &self,
        bucket: &str,
        limit: usize,
    ) -> Result<HashMap<String, Value>, ServiceError> {
        debug!(bucket, limit, "getting all values");
        let mut keys: Vec<String> = self.all_keys(bucket).await.into_iter().collect();
        if limit > 0 {
            keys.truncate(limit);
        }
        self.fetch_values(bucket, keys, Predicate::empty()).await
    }

    /// Ordered range query. Per-cluster ordered key sets are merged pairwise
    /// into one ordered sequence, values are fetched per owning node, and
    /// the result keeps the merged order.
    pub async fn query_by_range(
        &self,
        bucket: &str,
        range: Range,
        predicate: Predicate,
        time_to_live_ms: u64,
    ) -> Result<Vec<(String, Value)>, ServiceError> {
        let comparator = self.operators.comparator_or_default(&range.comparator_name);
        if !predicate.is_empty() {
            self.operators.condition(predicate.condition_type())?;
        }
        debug!(bucket, "range query");

        let per_cluster = self
            .multicast(
                Command::RangeQuery {
                    bucket: bucket.into(),
                    range: range.clone(),
                    time_to_live_ms,
                },
                |reply| match reply {
                    Reply::Keys(keys) => Some(keys),
                    _ => None,
                },
            )
            .await;

        let mut merged = parallel_merge(per_cluster, comparator).await;
        if range.limit > 0 {
            merged.truncate(range.limit);
        }

        let mut values = self.fetch_values(bucket, merged.clone(), predicate).await?;
        Ok(merged
            .into_iter()
            .filter_map(|key| values.remove(&key).map(|value| (key, value)))
            .collect())
    }

    /// Condition-guarded whole-bucket scan. The predicate is mandatory here;
    /// the returned map is unordered.
    pub async fn query_by_predicate(
        &self,
        bucket: &str,
        predicate: Predicate,
    ) -> Result<HashMap<String, Value>, ServiceError> {
        if predicate.is_empty() {
            return Err(ServiceError(ErrorMessage::bad_request(
                "predicate query requires a non-empty predicate",
            )));
        }
        self.operators.condition(predicate.condition_type())?;
        debug!(bucket, "predicate query");

        let keys: Vec<String> = self.all_keys(bucket).await.into_iter().collect();
        self.fetch_values(bucket, keys, predicate).await
    }

    /// Union of the bucket's keys as reported by one node per cluster.
    async fn all_keys(&self, bucket: &str) -> HashSet<String> {
        let per_cluster = self
            .multicast(Command::GetKeys { bucket: bucket.into() }, |reply| match reply {
                Reply::Keys(keys) => Some(keys),
                _ => None,
            })
            .await;
        per_cluster.into_iter().flatten().collect()
    }

    /// Sends one command to every cluster in parallel, trying that cluster's
    /// nodes in order until one answers. A cluster whose every candidate
    /// fails contributes nothing — inventory queries tolerate holes, and the
    /// failure is logged for the operator.
    async fn multicast<T, F>(&self, command: Command, extract: F) -> Vec<T>
    where
        T: Default + Send + 'static,
        F: Fn(Reply) -> Option<T> + Clone + Send + Sync + 'static,
    {
        let snapshot: Vec<(String, Vec<Arc<dyn Node>>)> =
            self.router.broadcast_route().into_iter().collect();

        parallel_map(snapshot, |(cluster, nodes)| {
            let command = command.clone();
            let extract = extract.clone();
            async move {
                for node in nodes {
                    match node.send(command.clone()).await {
                        Ok(reply) => match extract(reply) {
                            Some(contribution) => return contribution,
                            None => {
                                warn!(cluster = %cluster, node = node.name(), "unexpected reply type");
                                return T::default();
                            }
                        },
                        Err(error) => {
                            warn!(cluster = %cluster, node = node.name(), %error, "node failed, trying next");
                        }
                    }
                }
                warn!(cluster = %cluster, command = command.kind(), "no node answered");
                T::default()
            }
        })
        .await
    }

    /// Groups keys by owning node and fetches every group in parallel.
    /// Unlike the inventory multicasts, a failure here fails the operation:
    /// the keys were already routed, so a missing group would silently drop
    /// data. The node's error crosses back unchanged.
    async fn fetch_values(
        &self,
        bucket: &str,
        keys: Vec<String>,
        predicate: Predicate,
    ) -> Result<HashMap<String, Value>, ServiceError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let grouped: Vec<(Arc<dyn Node>, Vec<String>)> = self
            .router
            .route_to_nodes_for(bucket, keys)?
            .into_values()
            .collect();

        let bucket = bucket.to_string();
        let partials = parallel_map(grouped, |(node, node_keys)| {
            let command = Command::GetValues {
                bucket: bucket.clone(),
                keys: node_keys,
                predicate: predicate.clone(),
            };
            async move { node.send(command).await }
        })
        .await;

        let mut merged = HashMap::new();
        for partial in partials {
            match partial? {
                Reply::ValueMap(entries) => merged.extend(entries),
                other => return Err(unexpected_reply("get-values", &other)),
            }
        }
        Ok(merged)
    }
}

fn unexpected_reply(operation: &str, reply: &Reply) -> ServiceError {
    ServiceError(ErrorMessage::internal(format!(
        "{operation} produced an unexpected reply: {reply:?}"
    )))
}
