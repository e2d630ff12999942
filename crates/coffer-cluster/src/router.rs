//! The router: composes the ensemble partitioner and the per-cluster rings
//! over live node tables.
//!
//! The cluster set is fixed for the life of the process; what changes is
//! which nodes are reachable inside each cluster. Discovery (for remote
//! clusters) and runtime callbacks (for the local one) mutate the tables;
//! request paths only ever read a consistent snapshot.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::error::RouteError;
use crate::node::Node;
use crate::partition::cluster_for;
use crate::ring::Ring;

struct ClusterRoutes {
    nodes: Vec<Arc<dyn Node>>,
    ring: Ring,
}

impl ClusterRoutes {
    fn rebuild_ring(&mut self) {
        let names = self.nodes.iter().map(|n| n.name().to_string()).collect();
        self.ring = Ring::build(names);
    }
}

pub struct Router {
    local_cluster: String,
    local_node: Arc<dyn Node>,
    /// Sorted; the basis for the ensemble-wide bucket assignment.
    cluster_names: Vec<String>,
    tables: HashMap<String, RwLock<ClusterRoutes>>,
}

impl Router {
    /// Sets up routing for the whole ensemble: the local cluster plus every
    /// known remote cluster. The local node starts routable immediately.
    pub fn new(
        local_cluster: impl Into<String>,
        remote_clusters: impl IntoIterator<Item = String>,
        local_node: Arc<dyn Node>,
    ) -> Self {
        let local_cluster = local_cluster.into();
        let mut cluster_names: Vec<String> = remote_clusters.into_iter().collect();
        cluster_names.push(local_cluster.clone());
        cluster_names.sort();
        cluster_names.dedup();

        let mut tables = HashMap::new();
        for name in &cluster_names {
            let nodes: Vec<Arc<dyn Node>> = if *name == local_cluster {
                vec![local_node.clone()]
            } else {
                Vec::new()
            };
            let mut routes = ClusterRoutes {
                nodes,
                ring: Ring::build(Vec::new()),
            };
            routes.rebuild_ring();
            tables.insert(name.clone(), RwLock::new(routes));
        }

        Self {
            local_cluster,
            local_node,
            cluster_names,
            tables,
        }
    }

    pub fn local_cluster(&self) -> &str {
        &self.local_cluster
    }

    pub fn clusters(&self) -> &[String] {
        &self.cluster_names
    }

    /// Adds (or replaces) a route. Rebuilds that cluster's ring.
    pub fn add_route(&self, cluster: &str, node: Arc<dyn Node>) -> Result<(), RouteError> {
        let table = self.tables.get(cluster).ok_or_else(|| RouteError::missing(cluster))?;
        let mut routes = table.write().unwrap_or_else(|e| e.into_inner());
        routes.nodes.retain(|existing| existing.name() != node.name());
        info!(cluster, node = node.name(), "route added");
        routes.nodes.push(node);
        routes.rebuild_ring();
        Ok(())
    }

    /// Drops a route by node name. Rebuilds that cluster's ring.
    pub fn remove_route(&self, cluster: &str, node_name: &str) -> Result<(), RouteError> {
        let table = self.tables.get(cluster).ok_or_else(|| RouteError::missing(cluster))?;
        let mut routes = table.write().unwrap_or_else(|e| e.into_inner());
        let before = routes.nodes.len();
        routes.nodes.retain(|existing| existing.name() != node_name);
        if routes.nodes.len() != before {
            info!(cluster, node = node_name, "route removed");
            routes.rebuild_ring();
        }
        Ok(())
    }

    pub fn route_to_local_node(&self) -> Arc<dyn Node> {
        self.local_node.clone()
    }

    /// The single owner of (bucket, key) across the whole ensemble.
    pub fn route_to_node_for(&self, bucket: &str, key: &str) -> Result<Arc<dyn Node>, RouteError> {
        let cluster = cluster_for(&self.cluster_names, bucket)
            .ok_or_else(|| RouteError::missing("<empty ensemble>"))?;
        self.node_in_cluster(cluster, bucket, key)
    }

    /// Groups keys by their owning node, for multi-key fan-out.
    pub fn route_to_nodes_for(
        &self,
        bucket: &str,
        keys: impl IntoIterator<Item = String>,
    ) -> Result<HashMap<String, (Arc<dyn Node>, Vec<String>)>, RouteError> {
        let cluster = cluster_for(&self.cluster_names, bucket)
            .ok_or_else(|| RouteError::missing("<empty ensemble>"))?;

        let table = self.tables.get(cluster).ok_or_else(|| RouteError::missing(cluster))?;
        let routes = table.read().unwrap_or_else(|e| e.into_inner());

        let mut grouped: HashMap<String, (Arc<dyn Node>, Vec<String>)> = HashMap::new();
        for key in keys {
            let owner = routes
                .ring
                .node_for(bucket, &key)
                .ok_or_else(|| RouteError::missing(cluster))?;
            match grouped.get_mut(owner) {
                Some((_, bucket_keys)) => bucket_keys.push(key),
                None => {
                    let node = routes
                        .nodes
                        .iter()
                        .find(|n| n.name() == owner)
                        .cloned()
                        .ok_or_else(|| RouteError::missing(cluster))?;
                    grouped.insert(owner.to_string(), (node, vec![key]));
                }
            }
        }
        debug!(bucket, groups = grouped.len(), "grouped keys by owner");
        Ok(grouped)
    }

    /// A snapshot of every live node per cluster, for whole-bucket fan-out.
    /// Clusters with no live nodes appear with an empty node list.
    pub fn broadcast_route(&self) -> HashMap<String, Vec<Arc<dyn Node>>> {
        let mut snapshot = HashMap::with_capacity(self.cluster_names.len());
        for name in &self.cluster_names {
            if let Some(table) = self.tables.get(name) {
                let routes = table.read().unwrap_or_else(|e| e.into_inner());
                snapshot.insert(name.clone(), routes.nodes.clone());
            }
        }
        snapshot
    }

    fn node_in_cluster(
        &self,
        cluster: &str,
        bucket: &str,
        key: &str,
    ) -> Result<Arc<dyn Node>, RouteError> {
        let table = self.tables.get(cluster).ok_or_else(|| RouteError::missing(cluster))?;
        let routes = table.read().unwrap_or_else(|e| e.into_inner());
        let owner = routes
            .ring
            .node_for(bucket, key)
            .ok_or_else(|| RouteError::missing(cluster))?;
        routes
            .nodes
            .iter()
            .find(|n| n.name() == owner)
            .cloned()
            .ok_or_else(|| RouteError::missing(cluster))
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("local_cluster", &self.local_cluster)
            .field("clusters", &self.cluster_names)
            .finish_non_exhaustive()
    }
}
