//! Ensemble discovery: keeps routing tables in step with foreign clusters.
//!
//! For every joined remote cluster the manager tracks a bootstrap node, the
//! ordered list of currently known nodes, and the last view those nodes
//! reported. A single timer drives periodic refresh; the local cluster is
//! never probed (runtime callbacks own it).
//!
//! Failures here never propagate to callers of the manager's timer: each
//! tick logs and moves on, and the next tick retries from whatever state
//! the failure left behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use coffer_core::ErrorMessage;
use coffer_protocol::{Command, Reply, View};

use crate::error::{ClusterError, ProcessingError, RouteError};
use crate::node::{Node, RemoteNodeFactory};
use crate::router::Router;

/// Discovery settings, supplied at join time.
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    pub discovery_interval: Duration,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(5),
        }
    }
}

/// Discovery state for one remote cluster.
struct ClusterDiscovery {
    bootstrap: Arc<dyn Node>,
    /// Probe candidates, in the order they joined.
    nodes: Vec<Arc<dyn Node>>,
    /// Last successfully reported view. Kept across total failures so a
    /// recovering cluster diffs against what we last knew.
    view: Option<View>,
}

pub struct EnsembleManager {
    router: Arc<Router>,
    factory: Arc<dyn RemoteNodeFactory>,
    clusters: Mutex<HashMap<String, ClusterDiscovery>>,
    timer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl EnsembleManager {
    pub fn new(router: Arc<Router>, factory: Arc<dyn RemoteNodeFactory>) -> Self {
        Self {
            router,
            factory,
            clusters: Mutex::new(HashMap::new()),
            timer: std::sync::Mutex::new(None),
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Registers a remote cluster with its bootstrap seed (`host:port`) and
    /// activates the discovery timer. Joining the local cluster is a caller
    /// bug, rejected outright.
    pub async fn join(
        self: &Arc<Self>,
        cluster: &str,
        seed: &str,
        config: &EnsembleConfig,
    ) -> Result<(), ClusterError> {
        if cluster == self.router.local_cluster() {
            return Err(ClusterError::Processing(ProcessingError(
                ErrorMessage::bad_request(format!("no need to join local cluster: {cluster}")),
            )));
        }
        let (host, port) = parse_seed(seed)?;
        let bootstrap = self.factory.make_node(host, port, seed);

        let mut clusters = self.clusters.lock().await;
        clusters.insert(
            cluster.to_string(),
            ClusterDiscovery {
                bootstrap,
                nodes: Vec::new(),
                view: None,
            },
        );
        drop(clusters);

        info!(cluster, seed, "joined ensemble cluster");
        self.ensure_timer(config.discovery_interval);
        Ok(())
    }

    /// One refresh pass for a single cluster. Called by the timer for every
    /// registered cluster; callable directly for an on-demand refresh.
    pub async fn update(&self, cluster: &str) -> Result<(), ClusterError> {
        let mut clusters = self.clusters.lock().await;
        let entry = clusters
            .get_mut(cluster)
            .ok_or_else(|| ClusterError::MissingRoute(RouteError::missing(cluster)))?;

        if entry.nodes.is_empty() {
            debug!(cluster, "bootstrapping discovery");
            let bootstrap = entry.bootstrap.clone();
            let probed = async {
                bootstrap.connect().await?;
                request_view(&bootstrap).await
            }
            .await;
            // the bootstrap node is transient either way
            bootstrap.disconnect().await;
            let updated = probed?;
            self.apply_view(cluster, entry, updated).await;
        } else {
            debug!(cluster, "updating cluster view");
            let updated = self.request_membership(cluster, entry).await?;
            self.apply_view(cluster, entry, updated).await;
        }
        Ok(())
    }

    /// Cancels the timer and disconnects every node in every cluster.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        let mut clusters = self.clusters.lock().await;
        for (cluster, entry) in clusters.iter_mut() {
            for node in entry.nodes.drain(..) {
                info!(cluster = %cluster, node = node.name(), "disconnecting on shutdown");
                node.disconnect().await;
            }
        }
    }

    fn ensure_timer(self: &Arc<Self>, interval: Duration) {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if timer.is_some() {
            return;
        }
        let manager = Arc::downgrade(self);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick fires immediately; skip it so join() returns
            // before any probing starts
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                manager.tick().await;
            }
        }));
    }

    async fn tick(&self) {
        let names: Vec<String> = {
            let clusters = self.clusters.lock().await;
            clusters.keys().cloned().collect()
        };
        for cluster in names {
            if let Err(error) = self.update(&cluster).await {
                info!(cluster = %cluster, %error, "membership refresh failed; will retry next tick");
            }
        }
    }

    /// Probes candidates in order. A candidate that fails is gone for good:
    /// out of the router, disconnected, dropped from the list — before the
    /// next dispatch can see it.
    async fn request_membership(
        &self,
        cluster: &str,
        entry: &mut ClusterDiscovery,
    ) -> Result<View, ClusterError> {
        while let Some(candidate) = entry.nodes.first().cloned() {
            match request_view(&candidate).await {
                Ok(view) => {
                    debug!(cluster, node = candidate.name(), "view refreshed");
                    return Ok(view);
                }
                Err(error) => {
                    warn!(cluster, node = candidate.name(), %error, "candidate failed, evicting");
                    let _ = self.router.remove_route(cluster, candidate.name());
                    candidate.disconnect().await;
                    entry.nodes.retain(|n| n.name() != candidate.name());
                    info!(cluster, node = candidate.name(), "disconnected remote node");
                }
            }
        }
        Err(ClusterError::MissingRoute(RouteError::missing(cluster)))
    }

    /// Diffs the reported view against the last known one and mutates the
    /// router accordingly. The first successful probe diffs against the
    /// empty view, so every member joins.
    async fn apply_view(&self, cluster: &str, entry: &mut ClusterDiscovery, updated: View) {
        let current = entry.view.clone().unwrap_or_else(|| View::empty(cluster));

        for leaver in current.leavers(&updated) {
            let Some(node) = entry.nodes.iter().find(|n| n.name() == leaver.name).cloned() else {
                continue;
            };
            let _ = self.router.remove_route(cluster, node.name());
            node.disconnect().await;
            entry.nodes.retain(|n| n.name() != leaver.name);
            info!(cluster, node = %leaver, "remote node left");
        }

        for joiner in current.joiners(&updated) {
            let node = self.factory.make_node(&joiner.host, joiner.port, &joiner.name);
            let _ = self.router.add_route(cluster, node.clone());
            if let Err(error) = node.connect().await {
                // keep the route; a dead joiner is evicted by the next probe
                warn!(cluster, node = %joiner, %error, "connect to joining node failed");
            }
            entry.nodes.push(node);
            info!(cluster, node = %joiner, "remote node joined");
        }

        entry.view = Some(updated);
    }
}

impl std::fmt::Debug for EnsembleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleManager").finish_non_exhaustive()
    }
}

async fn request_view(node: &Arc<dyn Node>) -> Result<View, ProcessingError> {
    match node.send(Command::Membership).await? {
        Reply::View(view) => Ok(view),
        other => Err(ProcessingError(ErrorMessage::internal(format!(
            "membership probe returned {other:?}"
        )))),
    }
}

fn parse_seed(seed: &str) -> Result<(&str, u16), ClusterError> {
    let malformed = || {
        ClusterError::Processing(ProcessingError(ErrorMessage::bad_request(format!(
            "malformed seed '{seed}': expected host:port"
        ))))
    };
    let (host, port) = seed.rsplit_once(':').ok_or_else(malformed)?;
    if host.is_empty() {
        return Err(malformed());
    }
    let port: u16 = port.parse().map_err(|_| malformed())?;
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use coffer_protocol::Member;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Shared world state for scripted nodes: which node names answer, and
    /// the view the cluster currently reports.
    struct MockNet {
        alive: StdMutex<HashSet<String>>,
        view: StdMutex<View>,
    }

    impl MockNet {
        fn new(cluster: &str) -> Arc<Self> {
            Arc::new(Self {
                alive: StdMutex::new(HashSet::new()),
                view: StdMutex::new(View::empty(cluster)),
            })
        }

        fn set_alive(&self, names: &[&str]) {
            *self.alive.lock().unwrap() = names.iter().map(|s| s.to_string()).collect();
        }

        fn set_view(&self, members: &[&str]) {
            let cluster = self.view.lock().unwrap().cluster.clone();
            *self.view.lock().unwrap() = View::new(
                cluster,
                members.iter().map(|name| Member::new(*name, "10.0.0.1", 7070)),
            );
        }
    }

    struct MockNode {
        name: String,
        net: Arc<MockNet>,
        connects: AtomicUsize,
        disconnects: AtomicUsize,
    }

    #[async_trait]
    impl Node for MockNode {
        fn name(&self) -> &str {
            &self.name
        }

        async fn connect(&self) -> Result<(), ProcessingError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.net.alive.lock().unwrap().contains(&self.name) {
                Ok(())
            } else {
                Err(ProcessingError(ErrorMessage::unavailable("connect refused")))
            }
        }

        async fn send(&self, command: Command) -> Result<Reply, ProcessingError> {
            assert!(matches!(command, Command::Membership));
            if self.net.alive.lock().unwrap().contains(&self.name) {
                Ok(Reply::View(self.net.view.lock().unwrap().clone()))
            } else {
                Err(ProcessingError(ErrorMessage::unavailable("node down")))
            }
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockFactory {
        net: Arc<MockNet>,
        made: StdMutex<Vec<Arc<MockNode>>>,
    }

    impl MockFactory {
        fn new(net: Arc<MockNet>) -> Arc<Self> {
            Arc::new(Self {
                net,
                made: StdMutex::new(Vec::new()),
            })
        }

        fn nodes_named(&self, name: &str) -> Vec<Arc<MockNode>> {
            self.made
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.name == name)
                .cloned()
                .collect()
        }
    }

    impl RemoteNodeFactory for MockFactory {
        fn make_node(&self, _host: &str, _port: u16, name: &str) -> Arc<dyn Node> {
            let node = Arc::new(MockNode {
                name: name.to_string(),
                net: self.net.clone(),
                connects: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
            });
            self.made.lock().unwrap().push(node.clone());
            node
        }
    }

    struct LocalStub;

    #[async_trait]
    impl Node for LocalStub {
        fn name(&self) -> &str {
            "local"
        }
        async fn connect(&self) -> Result<(), ProcessingError> {
            Ok(())
        }
        async fn send(&self, _: Command) -> Result<Reply, ProcessingError> {
            Ok(Reply::None)
        }
        async fn disconnect(&self) {}
    }

    fn harness() -> (Arc<EnsembleManager>, Arc<MockFactory>, Arc<MockNet>, Arc<Router>) {
        let net = MockNet::new("remote");
        let factory = MockFactory::new(net.clone());
        let router = Arc::new(Router::new(
            "main",
            vec!["remote".to_string()],
            Arc::new(LocalStub),
        ));
        let manager = Arc::new(EnsembleManager::new(router.clone(), factory.clone()));
        (manager, factory, net, router)
    }

    fn route_names(router: &Router, cluster: &str) -> Vec<String> {
        let mut names: Vec<String> = router.broadcast_route()[cluster]
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn join_local_cluster_is_rejected() {
        let (manager, _, _, _) = harness();
        let err = manager.join("main", "h:1", &EnsembleConfig::default()).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn malformed_seed_is_rejected() {
        let (manager, _, _, _) = harness();
        for seed in ["nohost", ":1", "h:notaport"] {
            assert!(manager.join("remote", seed, &EnsembleConfig::default()).await.is_err(), "{seed}");
        }
    }

    #[tokio::test]
    async fn bootstrap_failure_keeps_list_empty_then_recovers() {
        let (manager, factory, net, router) = harness();
        manager.join("remote", "seedhost:7070", &EnsembleConfig::default()).await.unwrap();

        // first tick: seed unreachable
        assert!(manager.update("remote").await.is_err());
        assert!(route_names(&router, "remote").is_empty());

        // second tick: seed reachable and reports two members
        net.set_alive(&["seedhost:7070", "n1", "n2"]);
        net.set_view(&["n1", "n2"]);
        manager.update("remote").await.unwrap();

        assert_eq!(route_names(&router, "remote"), ["n1", "n2"]);
        for name in ["n1", "n2"] {
            let made = factory.nodes_named(name);
            assert_eq!(made.len(), 1, "{name} built once");
            assert_eq!(made[0].connects.load(Ordering::SeqCst), 1, "{name} connected once");
            assert_eq!(made[0].disconnects.load(Ordering::SeqCst), 0);
        }

        // the bootstrap node is transient: disconnected after every probe
        let seeds = factory.nodes_named("seedhost:7070");
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].disconnects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn leavers_are_evicted_and_joiners_connected() {
        let (manager, factory, net, router) = harness();
        manager.join("remote", "seedhost:7070", &EnsembleConfig::default()).await.unwrap();

        net.set_alive(&["seedhost:7070", "n1", "n2", "n3"]);
        net.set_view(&["n1", "n2", "n3"]);
        manager.update("remote").await.unwrap();
        assert_eq!(route_names(&router, "remote"), ["n1", "n2", "n3"]);

        // n2 leaves, n4 joins
        net.set_alive(&["n1", "n3", "n4"]);
        net.set_view(&["n1", "n3", "n4"]);
        manager.update("remote").await.unwrap();

        assert_eq!(route_names(&router, "remote"), ["n1", "n3", "n4"]);
        let n2 = factory.nodes_named("n2");
        assert_eq!(n2[0].disconnects.load(Ordering::SeqCst), 1, "leaver disconnected once");
        let n4 = factory.nodes_named("n4");
        assert_eq!(n4[0].connects.load(Ordering::SeqCst), 1, "joiner connected once");
    }

    #[tokio::test]
    async fn failed_candidate_is_skipped_and_next_one_answers() {
        let (manager, factory, net, router) = harness();
        manager.join("remote", "seedhost:7070", &EnsembleConfig::default()).await.unwrap();

        net.set_alive(&["seedhost:7070", "n1", "n2"]);
        net.set_view(&["n1", "n2"]);
        manager.update("remote").await.unwrap();

        // n1 dies; the view (served by n2) no longer carries it
        net.set_alive(&["n2"]);
        net.set_view(&["n2"]);
        manager.update("remote").await.unwrap();

        assert_eq!(route_names(&router, "remote"), ["n2"]);
        let n1 = factory.nodes_named("n1");
        assert_eq!(n1[0].disconnects.load(Ordering::SeqCst), 1, "evicted before next dispatch");
    }

    #[tokio::test]
    async fn total_failure_raises_missing_route_and_preserves_view() {
        let (manager, factory, net, router) = harness();
        manager.join("remote", "seedhost:7070", &EnsembleConfig::default()).await.unwrap();

        net.set_alive(&["seedhost:7070", "n1", "n2"]);
        net.set_view(&["n1", "n2"]);
        manager.update("remote").await.unwrap();

        // everything dies
        net.set_alive(&[]);
        let err = manager.update("remote").await.unwrap_err();
        assert!(matches!(err, ClusterError::MissingRoute(_)));
        assert!(route_names(&router, "remote").is_empty());
        // each evicted candidate was disconnected exactly once
        for name in ["n1", "n2"] {
            assert_eq!(factory.nodes_named(name)[0].disconnects.load(Ordering::SeqCst), 1);
        }

        // the last known view is preserved, not cleared: a recovering
        // cluster reporting the identical view diffs to nothing, so members
        // only become routable again once the view actually changes
        net.set_alive(&["seedhost:7070", "n1", "n2"]);
        manager.update("remote").await.unwrap();
        assert!(route_names(&router, "remote").is_empty());
        assert_eq!(factory.nodes_named("n1").len(), 1, "no rebuilt instance yet");

        net.set_alive(&["seedhost:7070", "n1", "n2", "n3"]);
        net.set_view(&["n1", "n2", "n3"]);
        manager.update("remote").await.unwrap();
        assert_eq!(route_names(&router, "remote"), ["n3"], "only the genuinely new member joins");
    }

    #[tokio::test]
    async fn shutdown_disconnects_all_nodes() {
        let (manager, factory, net, _) = harness();
        manager.join("remote", "seedhost:7070", &EnsembleConfig::default()).await.unwrap();

        net.set_alive(&["seedhost:7070", "n1", "n2"]);
        net.set_view(&["n1", "n2"]);
        manager.update("remote").await.unwrap();

        manager.shutdown().await;
        for name in ["n1", "n2"] {
            assert_eq!(
                factory.nodes_named(name)[0].disconnects.load(Ordering::SeqCst),
                1,
                "{name}"
            );
        }
    }
}
