//! The coffer node binary: boot the store, the router, discovery and the
//! command loop, then serve until killed.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use coffer_cluster::{
    EnsembleConfig, EnsembleManager, LocalMembership, LocalNode, Router, TcpNodeFactory,
};
use coffer_core::{OperatorRegistry, Store};
use coffer_protocol::Member;
use coffer_server::config::ServerOptions;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "coffer=info".into()))
        .init();

    let options = ServerOptions::parse();
    info!(node = %options.node_name, cluster = %options.cluster, "starting coffer node");

    let store = Store::new();
    let operators = Arc::new(OperatorRegistry::with_defaults());
    let membership = Arc::new(LocalMembership::new(
        options.cluster.clone(),
        [Member::new(
            options.node_name.clone(),
            options.bind.ip().to_string(),
            options.bind.port(),
        )],
    ));

    let local_node = Arc::new(LocalNode::new(
        options.node_name.clone(),
        store,
        operators,
        membership,
        options.worker_permits,
    ));
    let context = local_node.context().clone();

    let remote_clusters: Vec<String> = options
        .ensemble_seeds
        .iter()
        .map(|(cluster, _)| cluster.clone())
        .collect();
    let router = Arc::new(Router::new(
        options.cluster.clone(),
        remote_clusters,
        local_node,
    ));

    let factory = Arc::new(TcpNodeFactory {
        reply_timeout: options.reply_timeout,
    });
    let ensemble = Arc::new(EnsembleManager::new(router, factory));
    let ensemble_config = EnsembleConfig {
        discovery_interval: options.discovery_interval,
    };
    for (cluster, seed) in &options.ensemble_seeds {
        if let Err(e) = ensemble.join(cluster, seed, &ensemble_config).await {
            error!(cluster = %cluster, seed = %seed, %e, "failed to join ensemble cluster");
            std::process::exit(1);
        }
    }

    let listener = match TcpListener::bind(options.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind = %options.bind, %e, "failed to bind");
            std::process::exit(1);
        }
    };

    let result = coffer_server::serve(listener, context).await;
    ensemble.shutdown().await;
    if let Err(e) = result {
        error!(%e, "server loop terminated");
        std::process::exit(1);
    }
}
