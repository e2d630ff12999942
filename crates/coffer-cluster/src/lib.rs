//! coffer-cluster: the distributed plane.
//!
//! Maps documents to owners (hash ring within a cluster, deterministic
//! cluster pick across the ensemble), transports commands between nodes,
//! and keeps the routing tables consistent with live membership through
//! the discovery loop.

pub mod discovery;
pub mod dispatch;
mod error;
mod hash;
mod membership;
mod node;
mod partition;
mod ring;
mod router;

pub use discovery::{EnsembleConfig, EnsembleManager};
pub use dispatch::{execute_on_router, execute_on_store, StoreContext};
pub use error::{ClusterError, ProcessingError, RouteError};
pub use hash::murmur3_32;
pub use membership::LocalMembership;
pub use node::{LocalNode, Node, RemoteNode, RemoteNodeFactory, TcpNodeFactory};
pub use partition::cluster_for;
pub use ring::{Ring, RING_SLOTS};
pub use router::Router;
