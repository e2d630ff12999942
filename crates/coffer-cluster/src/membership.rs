//! The local cluster's own membership snapshot.
//!
//! The local cluster is never probed by discovery: the clustered runtime
//! pushes membership callbacks here, and `Membership` commands arriving from
//! foreign clusters are answered from this snapshot.

use std::sync::RwLock;

use coffer_protocol::{Member, View};

/// Holder of the local cluster's current view.
#[derive(Debug)]
pub struct LocalMembership {
    view: RwLock<View>,
}

impl LocalMembership {
    pub fn new(cluster: impl Into<String>, members: impl IntoIterator<Item = Member>) -> Self {
        Self {
            view: RwLock::new(View::new(cluster, members)),
        }
    }

    /// The snapshot reported to foreign clusters.
    pub fn current(&self) -> View {
        self.view.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn cluster(&self) -> String {
        self.view.read().unwrap_or_else(|e| e.into_inner()).cluster.clone()
    }

    /// Runtime callback: a member joined the local cluster.
    pub fn member_joined(&self, member: Member) {
        self.view.write().unwrap_or_else(|e| e.into_inner()).members.insert(member);
    }

    /// Runtime callback: a member left the local cluster.
    pub fn member_left(&self, member: &Member) {
        self.view.write().unwrap_or_else(|e| e.into_inner()).members.remove(member);
    }
}
