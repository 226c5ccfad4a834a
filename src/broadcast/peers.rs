use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::network::NodeId;

/// The peers this node gossips to directly.
///
/// Readers take a cheap snapshot; a write swaps in a new one.
#[derive(Debug, Default)]
pub struct Topology {
    peers: RwLock<Arc<Vec<NodeId>>>,
}

impl Topology {
    pub fn new() -> Self {
        Topology::default()
    }

    /// Replaces the peer set. `self_id` and repeated entries are dropped.
    pub fn set_peers<I>(&self, self_id: &str, peers: I)
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut members: Vec<NodeId> = Vec::new();
        for peer in peers {
            if peer != self_id && !members.contains(&peer) {
                members.push(peer);
            }
        }

        let previous = std::mem::replace(&mut *self.peers.write(), Arc::new(members.clone()));
        if !previous.is_empty() {
            info!("Node {}: replacing peers {:?} with {:?}", self_id, previous, members);
        }
    }

    pub fn peers(&self) -> Arc<Vec<NodeId>> {
        self.peers.read().clone()
    }
}
