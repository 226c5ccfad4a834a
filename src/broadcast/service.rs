use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::gossip::{Disseminator, PropagationReport};
use super::message::{Request, Response};
use super::peers::Topology;
use super::retry::RetryQueue;
use super::store::ValueStore;
use crate::common::clock::Clock;
use crate::common::config::NodeConfig;
use crate::common::error::HandlerError;
use crate::network::{Handler, NodeId, Rpc};

/// Handles `broadcast`, `read` and `topology` for one node.
pub struct BroadcastService {
    rpc: Arc<dyn Rpc>,
    store: Arc<ValueStore>,
    topology: Arc<Topology>,
    gossip: Disseminator,
    clock: Clock,
}

impl BroadcastService {
    pub fn new(rpc: Arc<dyn Rpc>, retry: Arc<RetryQueue>, config: &NodeConfig) -> Self {
        let store = Arc::new(ValueStore::new());
        let topology = Arc::new(Topology::new());
        let gossip = Disseminator::new(rpc.clone(), topology.clone(), retry, config.rpc_timeout);

        BroadcastService {
            rpc,
            store,
            topology,
            gossip,
            clock: Clock::new(),
        }
    }

    pub async fn process(&self, request: Request) -> Response {
        match request {
            Request::Broadcast {
                message,
                timestamp,
                history,
            } => {
                self.broadcast(message, timestamp, history.unwrap_or_default()).await;
                Response::BroadcastOk
            }
            Request::Read => Response::ReadOk {
                messages: self.store.read_all(),
            },
            Request::Topology { topology } => {
                self.apply_topology(&topology);
                Response::TopologyOk
            }
        }
    }

    /// Stores the value and, if it is new here, gossips it on.
    ///
    /// A missing timestamp marks a client broadcast and is taken from the local clock.
    pub async fn broadcast(&self, value: i64, timestamp: Option<i64>, history: Vec<NodeId>) -> Option<PropagationReport> {
        let timestamp = timestamp.unwrap_or_else(|| self.clock.now());

        if !self.store.insert(value, timestamp) {
            debug!("Node {}: already have {} at {}", self.rpc.node_id(), value, timestamp);
            return None;
        }

        debug!(
            "Node {}: stored {} at {}, {} values held",
            self.rpc.node_id(),
            value,
            timestamp,
            self.store.len()
        );

        let report = self.gossip.propagate(value, timestamp, &history).await;
        if !report.deferred.is_empty() {
            info!(
                "Node {}: {} deferred to retry for {:?}",
                self.rpc.node_id(),
                value,
                report.deferred
            );
        }
        Some(report)
    }

    fn apply_topology(&self, topology: &HashMap<NodeId, Vec<NodeId>>) {
        let self_id = self.rpc.node_id();

        let peers = match topology.get(&self_id) {
            Some(neighbours) => neighbours.clone(),
            None => {
                warn!("Node {}: not in topology, gossiping to every node", self_id);
                self.rpc.node_ids()
            }
        };

        self.topology.set_peers(&self_id, peers);
        info!("Node {}: gossiping to {:?}", self_id, self.topology.peers());
    }
}

#[cfg(test)]
impl BroadcastService {
    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn peers(&self) -> Arc<Vec<NodeId>> {
        self.topology.peers()
    }
}

#[async_trait]
impl Handler for BroadcastService {
    async fn handle(&self, _src: &str, body: Value) -> Result<Value, HandlerError> {
        let request: Request = serde_json::from_value(body)?;
        let response = self.process(request).await;
        serde_json::to_value(response).map_err(|e| HandlerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::network::sim::{SimCluster, Sink};

    fn service(cluster: &Arc<SimCluster>, id: &str, config: &NodeConfig) -> (Arc<BroadcastService>, Arc<RetryQueue>) {
        let retry = Arc::new(RetryQueue::new(config.retry_capacity));
        let service = Arc::new(BroadcastService::new(cluster.rpc(id), retry.clone(), config));
        (service, retry)
    }

    #[tokio::test]
    async fn test_read_on_empty_node() {
        let cluster = SimCluster::new(&["n1"]);
        let (service, _) = service(&cluster, "n1", &NodeConfig::default());

        let reply = service.handle("c1", json!({"type": "read"})).await.unwrap();
        assert_eq!(reply, json!({"type": "read_ok", "messages": []}));
    }

    #[tokio::test]
    async fn test_broadcast_then_read() {
        let cluster = SimCluster::new(&["n1"]);
        let (service, _) = service(&cluster, "n1", &NodeConfig::default());

        for value in [3, 1, 2] {
            let reply = service
                .handle("c1", json!({"type": "broadcast", "message": value}))
                .await
                .unwrap();
            assert_eq!(reply, json!({"type": "broadcast_ok"}));
        }

        let reply = service.handle("c1", json!({"type": "read"})).await.unwrap();
        assert_eq!(reply, json!({"type": "read_ok", "messages": [3, 1, 2]}));
    }

    #[tokio::test]
    async fn test_duplicate_timestamp_keeps_first_value() {
        let cluster = SimCluster::new(&["n1"]);
        let (service, _) = service(&cluster, "n1", &NodeConfig::default());

        service
            .handle("c1", json!({"type": "broadcast", "message": 1, "timestamp": 10}))
            .await
            .unwrap();
        let reply = service
            .handle("c1", json!({"type": "broadcast", "message": 2, "timestamp": 10}))
            .await
            .unwrap();

        assert_eq!(reply, json!({"type": "broadcast_ok"}));
        assert_eq!(service.store().read_all(), vec![1]);
    }

    #[tokio::test]
    async fn test_malformed_broadcast_is_rejected() {
        let cluster = SimCluster::new(&["n1"]);
        let (service, _) = service(&cluster, "n1", &NodeConfig::default());

        for body in [
            json!({"type": "broadcast"}),
            json!({"type": "broadcast", "message": 1.5}),
            json!({"type": "broadcast", "message": 1, "timestamp": 2.5}),
            json!({"type": "broadcast", "message": 1, "history": "n2"}),
            json!({"type": "topology", "topology": ["n2"]}),
        ] {
            let err = service.handle("c1", body).await.unwrap_err();
            assert!(matches!(err, HandlerError::Malformed(_)), "{:?}", err);
        }
        assert_eq!(service.store().len(), 0);
    }

    #[tokio::test]
    async fn test_supplied_topology() {
        let cluster = SimCluster::new(&["n1", "n2", "n3"]);
        let (service, _) = service(&cluster, "n1", &NodeConfig::default());

        let reply = service
            .handle("c1", json!({"type": "topology", "topology": {"n1": ["n2"], "n2": ["n1", "n3"], "n3": ["n2"]}}))
            .await
            .unwrap();

        assert_eq!(reply, json!({"type": "topology_ok"}));
        assert_eq!(*service.peers(), vec!["n2".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_entry_falls_back_to_all_nodes() {
        let cluster = SimCluster::new(&["n1", "n2", "n3"]);
        let (service, _) = service(&cluster, "n1", &NodeConfig::default());

        service
            .handle("c1", json!({"type": "topology", "topology": {"n2": ["n3"]}}))
            .await
            .unwrap();

        assert_eq!(*service.peers(), vec!["n2".to_string(), "n3".to_string()]);
    }

    #[tokio::test]
    async fn test_only_new_values_are_gossiped() {
        let cluster = SimCluster::new(&["n1", "n2"]);
        let sink = Arc::new(Sink::default());
        cluster.register("n2", sink.clone());
        let (service, _) = service(&cluster, "n1", &NodeConfig::default());
        service
            .handle("c1", json!({"type": "topology", "topology": {"n1": ["n2"]}}))
            .await
            .unwrap();

        let first = service.broadcast(5, Some(100), vec![]).await;
        let second = service.broadcast(5, Some(100), vec![]).await;

        assert_eq!(first.map(|report| report.delivered), Some(vec!["n2".to_string()]));
        assert_eq!(second, None);
        assert_eq!(
            sink.received(),
            vec![json!({"type": "broadcast", "message": 5, "timestamp": 100, "history": ["n1"]})]
        );
    }

    #[tokio::test]
    async fn test_broadcast_ok_despite_unreachable_peer() {
        let cluster = SimCluster::new(&["n1", "n2"]);
        cluster.register("n2", Arc::new(Sink::default()));
        cluster.partition("n2");
        let config = NodeConfig::default().with_rpc_timeout(Duration::from_millis(50));
        let (service, retry) = service(&cluster, "n1", &config);
        service
            .handle("c1", json!({"type": "topology", "topology": {"n1": ["n2"]}}))
            .await
            .unwrap();

        let reply = service
            .handle("c1", json!({"type": "broadcast", "message": 9}))
            .await
            .unwrap();

        assert_eq!(reply, json!({"type": "broadcast_ok"}));
        assert_eq!(service.store().read_all(), vec![9]);
        assert_eq!(retry.len(), 1);
    }
}
