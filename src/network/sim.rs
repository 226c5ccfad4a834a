//! In-memory cluster for tests: calls go straight to the peer's handler.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};

use super::{Handler, NodeId, Rpc};
use crate::common::error::{HandlerError, RpcError};

#[derive(Default)]
pub struct SimCluster {
    node_ids: Vec<NodeId>,
    handlers: RwLock<HashMap<NodeId, Arc<dyn Handler>>>,
    partitioned: Mutex<HashSet<NodeId>>,
    failures: Mutex<HashMap<NodeId, usize>>,
    calls: Mutex<HashMap<NodeId, usize>>,
}

impl SimCluster {
    pub fn new(ids: &[&str]) -> Arc<Self> {
        Arc::new(SimCluster {
            node_ids: ids.iter().map(|id| id.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn rpc(self: &Arc<Self>, id: &str) -> Arc<SimRpc> {
        Arc::new(SimRpc {
            id: id.to_string(),
            cluster: self.clone(),
        })
    }

    pub fn register(&self, id: &str, handler: Arc<dyn Handler>) {
        self.handlers.write().insert(id.to_string(), handler);
    }

    /// Every call to `id` fails until [`SimCluster::heal`].
    pub fn partition(&self, id: &str) {
        self.partitioned.lock().insert(id.to_string());
    }

    pub fn heal(&self, id: &str) {
        self.partitioned.lock().remove(id);
    }

    /// The next `count` calls to `id` fail.
    pub fn fail_next(&self, id: &str, count: usize) {
        self.failures.lock().insert(id.to_string(), count);
    }

    pub fn calls_to(&self, id: &str) -> usize {
        self.calls.lock().get(id).copied().unwrap_or(0)
    }

    fn should_fail(&self, dest: &str) -> bool {
        if self.partitioned.lock().contains(dest) {
            return true;
        }
        let mut failures = self.failures.lock();
        match failures.get_mut(dest) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

pub struct SimRpc {
    id: NodeId,
    cluster: Arc<SimCluster>,
}

#[async_trait]
impl Rpc for SimRpc {
    fn node_id(&self) -> NodeId {
        self.id.clone()
    }

    fn node_ids(&self) -> Vec<NodeId> {
        self.cluster.node_ids.clone()
    }

    async fn call(&self, dest: &str, body: Value, timeout: Duration) -> Result<Value, RpcError> {
        *self.cluster.calls.lock().entry(dest.to_string()).or_default() += 1;

        if self.cluster.should_fail(dest) {
            return Err(RpcError::Timeout(dest.to_string()));
        }

        let handler = self.cluster.handlers.read().get(dest).cloned();
        let handler = handler.ok_or_else(|| RpcError::UnknownNode(dest.to_string()))?;

        match tokio::time::timeout(timeout, handler.handle(&self.id, body)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(RpcError::Remote {
                code: e.code(),
                text: e.to_string(),
            }),
            Err(_) => Err(RpcError::Timeout(dest.to_string())),
        }
    }
}

/// Records every body it receives and acknowledges it.
#[derive(Default)]
pub struct Sink {
    received: Mutex<Vec<Value>>,
}

impl Sink {
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl Handler for Sink {
    async fn handle(&self, _src: &str, body: Value) -> Result<Value, HandlerError> {
        self.received.lock().push(body);
        Ok(json!({"type": "broadcast_ok"}))
    }
}

/// Acknowledges after sleeping for the given duration.
pub struct Stall(pub Duration);

#[async_trait]
impl Handler for Stall {
    async fn handle(&self, _src: &str, _body: Value) -> Result<Value, HandlerError> {
        tokio::time::sleep(self.0).await;
        Ok(json!({"type": "broadcast_ok"}))
    }
}

/// Panics while handling, taking the caller's task down with it.
pub struct Crash;

#[async_trait]
impl Handler for Crash {
    async fn handle(&self, src: &str, _body: Value) -> Result<Value, HandlerError> {
        panic!("handler crashed on message from {}", src);
    }
}
