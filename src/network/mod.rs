pub mod message;
pub mod node;
#[cfg(test)]
pub mod sim;

pub use message::*;
pub use node::*;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::common::error::{HandlerError, RpcError};

/*
    Nodes talk over a lossy, reorderable network. A request either gets
    a reply within its timeout or is treated as failed; the caller never
    learns whether a timed out request was applied by the peer, so every
    message a peer may receive twice must be idempotent on arrival.
*/

pub type NodeId = String;

/// Outbound side of the substrate used by the broadcast core.
#[async_trait]
pub trait Rpc: Send + Sync + 'static {
    fn node_id(&self) -> NodeId;

    /// Every node of the cluster, this one included.
    fn node_ids(&self) -> Vec<NodeId>;

    /// Sends `body` to `dest` and waits up to `timeout` for the reply body.
    async fn call(&self, dest: &str, body: Value, timeout: Duration) -> Result<Value, RpcError>;
}

/// Inbound side: one decoded request body in, one reply body out.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, src: &str, body: Value) -> Result<Value, HandlerError>;
}

/// Dispatches inbound requests to handlers by their `type`.
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<String, Arc<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Router::default()
    }

    pub fn route(mut self, msg_type: &str, handler: Arc<dyn Handler>) -> Self {
        self.routes.insert(msg_type.to_string(), handler);
        self
    }

    pub async fn dispatch(&self, src: &str, body: Value) -> Result<Value, HandlerError> {
        let msg_type = body
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::Malformed("missing message type".into()))?;

        let handler = self
            .routes
            .get(msg_type)
            .cloned()
            .ok_or_else(|| HandlerError::NotSupported(msg_type.to_string()))?;

        handler.handle(src, body).await
    }
}
