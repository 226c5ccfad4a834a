use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::{check_reply, error_body, Envelope, InitBody, NodeId, Router, Rpc};
use crate::common::error::{HandlerError, NodeError, RpcError};

/// Line-delimited JSON node runtime.
///
/// Inbound requests are each handled in their own task; outbound messages
/// funnel through a single writer task so lines never interleave.
pub struct Node {
    id: RwLock<NodeId>,
    node_ids: RwLock<Vec<NodeId>>,
    next_msg_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    outbox: mpsc::UnboundedSender<Envelope>,
    outbox_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
}

impl Node {
    pub fn new() -> Arc<Self> {
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        Arc::new(Node {
            id: RwLock::new(NodeId::new()),
            node_ids: RwLock::new(Vec::new()),
            next_msg_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbox,
            outbox_rx: Mutex::new(Some(outbox_rx)),
        })
    }

    /// Reads messages from `input` until EOF, writing every outbound line to `output`.
    pub async fn run<R, W>(self: Arc<Self>, input: R, output: W, router: Router) -> Result<(), NodeError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let outbox_rx = self.outbox_rx.lock().take().ok_or(NodeError::AlreadyRunning)?;
        tokio::spawn(write_loop(outbox_rx, output));

        let router = Arc::new(router);
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Envelope>(&line) {
                Ok(envelope) => self.dispatch(envelope, &router),
                Err(e) => warn!("skipping unreadable message: {}", e),
            }
        }

        info!("Node {}: input closed", self.node_id());
        Ok(())
    }

    fn dispatch(self: &Arc<Self>, envelope: Envelope, router: &Arc<Router>) {
        if let Some(reply_to) = envelope.in_reply_to() {
            let waiter = self.pending.lock().remove(&reply_to);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(envelope.body);
                }
                None => debug!("dropping late reply {} from {}", reply_to, envelope.src),
            }
            return;
        }

        if envelope.msg_type() == Some("init") {
            self.handle_init(envelope);
            return;
        }

        let node = self.clone();
        let router = router.clone();
        tokio::spawn(async move {
            let reply = match router.dispatch(&envelope.src, envelope.body.clone()).await {
                Ok(body) => body,
                Err(err) => {
                    warn!("request from {} failed: {}", envelope.src, err);
                    error_body(err.code(), err.to_string())
                }
            };
            node.reply(&envelope, reply);
        });
    }

    fn handle_init(&self, envelope: Envelope) {
        match serde_json::from_value::<InitBody>(envelope.body.clone()) {
            Ok(init) => {
                info!("Node {}: initialized with {} nodes", init.node_id, init.node_ids.len());
                *self.id.write() = init.node_id;
                *self.node_ids.write() = init.node_ids;
                self.reply(&envelope, json!({"type": "init_ok"}));
            }
            Err(e) => {
                let err = HandlerError::from(e);
                warn!("bad init message: {}", err);
                self.reply(&envelope, error_body(err.code(), err.to_string()));
            }
        }
    }

    fn reply(&self, request: &Envelope, mut body: Value) {
        if let (Some(map), Some(msg_id)) = (body.as_object_mut(), request.msg_id()) {
            map.insert("in_reply_to".into(), msg_id.into());
        }
        if let Err(e) = self.send(&request.src, body) {
            error!("failed to reply to {}: {}", request.src, e);
        }
    }

    /// Queues a message for `dest`, stamping it with a fresh `msg_id`.
    pub fn send(&self, dest: &str, mut body: Value) -> Result<u64, RpcError> {
        let map = body
            .as_object_mut()
            .ok_or_else(|| RpcError::Encode("message body must be an object".into()))?;
        let msg_id = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
        map.insert("msg_id".into(), msg_id.into());

        self.outbox
            .send(Envelope {
                src: self.node_id(),
                dest: dest.to_string(),
                body,
            })
            .map_err(|_| RpcError::Closed)?;
        Ok(msg_id)
    }
}

#[async_trait]
impl Rpc for Node {
    fn node_id(&self) -> NodeId {
        self.id.read().clone()
    }

    fn node_ids(&self) -> Vec<NodeId> {
        self.node_ids.read().clone()
    }

    async fn call(&self, dest: &str, body: Value, timeout: Duration) -> Result<Value, RpcError> {
        {
            let known = self.node_ids.read();
            if !known.is_empty() && !known.iter().any(|id| id == dest) {
                return Err(RpcError::UnknownNode(dest.to_string()));
            }
        }

        // The waiter must be registered before the reader can see the reply.
        let (tx, rx) = oneshot::channel();
        let msg_id = {
            let mut pending = self.pending.lock();
            let msg_id = self.send(dest, body)?;
            pending.insert(msg_id, tx);
            msg_id
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => check_reply(reply),
            Ok(Err(_)) => Err(RpcError::Closed),
            Err(_) => {
                self.pending.lock().remove(&msg_id);
                Err(RpcError::Timeout(dest.to_string()))
            }
        }
    }
}

async fn write_loop<W>(mut outbox: mpsc::UnboundedReceiver<Envelope>, mut output: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = outbox.recv().await {
        let mut line = match serde_json::to_vec(&envelope) {
            Ok(line) => line,
            Err(e) => {
                error!("failed to encode message to {}: {}", envelope.dest, e);
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = output.write_all(&line).await {
            error!("failed to write message: {}", e);
            return;
        }
        if let Err(e) = output.flush().await {
            error!("failed to flush output: {}", e);
            return;
        }
    }
}
