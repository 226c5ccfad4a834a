use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::message::Request;
use super::peers::Topology;
use super::retry::{RetryItem, RetryQueue};
use crate::common::error::RpcError;
use crate::network::{NodeId, Rpc};

/*
    Fan-out is history based: every propagated message lists the nodes it
    has already visited, and a node only forwards to peers missing from
    that list. This costs a growing payload per hop but avoids sending a
    value straight back to where it came from. Cycles in the topology are
    still cut by the receiver's store, which refuses a timestamp it has
    already seen and therefore never forwards it twice.
*/

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct PropagationReport {
    pub delivered: Vec<NodeId>,
    /// Peers whose send failed and was handed to the retry queue.
    pub deferred: Vec<NodeId>,
}

pub struct Disseminator {
    rpc: Arc<dyn Rpc>,
    topology: Arc<Topology>,
    retry: Arc<RetryQueue>,
    timeout: Duration,
}

impl Disseminator {
    pub fn new(rpc: Arc<dyn Rpc>, topology: Arc<Topology>, retry: Arc<RetryQueue>, timeout: Duration) -> Self {
        Disseminator {
            rpc,
            topology,
            retry,
            timeout,
        }
    }

    /// Sends the value to every peer not yet in `history`, concurrently.
    ///
    /// Returns once each send has either succeeded or been queued for retry.
    /// Queueing waits while the retry queue is full.
    pub async fn propagate(&self, value: i64, timestamp: i64, history: &[NodeId]) -> PropagationReport {
        let self_id = self.rpc.node_id();
        let mut history = history.to_vec();
        if !history.contains(&self_id) {
            history.push(self_id.clone());
        }

        let targets: Vec<NodeId> = self
            .topology
            .peers()
            .iter()
            .filter(|peer| !history.contains(peer))
            .cloned()
            .collect();

        let mut report = PropagationReport::default();
        if targets.is_empty() {
            return report;
        }

        let message = Request::propagation(value, timestamp, history);
        let sends: Vec<(NodeId, JoinHandle<Result<(), RpcError>>)> = targets
            .into_iter()
            .map(|peer| {
                let rpc = self.rpc.clone();
                let message = message.clone();
                let dest = peer.clone();
                let timeout = self.timeout;
                let send = tokio::spawn(async move { deliver(rpc.as_ref(), &dest, &message, timeout).await });
                (peer, send)
            })
            .collect();

        // Every send is already running; awaiting them in order only collects results.
        for (peer, send) in sends {
            let failure = match send.await {
                Ok(Ok(())) => {
                    report.delivered.push(peer);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => {
                    error!("Node {}: send task for {} failed: {}", self_id, peer, e);
                    e.to_string()
                }
            };

            debug!("Node {}: send of {} to {} failed, queueing retry: {}", self_id, value, peer, failure);
            self.retry
                .push(RetryItem {
                    peer: peer.clone(),
                    message: message.clone(),
                })
                .await;
            report.deferred.push(peer);
        }

        report
    }
}

/// One bounded attempt to hand `message` to `peer`.
pub(crate) async fn deliver(rpc: &dyn Rpc, peer: &str, message: &Request, timeout: Duration) -> Result<(), RpcError> {
    let body = message.to_body()?;
    rpc.call(peer, body, timeout).await.map(|_| ())
}
