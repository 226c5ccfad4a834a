use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::gossip::deliver;
use super::message::Request;
use crate::common::config::NodeConfig;
use crate::network::{NodeId, Rpc};

/*
    Sends that fail during dissemination are parked here and retried by a
    fixed pool of workers until they succeed:

        queued -> in-flight -> delivered
                      |
                      +-> failed -> queued

    Nothing is ever dropped while the queue is open. Dissemination pushes
    wait for a free slot once `capacity` items are queued, which throttles
    new broadcasts on a node whose peers stay unreachable. A worker puts
    its own failed item back without waiting, so the queue can exceed
    `capacity` by at most one item per worker and the pool never blocks on
    itself.
*/

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RetryItem {
    pub peer: NodeId,
    pub message: Request,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Push {
    Queued,
    /// The queue is closed; the pushed item was discarded.
    Closed,
}

pub struct RetryQueue {
    items: Mutex<VecDeque<RetryItem>>,
    capacity: usize,
    closed: AtomicBool,
    /// Signalled when an item is queued.
    ready: Notify,
    /// Signalled when an item leaves the queue.
    space: Notify,
}

impl RetryQueue {
    pub fn new(capacity: usize) -> Self {
        RetryQueue {
            items: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
            ready: Notify::new(),
            space: Notify::new(),
        }
    }

    /// Queues a failed send, waiting while the queue is full.
    pub async fn push(&self, item: RetryItem) -> Push {
        let mut waited = false;
        loop {
            let space = self.space.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            if self.is_closed() {
                debug!("retry queue closed, discarding message for {}", item.peer);
                return Push::Closed;
            }

            {
                let mut items = self.items.lock();
                if items.len() < self.capacity {
                    items.push_back(item);
                    drop(items);
                    self.ready.notify_one();
                    return Push::Queued;
                }
            }

            if !waited {
                warn!("retry queue full, waiting to queue message for {}", item.peer);
                waited = true;
            }
            space.await;
        }
    }

    /// Puts an item a worker failed to deliver back at the tail, ignoring capacity.
    pub fn requeue(&self, item: RetryItem) -> Push {
        if self.is_closed() {
            debug!("retry queue closed, discarding message for {}", item.peer);
            return Push::Closed;
        }

        self.items.lock().push_back(item);
        self.ready.notify_one();
        Push::Queued
    }

    /// Waits for the next item. Returns `None` once the queue is closed.
    pub async fn pop(&self) -> Option<RetryItem> {
        loop {
            let ready = self.ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            if self.is_closed() {
                return None;
            }
            let item = self.items.lock().pop_front();
            if let Some(item) = item {
                self.space.notify_one();
                return Some(item);
            }

            ready.await;
        }
    }

    /// Wakes every waiting worker and pusher; queued items are abandoned.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.ready.notify_waiters();
        self.space.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

/// Fixed pool of tasks draining a [`RetryQueue`].
pub struct RetryWorkers {
    queue: Arc<RetryQueue>,
    delivered: Arc<AtomicU64>,
    handles: Vec<JoinHandle<()>>,
}

impl RetryWorkers {
    pub fn spawn(queue: Arc<RetryQueue>, rpc: Arc<dyn Rpc>, config: &NodeConfig) -> Self {
        let delivered = Arc::new(AtomicU64::new(0));
        let handles = (0..config.retry_workers.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: queue.clone(),
                    rpc: rpc.clone(),
                    timeout: config.rpc_timeout,
                    interval: config.retry_interval,
                    delivered: delivered.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        RetryWorkers {
            queue,
            delivered,
            handles,
        }
    }

    /// Messages delivered by retries so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Closes the queue and waits for in-flight sends to finish.
    pub async fn shutdown(mut self) {
        self.queue.close();
        for handle in std::mem::take(&mut self.handles) {
            if let Err(e) = handle.await {
                warn!("retry worker ended abnormally: {}", e);
            }
        }
        info!(
            "retry workers stopped after {} deliveries, {} messages abandoned",
            self.delivered(),
            self.queue.len()
        );
    }
}

struct Worker {
    id: usize,
    queue: Arc<RetryQueue>,
    rpc: Arc<dyn Rpc>,
    timeout: Duration,
    interval: Duration,
    delivered: Arc<AtomicU64>,
}

impl Worker {
    async fn run(self) {
        debug!("retry worker {} started", self.id);
        while let Some(item) = self.queue.pop().await {
            match deliver(self.rpc.as_ref(), &item.peer, &item.message, self.timeout).await {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!("retry worker {}: delivered to {}", self.id, item.peer);
                }
                Err(e) => {
                    debug!("retry worker {}: send to {} failed again: {}", self.id, item.peer, e);
                    self.queue.requeue(item);
                    if !self.interval.is_zero() {
                        tokio::time::sleep(self.interval).await;
                    }
                }
            }
        }
        debug!("retry worker {} stopped", self.id);
    }
}
