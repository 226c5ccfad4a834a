use std::time::Duration;

pub const RPC_TIMEOUT: Duration = Duration::from_secs(1);
pub const MAXIMUM_RETRY_QUEUE_SIZE: usize = 100;
pub const RETRY_WORKER_SIZE: usize = 5;
pub const RETRY_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub rpc_timeout: Duration,
    pub retry_capacity: usize,
    pub retry_workers: usize,
    pub retry_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            rpc_timeout: RPC_TIMEOUT,
            retry_capacity: MAXIMUM_RETRY_QUEUE_SIZE,
            retry_workers: RETRY_WORKER_SIZE,
            retry_interval: RETRY_INTERVAL,
        }
    }
}

// Tests shrink timeouts and pool sizes; the node itself runs on the defaults.
#[cfg(test)]
impl NodeConfig {
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn with_retry_capacity(mut self, capacity: usize) -> Self {
        self.retry_capacity = capacity;
        self
    }

    pub fn with_retry_workers(mut self, workers: usize) -> Self {
        self.retry_workers = workers;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }
}
