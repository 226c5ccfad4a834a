pub mod gossip;
pub mod message;
pub mod peers;
pub mod retry;
pub mod service;
pub mod store;

pub use retry::{RetryQueue, RetryWorkers};
pub use service::BroadcastService;
