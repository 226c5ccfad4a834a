/*
    A broadcast node accepts integer values from clients and makes sure
    that, once the cluster goes quiet, every node answers a read with the
    same set of values no matter which node a value was first sent to.

    Each value is stored under the logical time it was first accepted.
    A node that stores a value it has not seen before gossips it to its
    neighbours from the topology, passing the timestamp along so every
    node keys the value identically, and so a repeated delivery is a no-op.
    A neighbour that cannot be reached within the timeout is retried in
    the background by a fixed pool of workers until it answers.

    Messages are JSON envelopes, one per line on stdin and stdout; logs go
    to stderr.
*/

mod broadcast;
mod common;
mod network;

use std::sync::Arc;

use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use broadcast::{BroadcastService, RetryQueue, RetryWorkers};
use common::config::NodeConfig;
use network::{Node, Router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = NodeConfig::default();
    let node = Node::new();

    let retry = Arc::new(RetryQueue::new(config.retry_capacity));
    let workers = RetryWorkers::spawn(retry.clone(), node.clone(), &config);
    let service = Arc::new(BroadcastService::new(node.clone(), retry, &config));

    let router = Router::new()
        .route("broadcast", service.clone())
        .route("read", service.clone())
        .route("topology", service);

    info!("starting broadcast node");
    node.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), router).await?;

    workers.shutdown().await;
    Ok(())
}
