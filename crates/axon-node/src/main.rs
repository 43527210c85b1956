use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use axon_node::{api, discovery, Node, NodeConfig};
use axon_store::{SqliteStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,axon_node=debug")),
        )
        .init();

    info!("starting axon node v{}", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::from_env();
    info!(
        node_id = %config.node_id,
        http = %config.http_addr,
        db = %config.db_path.display(),
        "loaded configuration"
    );

    let store = SqliteStore::open(&config.db_path)?;
    // Warm the hash cache so the first beacon advertises real hashes.
    store.refresh_hashes().await?;

    let http_addr = config.http_addr;
    let beacon_bind = config.beacon_bind;
    let node = Arc::new(Node::new(Arc::new(store), config));

    let socket = discovery::bind_socket(beacon_bind).await?;
    tokio::spawn(discovery::broadcast_loop(
        Arc::clone(&node),
        Arc::clone(&socket),
    ));
    tokio::spawn(discovery::listen_loop(Arc::clone(&node), socket));

    let router = api::router(node);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    info!(addr = %http_addr, "serving HTTP API");
    axum::serve(listener, router).await?;

    Ok(())
}
