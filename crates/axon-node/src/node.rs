//! The node context: store, sync guard, and configuration in one
//! explicit struct, passed where needed instead of process globals.

use std::sync::Arc;

use axon_store::Store;
use axon_sync::{HttpTransport, SessionReport, SyncGuard, SyncSession};

use crate::config::NodeConfig;

pub struct Node {
    pub store: Arc<dyn Store>,
    pub guard: Arc<SyncGuard>,
    pub config: NodeConfig,
    transport: HttpTransport,
}

impl Node {
    pub fn new(store: Arc<dyn Store>, config: NodeConfig) -> Self {
        let transport = HttpTransport::new(config.request_timeout).unwrap_or_default();
        Self {
            store,
            guard: Arc::new(SyncGuard::new()),
            config,
            transport,
        }
    }

    /// Run one outbound sync session against a peer's API address.
    pub async fn sync_with(&self, address: &str) -> axon_sync::Result<SessionReport> {
        SyncSession::new(self.store.as_ref(), &self.guard, &self.transport)
            .run(address)
            .await
    }
}
