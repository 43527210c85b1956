//! Transport seam for the sync protocol.
//!
//! The session controller talks to peers through [`SyncTransport`]. The
//! production implementation speaks JSON over HTTP with a bounded
//! per-request timeout; the [`loopback`] implementation answers from an
//! in-process peer store and backs the two-node tests.

use std::time::Duration;

use async_trait::async_trait;

use axon_core::{Bulletin, Message, User};

use crate::error::{Result, SyncError};
use crate::wire::{PingResponse, PushBulletins, PushMessages, PushUsers, SyncRequest, SyncResponse};

/// Client side of the sync endpoints on one peer.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// `GET /v1/ping`: the peer's advertised hashes and busy flag.
    async fn ping(&self, address: &str) -> Result<PingResponse>;

    /// `POST /v1/sync`: one drill-down round.
    async fn sync(&self, address: &str, request: &SyncRequest) -> Result<SyncResponse>;

    /// `POST /v1/sync/messages`: one-way push of plain messages.
    async fn push_messages(&self, address: &str, messages: &[Message]) -> Result<()>;

    /// `POST /v1/sync/bulletins`: one-way push of plain bulletins.
    async fn push_bulletins(&self, address: &str, bulletins: &[Bulletin]) -> Result<()>;

    /// `POST /v1/sync/users`: one-way push of user records.
    async fn push_users(&self, address: &str, users: &[User]) -> Result<()>;
}

/// HTTP transport over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
}

/// Default per-request timeout. A failed round-trip aborts the session;
/// the next beacon retries.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    fn url(address: &str, path: &str) -> String {
        format!("http://{address}{path}")
    }

    async fn post_json<B: serde::Serialize>(&self, url: String, body: &B) -> Result<()> {
        self.client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Ok(())
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        // Building a client with a plain timeout does not fail in
        // practice; fall back to the default client if it ever does.
        Self::new(DEFAULT_TIMEOUT).unwrap_or(Self {
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn ping(&self, address: &str) -> Result<PingResponse> {
        self.client
            .get(Self::url(address, "/v1/ping"))
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| SyncError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| SyncError::InvalidResponse(e.to_string()))
    }

    async fn sync(&self, address: &str, request: &SyncRequest) -> Result<SyncResponse> {
        self.client
            .post(Self::url(address, "/v1/sync"))
            .json(request)
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| SyncError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| SyncError::InvalidResponse(e.to_string()))
    }

    async fn push_messages(&self, address: &str, messages: &[Message]) -> Result<()> {
        let body = PushMessages {
            messages: messages.to_vec(),
        };
        self.post_json(Self::url(address, "/v1/sync/messages"), &body).await
    }

    async fn push_bulletins(&self, address: &str, bulletins: &[Bulletin]) -> Result<()> {
        let body = PushBulletins {
            bulletins: bulletins.to_vec(),
        };
        self.post_json(Self::url(address, "/v1/sync/bulletins"), &body).await
    }

    async fn push_users(&self, address: &str, users: &[User]) -> Result<()> {
        let body = PushUsers {
            users: users.to_vec(),
        };
        self.post_json(Self::url(address, "/v1/sync/users"), &body).await
    }
}

/// In-process transport: answers sync rounds straight from a peer store
/// through the engine, with the peer's own guard semantics.
pub mod loopback {
    use std::sync::Arc;

    use super::*;
    use crate::engine;
    use crate::guard::SyncGuard;
    use axon_core::{NewBulletin, NewMessage, NewUser};
    use axon_store::{Store, StoreExt};

    /// A peer node reduced to its store and guard.
    pub struct LoopbackTransport<S> {
        store: Arc<S>,
        guard: Arc<SyncGuard>,
        max_batch: u64,
    }

    impl<S: Store> LoopbackTransport<S> {
        pub fn new(store: Arc<S>, max_batch: u64) -> Self {
            Self::with_guard(store, Arc::new(SyncGuard::new()), max_batch)
        }

        /// Share a guard with the node the store belongs to, so inbound
        /// rounds and the node's own outbound sessions exclude each
        /// other the way they do in production.
        pub fn with_guard(store: Arc<S>, guard: Arc<SyncGuard>, max_batch: u64) -> Self {
            Self {
                store,
                guard,
                max_batch,
            }
        }

        /// The peer's guard, for driving busy scenarios in tests.
        pub fn guard(&self) -> &Arc<SyncGuard> {
            &self.guard
        }
    }

    #[async_trait]
    impl<S: Store + 'static> SyncTransport for LoopbackTransport<S> {
        async fn ping(&self, _address: &str) -> Result<PingResponse> {
            Ok(PingResponse {
                hash: self.store.database_hashes().await?,
                is_busy: self.guard.is_busy(),
            })
        }

        async fn sync(&self, _address: &str, request: &SyncRequest) -> Result<SyncResponse> {
            let Some(_permit) = self.guard.permit() else {
                return Ok(SyncResponse::busy());
            };
            engine::respond(self.store.as_ref(), request, self.max_batch).await
        }

        async fn push_messages(&self, _address: &str, messages: &[Message]) -> Result<()> {
            for message in messages {
                self.store
                    .ingest_message(NewMessage::from_wire(message))
                    .await?;
            }
            Ok(())
        }

        async fn push_bulletins(&self, _address: &str, bulletins: &[Bulletin]) -> Result<()> {
            let mut ordered = bulletins.to_vec();
            ordered.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
            for bulletin in &ordered {
                self.store
                    .ingest_bulletin(NewBulletin::from_wire(bulletin))
                    .await?;
            }
            Ok(())
        }

        async fn push_users(&self, _address: &str, users: &[User]) -> Result<()> {
            for user in users {
                self.store.ingest_user(NewUser::from_wire(user)).await?;
            }
            Ok(())
        }
    }
}
