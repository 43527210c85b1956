//! # axon-sync
//!
//! The anti-entropy synchronization engine. Two nodes converge by
//! exchanging SHA-256 hashes over partitioned subsets of their stores —
//! time windows for messages and bulletins, fingerprint intervals for
//! users — and transferring only the records inside diverging
//! partitions, drilling partitions down until every mismatch fits a
//! plain-transfer budget.
//!
//! ## Pieces
//!
//! - [`wire`] - the JSON request/response types exchanged over HTTP
//! - [`engine`] - the pure responder: hashed partitions in, plain
//!   records and refined sub-partitions out
//! - [`session`] - the outbound controller driving the drill-down loop
//!   against one peer, then pushing records the peer is missing
//! - [`guard`] - the node-wide at-most-one-session latch
//! - [`transport`] - the HTTP client seam, plus an in-process loopback
//!   for tests
//!
//! ## Flow of one session
//!
//! ```text
//! Requester                              Responder
//!   |--- POST /v1/sync {hashed ranges} --->|
//!   |<-- {plain records, refined ranges} --|   (engine)
//!   |--- POST /v1/sync {mismatches} ------>|   (drill-down, repeats)
//!   |<-- {plain records} ------------------|
//!   |--- POST /v1/sync/messages ---------->|   (push what peer lacks)
//!   |--- POST /v1/sync/users ------------->|
//! ```

pub mod engine;
pub mod error;
pub mod guard;
pub mod session;
pub mod transport;
pub mod wire;

pub use engine::respond;
pub use error::{Result, SyncError};
pub use guard::{SyncGuard, SyncPermit};
pub use session::{
    fingerprint_ranges, initial_periods, SessionOutcome, SessionReport, SyncConfig, SyncSession,
};
pub use transport::{HttpTransport, SyncTransport};
pub use wire::{
    BulletinsPeriod, HashedPeriod, HashedUsersRange, MessagesPeriod, PingResponse, PushBulletins,
    PushMessages, PushUsers, SyncRequest, SyncResponse, UsersRange,
};

/// Plain-record budget for one sync response.
pub const MAX_BATCH: u64 = 1000;

/// Multiplier over the batch budget at which a mismatching range splits
/// into roughly batch-sized parts instead of halving.
pub const AGGRESSIVE_SPLIT_FACTOR: u64 = 10;

/// Count at which splitting becomes aggressive under the production
/// budget.
pub const AGGRESSIVE_SPLIT_THRESHOLD: u64 = MAX_BATCH * AGGRESSIVE_SPLIT_FACTOR;
