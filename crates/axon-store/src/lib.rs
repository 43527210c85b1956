//! # axon-store
//!
//! Storage abstraction for the axon node. The [`Store`] trait exposes
//! exactly the capability set the sync engine is defined against: range
//! hashes over partitions, counts and lists, validated inserts, and the
//! cached database-wide hash set.
//!
//! The primary implementation is [`SqliteStore`]; [`MemoryStore`] backs
//! tests with identical semantics.
//!
//! ## Semantics
//!
//! - **Idempotent inserts**: inserting a record whose id is already
//!   present returns [`InsertOutcome::Duplicate`], never an error.
//! - **Half-open time ranges**: `created_at ∈ [start, end)` for hashing,
//!   counting, and listing alike.
//! - **Deterministic hashing**: message/bulletin ids are ordered by
//!   `(created_at, id)`, user fingerprints lexicographically, so a range
//!   hash is a pure function of the record set.
//! - **Cached full hash**: mutating paths invalidate the cached
//!   [`axon_core::DatabaseHashes`]; reads that find it empty recompute.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertOutcome, Store, StoreExt};
