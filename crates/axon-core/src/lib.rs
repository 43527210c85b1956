//! # axon-core
//!
//! Pure primitives for the axon node: records, content-derived identity,
//! the armored envelope format, and range partitioning.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`User`], [`Message`], [`Bulletin`] - the three append-only record kinds
//! - [`Fingerprint`] - canonical identity of a public key (encryption subkey key-ID)
//! - [`RecordId`] - content-derived SHA-256 identifier
//! - [`Period`] / [`StringRange`] - the partitions range hashes are computed over
//! - [`DatabaseHashes`] - the per-kind summary hashes plus the combined full hash
//!
//! ## Validation
//!
//! Every insert path (local API and sync ingest) runs the same pipeline:
//! analyze the armored content, enforce the per-kind crypto policy, check
//! supplied metadata against derived metadata, recompute the id. See
//! [`validation`].

pub mod armor;
pub mod envelope;
pub mod error;
pub mod hashes;
pub mod period;
pub mod record;
pub mod types;
pub mod validation;

pub use envelope::{
    analyze, clearsign, open, seal, verify_clearsigned, Analysis, Keypair, PublicKey,
};
pub use error::{CoreError, ValidationError};
pub use hashes::{hash_id_sequence, DatabaseHashes};
pub use period::{release_epoch, Period, StringRange};
pub use record::{Bulletin, Message, Record, User};
pub use types::{Fingerprint, RecordId};
pub use validation::{NewBulletin, NewMessage, NewUser};
