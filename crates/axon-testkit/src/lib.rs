//! # axon-testkit
//!
//! Testing utilities for axon: deterministic identities, builders for
//! validly sealed and clearsigned records, seeded stores, and proptest
//! generators.
//!
//! ## Fixtures
//!
//! ```rust
//! use axon_testkit::Identity;
//!
//! let alice = Identity::from_seed(1);
//! let bob = Identity::from_seed(2);
//! let message = alice.message_to(&[&bob], "hi", "2025-06-01T12:00:00Z");
//! assert_eq!(message.sender, alice.fingerprint());
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{seeded_store, Identity};
