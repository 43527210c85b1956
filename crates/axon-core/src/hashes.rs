//! Database summary hashes.
//!
//! A range hash is SHA-256 over the ordered concatenation of record ids
//! in a partition. The database-wide [`DatabaseHashes`] combines the
//! three per-kind global hashes into a single `full` hash, which peers
//! advertise in beacons to signal divergence.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 over an ordered sequence of ids, lowercase hex.
///
/// The ordering is the caller's contract: `(created_at, id)` ascending
/// for messages and bulletins, lexicographic for user fingerprints.
/// An empty sequence hashes to the digest of zero bytes, so two empty
/// partitions always compare equal.
pub fn hash_id_sequence<I, S>(ids: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_ref().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// The per-kind summary hashes plus the combined full hash.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatabaseHashes {
    pub messages: String,
    pub users: String,
    pub bulletins: String,
    pub full: String,
}

impl DatabaseHashes {
    /// Combine per-kind hashes, deriving the full hash.
    pub fn combine(messages: String, users: String, bulletins: String) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"messages:");
        hasher.update(messages.as_bytes());
        hasher.update(b"users:");
        hasher.update(users.as_bytes());
        hasher.update(b"bulletins:");
        hasher.update(bulletins.as_bytes());
        let full = hex::encode(hasher.finalize());
        Self {
            messages,
            users,
            bulletins,
            full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sequence_is_stable() {
        let a = hash_id_sequence(Vec::<String>::new());
        let b = hash_id_sequence(Vec::<String>::new());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn order_matters() {
        let ab = hash_id_sequence(["a", "b"]);
        let ba = hash_id_sequence(["b", "a"]);
        assert_ne!(ab, ba);
    }

    #[test]
    fn full_hash_depends_on_each_kind() {
        let base = DatabaseHashes::combine("m".into(), "u".into(), "b".into());
        let other = DatabaseHashes::combine("m".into(), "u".into(), "x".into());
        assert_ne!(base.full, other.full);

        let same = DatabaseHashes::combine("m".into(), "u".into(), "b".into());
        assert_eq!(base, same);
    }
}
