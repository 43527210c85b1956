//! Identifier newtypes shared across the system.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// The canonical identity of a public key: the key-ID of its first
/// encryption subkey, 16 lowercase hex characters.
///
/// A user's primary key in the store is its fingerprint, and message
/// senders/recipients are fingerprints derived from armored content.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already-canonical string. Fails if the input is not
    /// 16 lowercase hex characters.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if Self::is_canonical(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(CoreError::InvalidFingerprint(s.to_string()))
        }
    }

    /// Wrap a string produced by key-ID derivation, which is canonical
    /// by construction.
    pub(crate) fn from_derived(s: String) -> Self {
        debug_assert!(Self::is_canonical(&s));
        Self(s)
    }

    /// Canonical form is 16 hex characters, lowercase, no whitespace.
    pub fn is_canonical(s: &str) -> bool {
        s.len() == 16 && s.bytes().all(|c| matches!(c, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// The fingerprint as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A content-derived record identifier: lowercase hex SHA-256 of the
/// record's canonical fields.
///
/// Two honest nodes that receive the same logical record derive the
/// same id, which is what makes range hashes comparable across nodes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = if self.0.len() > 16 { &self.0[..16] } else { &self.0 };
        write!(f, "RecordId({short})")
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
