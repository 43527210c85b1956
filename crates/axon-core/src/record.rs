//! The three append-only record kinds and their content-derived ids.
//!
//! Records are created once and never updated or deleted. Identity is a
//! pure function of immutable fields, so two honest nodes that receive
//! the same logical record derive the same id.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{Fingerprint, RecordId};

/// RFC 3339 rendering with nanosecond precision in UTC; the timestamp
/// form every id formula hashes.
fn rfc3339_nanos(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// A public key holder. The primary key is the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub fingerprint: Fingerprint,
    pub public_key: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A user's id is its fingerprint.
    pub fn id(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

/// A signed and encrypted private payload between fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: RecordId,
    pub sender: Fingerprint,
    #[serde(default)]
    pub recipients: Vec<Fingerprint>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// `id = SHA-256(sender ‖ concat(recipients) ‖ content ‖ created_at)`.
    pub fn compute_id(
        sender: &Fingerprint,
        recipients: &[Fingerprint],
        content: &str,
        created_at: DateTime<Utc>,
    ) -> RecordId {
        let mut hasher = Sha256::new();
        hasher.update(sender.as_str().as_bytes());
        for recipient in recipients {
            hasher.update(recipient.as_str().as_bytes());
        }
        hasher.update(content.as_bytes());
        hasher.update(rfc3339_nanos(created_at).as_bytes());
        RecordId::new(hex::encode(hasher.finalize()))
    }
}

/// A signed, non-encrypted public post, optionally threaded under a
/// parent bulletin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bulletin {
    pub id: RecordId,
    pub sender: Fingerprint,
    pub topic: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_id: Option<RecordId>,
    pub created_at: DateTime<Utc>,
}

impl Bulletin {
    /// `id = SHA-256(sender ‖ topic ‖ content ‖ created_at)`.
    pub fn compute_id(
        sender: &Fingerprint,
        topic: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> RecordId {
        let mut hasher = Sha256::new();
        hasher.update(sender.as_str().as_bytes());
        hasher.update(topic.as_bytes());
        hasher.update(content.as_bytes());
        hasher.update(rfc3339_nanos(created_at).as_bytes());
        RecordId::new(hex::encode(hasher.finalize()))
    }
}

/// A record of any kind, for paths that dispatch over the three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    User(User),
    Message(Message),
    Bulletin(Bulletin),
}

impl Record {
    pub fn id(&self) -> RecordId {
        match self {
            Record::User(u) => RecordId::new(u.fingerprint.as_str().to_string()),
            Record::Message(m) => m.id.clone(),
            Record::Bulletin(b) => b.id.clone(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Record::User(u) => u.created_at,
            Record::Message(m) => m.created_at,
            Record::Bulletin(b) => b.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::parse(s).unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn message_id_is_deterministic() {
        let sender = fp("00000000000000aa");
        let recipients = vec![fp("00000000000000bb")];
        let t = at("2025-12-31T13:37:00+02:00");

        let a = Message::compute_id(&sender, &recipients, "blob", t);
        let b = Message::compute_id(&sender, &recipients, "blob", t);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn message_id_depends_on_every_field() {
        let sender = fp("00000000000000aa");
        let other = fp("00000000000000cc");
        let recipients = vec![fp("00000000000000bb")];
        let t = at("2025-06-01T00:00:00Z");

        let base = Message::compute_id(&sender, &recipients, "blob", t);
        assert_ne!(base, Message::compute_id(&other, &recipients, "blob", t));
        assert_ne!(base, Message::compute_id(&sender, &[], "blob", t));
        assert_ne!(base, Message::compute_id(&sender, &recipients, "blub", t));
        assert_ne!(
            base,
            Message::compute_id(&sender, &recipients, "blob", t + chrono::Duration::nanoseconds(1))
        );
    }

    #[test]
    fn message_id_normalizes_offsets() {
        // The same instant written with different offsets hashes identically.
        let sender = fp("00000000000000aa");
        let zoned = at("2025-12-31T13:37:00+02:00");
        let utc = at("2025-12-31T11:37:00Z");
        assert_eq!(
            Message::compute_id(&sender, &[], "blob", zoned),
            Message::compute_id(&sender, &[], "blob", utc)
        );
    }

    #[test]
    fn bulletin_id_covers_topic() {
        let sender = fp("00000000000000aa");
        let t = at("2025-06-01T00:00:00Z");
        let a = Bulletin::compute_id(&sender, "cats", "post", t);
        let b = Bulletin::compute_id(&sender, "dogs", "post", t);
        assert_ne!(a, b);
    }

    #[test]
    fn record_accessors() {
        let user = User {
            fingerprint: fp("00000000000000aa"),
            public_key: "armored".into(),
            created_at: at("2025-06-01T00:00:00Z"),
        };
        let record = Record::User(user.clone());
        assert_eq!(record.id().as_str(), user.fingerprint.as_str());
        assert_eq!(record.created_at(), user.created_at);
    }
}
