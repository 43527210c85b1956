//! Wire types for the sync protocol.
//!
//! All of these cross the network as JSON. `Period` and `StringRange`
//! are flattened into the structs that carry them, so a hashed period
//! serializes as `{"start": ..., "end": ..., "hash": ...}`.

use serde::{Deserialize, Serialize};

use axon_core::{Bulletin, DatabaseHashes, Message, Period, StringRange, User};

/// A time window plus the requester's hash over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedPeriod {
    #[serde(flatten)]
    pub period: Period,
    pub hash: String,
}

/// A fingerprint interval plus the requester's hash over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedUsersRange {
    #[serde(flatten)]
    pub range: StringRange,
    pub hash: String,
}

/// Plain messages for one time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesPeriod {
    #[serde(flatten)]
    pub period: Period,
    pub records: Vec<Message>,
}

/// Plain bulletins for one time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletinsPeriod {
    #[serde(flatten)]
    pub period: Period,
    pub records: Vec<Bulletin>,
}

/// Plain users for one fingerprint interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersRange {
    #[serde(flatten)]
    pub range: StringRange,
    pub users: Vec<User>,
}

/// One round of the drill-down: the requester's hashed partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_ranges: Vec<HashedPeriod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bulletin_ranges: Vec<HashedPeriod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<HashedUsersRange>,
}

impl SyncRequest {
    /// A request with nothing left to compare.
    pub fn is_empty(&self) -> bool {
        self.message_ranges.is_empty() && self.bulletin_ranges.is_empty() && self.users.is_empty()
    }
}

/// The responder's answer: its global hashes, plain records for small
/// mismatches, refined hashed sub-ranges for large ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub hash: DatabaseHashes,
    #[serde(default)]
    pub is_busy: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_ranges: Vec<HashedPeriod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<MessagesPeriod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bulletin_ranges: Vec<HashedPeriod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bulletins: Vec<BulletinsPeriod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_range_hashes: Vec<HashedUsersRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UsersRange>,
}

impl SyncResponse {
    /// The well-defined "busy" response: no records, no side effects.
    pub fn busy() -> Self {
        Self {
            is_busy: true,
            ..Self::default()
        }
    }
}

/// `GET /v1/ping` response: the advertised hash set and busy flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    pub hash: DatabaseHashes,
    pub is_busy: bool,
}

/// `POST /v1/sync/messages` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushMessages {
    pub messages: Vec<Message>,
}

/// `POST /v1/sync/bulletins` payload. The field is named `messages` on
/// the wire; peers expect that exact shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushBulletins {
    #[serde(rename = "messages")]
    pub bulletins: Vec<Bulletin>,
}

/// `POST /v1/sync/users` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushUsers {
    pub users: Vec<User>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_period_flattens_bounds() {
        let hp = HashedPeriod {
            period: Period {
                start: None,
                end: Some("2025-06-01T00:00:00Z".parse().unwrap()),
            },
            hash: "abc".into(),
        };
        let json = serde_json::to_value(&hp).unwrap();
        assert!(json.get("period").is_none());
        assert!(json.get("end").is_some());
        assert_eq!(json["hash"], "abc");

        let back: HashedPeriod = serde_json::from_value(json).unwrap();
        assert_eq!(back, hp);
    }

    #[test]
    fn busy_response_is_sparse() {
        let json = serde_json::to_value(SyncResponse::busy()).unwrap();
        assert_eq!(json["is_busy"], true);
        assert!(json.get("messages").is_none());
        assert!(json.get("message_ranges").is_none());
    }

    #[test]
    fn push_bulletins_uses_messages_field() {
        let json = serde_json::to_value(PushBulletins::default()).unwrap();
        assert!(json.get("messages").is_some());
        assert!(json.get("bulletins").is_none());
    }

    #[test]
    fn empty_request_roundtrip() {
        let req = SyncRequest::default();
        assert!(req.is_empty());
        let json = serde_json::to_string(&req).unwrap();
        let back: SyncRequest = serde_json::from_str(&json).unwrap();
        assert!(back.is_empty());
    }
}
