//! The Store trait: the abstract capability set the sync engine runs
//! against.
//!
//! Production provides the SQLite-backed implementation; tests provide
//! the in-memory one. The engine is a pure function over this trait plus
//! a request.

use async_trait::async_trait;
use chrono::Utc;

use axon_core::{
    Bulletin, DatabaseHashes, Fingerprint, Message, NewBulletin, NewMessage, NewUser, Period,
    Record, RecordId, StringRange, User, ValidationError,
};

use crate::error::Result;

/// Result of inserting a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was new.
    Inserted,
    /// A record with this id already exists. Idempotent, not an error.
    Duplicate,
}

/// Async interface for record persistence and the range-hash index.
///
/// Insert methods take records that already passed validation; the
/// [`StoreExt`] ingest helpers run the validation pipeline first and are
/// what the API and sync paths call.
#[async_trait]
pub trait Store: Send + Sync {
    // ── range-hash index ────────────────────────────────────────────────

    /// SHA-256 over message ids with `created_at` in the realized period,
    /// ordered by `(created_at, id)`.
    async fn hash_messages(&self, period: &Period) -> Result<String>;

    /// Same shape, over bulletins.
    async fn hash_bulletins(&self, period: &Period) -> Result<String>;

    /// SHA-256 over user fingerprints in the inclusive range, ordered
    /// lexicographically.
    async fn hash_users(&self, range: &StringRange) -> Result<String>;

    /// The cached database-wide hash set; recomputed when the cache is
    /// empty.
    async fn database_hashes(&self) -> Result<DatabaseHashes>;

    /// Recompute the database-wide hash set unconditionally.
    async fn refresh_hashes(&self) -> Result<DatabaseHashes>;

    // ── range scans ─────────────────────────────────────────────────────

    async fn count_messages(&self, period: &Period) -> Result<u64>;

    /// Messages in the realized period, ordered by `(created_at, id)`.
    async fn list_messages(&self, period: &Period) -> Result<Vec<Message>>;

    async fn count_bulletins(&self, period: &Period) -> Result<u64>;

    /// Bulletins in the realized period, ordered by `(created_at, id)`.
    async fn list_bulletins(&self, period: &Period) -> Result<Vec<Bulletin>>;

    async fn count_users(&self, range: &StringRange) -> Result<u64>;

    /// Users in the inclusive fingerprint range, ordered by fingerprint.
    async fn list_users(&self, range: &StringRange) -> Result<Vec<User>>;

    // ── point lookups and listings for the local API ────────────────────

    async fn get_user(&self, fingerprint: &Fingerprint) -> Result<Option<User>>;

    async fn get_bulletin(&self, id: &RecordId) -> Result<Option<Bulletin>>;

    /// All bulletins, newest first.
    async fn list_all_bulletins(&self) -> Result<Vec<Bulletin>>;

    /// Distinct bulletin topics.
    async fn list_topics(&self) -> Result<Vec<String>>;

    // ── inserts of validated records ────────────────────────────────────

    async fn insert_user(&self, user: &User) -> Result<InsertOutcome>;

    async fn insert_message(&self, message: &Message) -> Result<InsertOutcome>;

    async fn insert_bulletin(&self, bulletin: &Bulletin) -> Result<InsertOutcome>;
}

/// Batch forms and the shared ingest pipeline, layered over any [`Store`].
#[async_trait]
pub trait StoreExt: Store {
    /// Hash a batch of message periods, pairing each input period with
    /// its hash.
    async fn hash_message_periods(&self, periods: &[Period]) -> Result<Vec<(Period, String)>> {
        let mut out = Vec::with_capacity(periods.len());
        for period in periods {
            out.push((*period, self.hash_messages(period).await?));
        }
        Ok(out)
    }

    /// Hash a batch of bulletin periods.
    async fn hash_bulletin_periods(&self, periods: &[Period]) -> Result<Vec<(Period, String)>> {
        let mut out = Vec::with_capacity(periods.len());
        for period in periods {
            out.push((*period, self.hash_bulletins(period).await?));
        }
        Ok(out)
    }

    /// Hash a batch of user fingerprint ranges.
    async fn hash_user_ranges(
        &self,
        ranges: &[StringRange],
    ) -> Result<Vec<(StringRange, String)>> {
        let mut out = Vec::with_capacity(ranges.len());
        for range in ranges {
            out.push((range.clone(), self.hash_users(range).await?));
        }
        Ok(out)
    }

    /// Validate and insert a message. Duplicates are success.
    async fn ingest_message(&self, candidate: NewMessage) -> Result<InsertOutcome> {
        let message = candidate.validate(Utc::now())?;
        self.insert_message(&message).await
    }

    /// Validate and insert a bulletin.
    ///
    /// If the candidate names a parent, the parent must already exist as
    /// a bulletin; a reply created without a topic inherits the parent's
    /// topic, and a reply carrying a different topic than its parent is
    /// rejected.
    async fn ingest_bulletin(&self, mut candidate: NewBulletin) -> Result<InsertOutcome> {
        if let Some(parent_id) = &candidate.parent_id {
            let parent = self
                .get_bulletin(parent_id)
                .await?
                .ok_or_else(|| ValidationError::MissingParent(parent_id.to_string()))?;
            if candidate.topic.is_empty() {
                candidate.topic = parent.topic;
            } else if candidate.topic != parent.topic {
                return Err(ValidationError::TopicMismatch {
                    topic: candidate.topic,
                    parent_topic: parent.topic,
                }
                .into());
            }
        }
        let bulletin = candidate.validate(Utc::now())?;
        self.insert_bulletin(&bulletin).await
    }

    /// Validate and insert a user.
    async fn ingest_user(&self, candidate: NewUser) -> Result<InsertOutcome> {
        let user = candidate.validate(Utc::now())?;
        self.insert_user(&user).await
    }

    /// Validate and insert a record of any kind.
    async fn ingest_record(&self, record: &Record) -> Result<InsertOutcome> {
        match record {
            Record::User(user) => self.ingest_user(NewUser::from_wire(user)).await,
            Record::Message(message) => {
                self.ingest_message(NewMessage::from_wire(message)).await
            }
            Record::Bulletin(bulletin) => {
                self.ingest_bulletin(NewBulletin::from_wire(bulletin)).await
            }
        }
    }
}

impl<S: Store + ?Sized> StoreExt for S {}
