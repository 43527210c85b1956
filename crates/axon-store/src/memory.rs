//! In-memory implementation of the Store trait.
//!
//! Primarily for tests and two-node sync harnesses. Same semantics as
//! the SQLite store, everything behind a single RwLock.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use axon_core::{
    hash_id_sequence, Bulletin, DatabaseHashes, Fingerprint, Message, Period, RecordId,
    StringRange, User,
};

use crate::error::{Result, StoreError};
use crate::traits::{InsertOutcome, Store};

/// In-memory store. All data is lost when dropped.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Users keyed by fingerprint (the primary key).
    users: BTreeMap<String, User>,
    /// Messages keyed by id.
    messages: BTreeMap<String, Message>,
    /// Bulletins keyed by id.
    bulletins: BTreeMap<String, Bulletin>,
    /// Cached database hash set; None after a mutation.
    hashes: Option<DatabaseHashes>,
}

impl Inner {
    fn messages_in(&self, period: &Period) -> Vec<Message> {
        let now = Utc::now();
        let mut out: Vec<Message> = self
            .messages
            .values()
            .filter(|m| period.contains(m.created_at, now))
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        out
    }

    fn bulletins_in(&self, period: &Period) -> Vec<Bulletin> {
        let now = Utc::now();
        let mut out: Vec<Bulletin> = self
            .bulletins
            .values()
            .filter(|b| period.contains(b.created_at, now))
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        out
    }

    fn users_in(&self, range: &StringRange) -> Vec<User> {
        // BTreeMap iteration is already fingerprint-ordered.
        self.users
            .range(range.start.clone()..)
            .take_while(|(fp, _)| fp.as_str() <= range.end.as_str())
            .map(|(_, u)| u.clone())
            .collect()
    }

    fn compute_hashes(&self) -> DatabaseHashes {
        let mut message_ids: Vec<(chrono::DateTime<Utc>, &str)> = self
            .messages
            .values()
            .map(|m| (m.created_at, m.id.as_str()))
            .collect();
        message_ids.sort();

        let mut bulletin_ids: Vec<(chrono::DateTime<Utc>, &str)> = self
            .bulletins
            .values()
            .map(|b| (b.created_at, b.id.as_str()))
            .collect();
        bulletin_ids.sort();

        DatabaseHashes::combine(
            hash_id_sequence(message_ids.iter().map(|(_, id)| *id)),
            hash_id_sequence(self.users.keys().map(String::as_str)),
            hash_id_sequence(bulletin_ids.iter().map(|(_, id)| *id)),
        )
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn hash_messages(&self, period: &Period) -> Result<String> {
        let inner = self.read()?;
        let ids: Vec<String> = inner
            .messages_in(period)
            .into_iter()
            .map(|m| m.id.as_str().to_string())
            .collect();
        Ok(hash_id_sequence(&ids))
    }

    async fn hash_bulletins(&self, period: &Period) -> Result<String> {
        let inner = self.read()?;
        let ids: Vec<String> = inner
            .bulletins_in(period)
            .into_iter()
            .map(|b| b.id.as_str().to_string())
            .collect();
        Ok(hash_id_sequence(&ids))
    }

    async fn hash_users(&self, range: &StringRange) -> Result<String> {
        let inner = self.read()?;
        let fingerprints: Vec<String> = inner
            .users_in(range)
            .into_iter()
            .map(|u| u.fingerprint.as_str().to_string())
            .collect();
        Ok(hash_id_sequence(&fingerprints))
    }

    async fn database_hashes(&self) -> Result<DatabaseHashes> {
        {
            let inner = self.read()?;
            if let Some(hashes) = inner.hashes.as_ref() {
                return Ok(hashes.clone());
            }
        }
        self.refresh_hashes().await
    }

    async fn refresh_hashes(&self) -> Result<DatabaseHashes> {
        let mut inner = self.write()?;
        let hashes = inner.compute_hashes();
        inner.hashes = Some(hashes.clone());
        Ok(hashes)
    }

    async fn count_messages(&self, period: &Period) -> Result<u64> {
        Ok(self.read()?.messages_in(period).len() as u64)
    }

    async fn list_messages(&self, period: &Period) -> Result<Vec<Message>> {
        Ok(self.read()?.messages_in(period))
    }

    async fn count_bulletins(&self, period: &Period) -> Result<u64> {
        Ok(self.read()?.bulletins_in(period).len() as u64)
    }

    async fn list_bulletins(&self, period: &Period) -> Result<Vec<Bulletin>> {
        Ok(self.read()?.bulletins_in(period))
    }

    async fn count_users(&self, range: &StringRange) -> Result<u64> {
        Ok(self.read()?.users_in(range).len() as u64)
    }

    async fn list_users(&self, range: &StringRange) -> Result<Vec<User>> {
        Ok(self.read()?.users_in(range))
    }

    async fn get_user(&self, fingerprint: &Fingerprint) -> Result<Option<User>> {
        Ok(self.read()?.users.get(fingerprint.as_str()).cloned())
    }

    async fn get_bulletin(&self, id: &RecordId) -> Result<Option<Bulletin>> {
        Ok(self.read()?.bulletins.get(id.as_str()).cloned())
    }

    async fn list_all_bulletins(&self) -> Result<Vec<Bulletin>> {
        let inner = self.read()?;
        let mut out: Vec<Bulletin> = inner.bulletins.values().cloned().collect();
        out.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(out)
    }

    async fn list_topics(&self) -> Result<Vec<String>> {
        let inner = self.read()?;
        let mut topics: Vec<String> = inner
            .bulletins
            .values()
            .map(|b| b.topic.clone())
            .collect();
        topics.sort();
        topics.dedup();
        Ok(topics)
    }

    async fn insert_user(&self, user: &User) -> Result<InsertOutcome> {
        let mut inner = self.write()?;
        if inner.users.contains_key(user.fingerprint.as_str()) {
            return Ok(InsertOutcome::Duplicate);
        }
        inner
            .users
            .insert(user.fingerprint.as_str().to_string(), user.clone());
        inner.hashes = None;
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_message(&self, message: &Message) -> Result<InsertOutcome> {
        let mut inner = self.write()?;
        if inner.messages.contains_key(message.id.as_str()) {
            return Ok(InsertOutcome::Duplicate);
        }
        inner
            .messages
            .insert(message.id.as_str().to_string(), message.clone());
        inner.hashes = None;
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_bulletin(&self, bulletin: &Bulletin) -> Result<InsertOutcome> {
        let mut inner = self.write()?;
        if inner.bulletins.contains_key(bulletin.id.as_str()) {
            return Ok(InsertOutcome::Duplicate);
        }
        inner
            .bulletins
            .insert(bulletin.id.as_str().to_string(), bulletin.clone());
        inner.hashes = None;
        Ok(InsertOutcome::Inserted)
    }
}
