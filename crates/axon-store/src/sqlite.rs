//! SQLite implementation of the Store trait.
//!
//! This is the primary backend. It uses rusqlite with bundled SQLite,
//! wrapped in `tokio::task::spawn_blocking` so the async runtime is
//! never blocked on database I/O.

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use axon_core::{
    hash_id_sequence, Bulletin, DatabaseHashes, Fingerprint, Message, Period, RecordId,
    StringRange, User,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertOutcome, Store};

/// SQLite-backed store.
///
/// Thread-safe via an internal mutex; the cached database hash set lives
/// beside the connection and is invalidated by every mutating path.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    hashes: Arc<RwLock<Option<DatabaseHashes>>>,
}

impl SqliteStore {
    /// Open a database at the given path, creating and migrating it as
    /// needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!(path = %path.as_ref().display(), "opening database");
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            hashes: Arc::new(RwLock::new(None)),
        })
    }

    /// Open an in-memory database. Useful for tests.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            hashes: Arc::new(RwLock::new(None)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    fn invalidate_hashes(&self) {
        if let Ok(mut cache) = self.hashes.write() {
            *cache = None;
        }
    }
}

fn to_nanos(t: DateTime<Utc>) -> Result<i64> {
    t.timestamp_nanos_opt()
        .ok_or_else(|| StoreError::InvalidData(format!("timestamp out of range: {t}")))
}

fn from_nanos(n: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(n)
}

fn period_bounds(period: &Period) -> Result<(i64, i64)> {
    let (start, end) = period.realize(Utc::now());
    Ok((to_nanos(start)?, to_nanos(end)?))
}

fn parse_fingerprint(s: String) -> Result<Fingerprint> {
    Fingerprint::parse(&s).map_err(|_| StoreError::InvalidData(format!("bad fingerprint: {s}")))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String, i64)> {
    Ok((
        row.get("id")?,
        row.get("sender")?,
        row.get("recipients")?,
        row.get("content")?,
        row.get("created_at")?,
    ))
}

fn build_message(raw: (String, String, String, String, i64)) -> Result<Message> {
    let (id, sender, recipients_json, content, created_at) = raw;
    let recipients: Vec<String> = serde_json::from_str(&recipients_json)
        .map_err(|e| StoreError::InvalidData(format!("bad recipients JSON: {e}")))?;
    let recipients = recipients
        .into_iter()
        .map(parse_fingerprint)
        .collect::<Result<Vec<_>>>()?;
    Ok(Message {
        id: RecordId::new(id),
        sender: parse_fingerprint(sender)?,
        recipients,
        content,
        created_at: from_nanos(created_at),
    })
}

fn row_to_bulletin(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<(String, String, String, String, Option<String>, i64)> {
    Ok((
        row.get("id")?,
        row.get("sender")?,
        row.get("topic")?,
        row.get("content")?,
        row.get("parent_id")?,
        row.get("created_at")?,
    ))
}

fn build_bulletin(raw: (String, String, String, String, Option<String>, i64)) -> Result<Bulletin> {
    let (id, sender, topic, content, parent_id, created_at) = raw;
    Ok(Bulletin {
        id: RecordId::new(id),
        sender: parse_fingerprint(sender)?,
        topic,
        content,
        parent_id: parent_id.map(RecordId::new),
        created_at: from_nanos(created_at),
    })
}

/// Recompute all three global hashes from full table scans.
fn compute_hashes(conn: &Connection) -> Result<DatabaseHashes> {
    let mut stmt = conn.prepare("SELECT id FROM messages ORDER BY created_at, id")?;
    let message_ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare("SELECT fingerprint FROM users ORDER BY fingerprint")?;
    let fingerprints = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare("SELECT id FROM bulletin_board ORDER BY created_at, id")?;
    let bulletin_ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(DatabaseHashes::combine(
        hash_id_sequence(&message_ids),
        hash_id_sequence(&fingerprints),
        hash_id_sequence(&bulletin_ids),
    ))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl Store for SqliteStore {
    async fn hash_messages(&self, period: &Period) -> Result<String> {
        let (start, end) = period_bounds(period)?;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM messages WHERE created_at >= ?1 AND created_at < ?2
                 ORDER BY created_at, id",
            )?;
            let ids = stmt
                .query_map(params![start, end], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hash_id_sequence(&ids))
        })
        .await
    }

    async fn hash_bulletins(&self, period: &Period) -> Result<String> {
        let (start, end) = period_bounds(period)?;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM bulletin_board WHERE created_at >= ?1 AND created_at < ?2
                 ORDER BY created_at, id",
            )?;
            let ids = stmt
                .query_map(params![start, end], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hash_id_sequence(&ids))
        })
        .await
    }

    async fn hash_users(&self, range: &StringRange) -> Result<String> {
        let range = range.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT fingerprint FROM users
                 WHERE fingerprint >= ?1 AND fingerprint <= ?2
                 ORDER BY fingerprint",
            )?;
            let fingerprints = stmt
                .query_map(params![range.start, range.end], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hash_id_sequence(&fingerprints))
        })
        .await
    }

    async fn database_hashes(&self) -> Result<DatabaseHashes> {
        if let Ok(cache) = self.hashes.read() {
            if let Some(hashes) = cache.as_ref() {
                return Ok(hashes.clone());
            }
        }
        self.refresh_hashes().await
    }

    async fn refresh_hashes(&self) -> Result<DatabaseHashes> {
        let cache = Arc::clone(&self.hashes);
        self.with_conn(move |conn| {
            let hashes = compute_hashes(conn)?;
            if let Ok(mut slot) = cache.write() {
                *slot = Some(hashes.clone());
            }
            Ok(hashes)
        })
        .await
    }

    async fn count_messages(&self, period: &Period) -> Result<u64> {
        let (start, end) = period_bounds(period)?;
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE created_at >= ?1 AND created_at < ?2",
                params![start, end],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn list_messages(&self, period: &Period) -> Result<Vec<Message>> {
        let (start, end) = period_bounds(period)?;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender, recipients, content, created_at FROM messages
                 WHERE created_at >= ?1 AND created_at < ?2
                 ORDER BY created_at, id",
            )?;
            let rows = stmt
                .query_map(params![start, end], row_to_message)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(build_message).collect()
        })
        .await
    }

    async fn count_bulletins(&self, period: &Period) -> Result<u64> {
        let (start, end) = period_bounds(period)?;
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM bulletin_board WHERE created_at >= ?1 AND created_at < ?2",
                params![start, end],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn list_bulletins(&self, period: &Period) -> Result<Vec<Bulletin>> {
        let (start, end) = period_bounds(period)?;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender, topic, content, parent_id, created_at FROM bulletin_board
                 WHERE created_at >= ?1 AND created_at < ?2
                 ORDER BY created_at, id",
            )?;
            let rows = stmt
                .query_map(params![start, end], row_to_bulletin)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(build_bulletin).collect()
        })
        .await
    }

    async fn count_users(&self, range: &StringRange) -> Result<u64> {
        let range = range.clone();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE fingerprint >= ?1 AND fingerprint <= ?2",
                params![range.start, range.end],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn list_users(&self, range: &StringRange) -> Result<Vec<User>> {
        let range = range.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT fingerprint, public_key, created_at FROM users
                 WHERE fingerprint >= ?1 AND fingerprint <= ?2
                 ORDER BY fingerprint",
            )?;
            let rows = stmt
                .query_map(params![range.start, range.end], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter()
                .map(|(fingerprint, public_key, created_at)| {
                    Ok(User {
                        fingerprint: parse_fingerprint(fingerprint)?,
                        public_key,
                        created_at: from_nanos(created_at),
                    })
                })
                .collect()
        })
        .await
    }

    async fn get_user(&self, fingerprint: &Fingerprint) -> Result<Option<User>> {
        let fingerprint = fingerprint.clone();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT fingerprint, public_key, created_at FROM users WHERE fingerprint = ?1",
                    params![fingerprint.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    },
                )
                .optional()?;
            row.map(|(fingerprint, public_key, created_at)| {
                Ok(User {
                    fingerprint: parse_fingerprint(fingerprint)?,
                    public_key,
                    created_at: from_nanos(created_at),
                })
            })
            .transpose()
        })
        .await
    }

    async fn get_bulletin(&self, id: &RecordId) -> Result<Option<Bulletin>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, sender, topic, content, parent_id, created_at
                     FROM bulletin_board WHERE id = ?1",
                    params![id.as_str()],
                    row_to_bulletin,
                )
                .optional()?;
            row.map(build_bulletin).transpose()
        })
        .await
    }

    async fn list_all_bulletins(&self) -> Result<Vec<Bulletin>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender, topic, content, parent_id, created_at
                 FROM bulletin_board ORDER BY created_at DESC, id",
            )?;
            let rows = stmt
                .query_map([], row_to_bulletin)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(build_bulletin).collect()
        })
        .await
    }

    async fn list_topics(&self) -> Result<Vec<String>> {
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT topic FROM bulletin_board ORDER BY topic")?;
            let topics = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(topics)
        })
        .await
    }

    async fn insert_user(&self, user: &User) -> Result<InsertOutcome> {
        let user = user.clone();
        let created_at = to_nanos(user.created_at)?;
        let outcome = self
            .with_conn(move |conn| {
                let result = conn.execute(
                    "INSERT INTO users (fingerprint, public_key, created_at) VALUES (?1, ?2, ?3)",
                    params![user.fingerprint.as_str(), user.public_key, created_at],
                );
                match result {
                    Ok(_) => Ok(InsertOutcome::Inserted),
                    Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        if outcome == InsertOutcome::Inserted {
            self.invalidate_hashes();
        }
        Ok(outcome)
    }

    async fn insert_message(&self, message: &Message) -> Result<InsertOutcome> {
        let message = message.clone();
        let created_at = to_nanos(message.created_at)?;
        let recipients = serde_json::to_string(&message.recipients)
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        let outcome = self
            .with_conn(move |conn| {
                let result = conn.execute(
                    "INSERT INTO messages (id, sender, recipients, content, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        message.id.as_str(),
                        message.sender.as_str(),
                        recipients,
                        message.content,
                        created_at
                    ],
                );
                match result {
                    Ok(_) => Ok(InsertOutcome::Inserted),
                    Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        if outcome == InsertOutcome::Inserted {
            self.invalidate_hashes();
        }
        Ok(outcome)
    }

    async fn insert_bulletin(&self, bulletin: &Bulletin) -> Result<InsertOutcome> {
        let bulletin = bulletin.clone();
        let created_at = to_nanos(bulletin.created_at)?;
        let outcome = self
            .with_conn(move |conn| {
                let result = conn.execute(
                    "INSERT INTO bulletin_board (id, sender, topic, content, parent_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        bulletin.id.as_str(),
                        bulletin.sender.as_str(),
                        bulletin.topic,
                        bulletin.content,
                        bulletin.parent_id.as_ref().map(|p| p.as_str().to_string()),
                        created_at
                    ],
                );
                match result {
                    Ok(_) => Ok(InsertOutcome::Inserted),
                    Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        if outcome == InsertOutcome::Inserted {
            self.invalidate_hashes();
        }
        Ok(outcome)
    }
}
