//! Database schema migrations for SQLite.
//!
//! A simple versioned migration system: each migration transforms the
//! schema from version N to N+1 and is recorded in `schema_migrations`.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;
        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, chrono::Utc::now().timestamp()],
            )?;
        }
        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: the three primary record tables.
///
/// Timestamps are Unix nanoseconds, so range scans are integer
/// comparisons and survive formatting changes.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE users (
            fingerprint TEXT PRIMARY KEY,      -- 16 lowercase hex chars
            public_key TEXT NOT NULL,          -- armored public key block
            created_at INTEGER NOT NULL        -- Unix nanoseconds
        );

        CREATE TABLE messages (
            id TEXT PRIMARY KEY,               -- hex SHA-256 of canonical fields
            sender TEXT NOT NULL,
            recipients TEXT NOT NULL,          -- JSON array of fingerprints
            content TEXT NOT NULL,             -- armored sealed message
            created_at INTEGER NOT NULL
        );

        CREATE TABLE bulletin_board (
            id TEXT PRIMARY KEY,
            sender TEXT NOT NULL,
            topic TEXT NOT NULL,
            content TEXT NOT NULL,             -- armored clearsigned message
            parent_id TEXT,                    -- thread parent, nullable
            created_at INTEGER NOT NULL
        );

        CREATE INDEX idx_messages_created ON messages(created_at, id);
        CREATE INDEX idx_bulletin_created ON bulletin_board(created_at, id);
        CREATE INDEX idx_bulletin_topic ON bulletin_board(topic);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"messages".to_string()));
        assert!(tables.contains(&"bulletin_board".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn migration_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
