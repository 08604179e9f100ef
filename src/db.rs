//! SQLite handle and schema lifecycle.
//!
//! All access goes through one [`tokio_rusqlite::Connection`], whose single
//! background thread serializes writes. That thread is the ordering point
//! for concurrent sends: rows get their total order from (created_at,
//! rowid). Do not open additional connections for writes.

use crate::error::{AppError, AppResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY,
    sender     TEXT NOT NULL,
    receiver   TEXT NOT NULL,
    listing    TEXT NOT NULL,
    content    TEXT NOT NULL,
    read       INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (sender <> receiver),
    CHECK (length(content) > 0)
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON messages (listing, sender, receiver, created_at);
CREATE INDEX IF NOT EXISTS idx_messages_unread
    ON messages (receiver, read);

-- Owned by the marketplace app; the messaging core only reads these for
-- display-data enrichment.
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    avatar     TEXT,
    occupation TEXT
);
CREATE TABLE IF NOT EXISTS listings (
    id    TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    owner TEXT NOT NULL
);
";

/// Shared database handle. Cheap to clone; all clones funnel into the same
/// writer thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path`, switch it to WAL
    /// mode, and ensure the schema exists.
    pub async fn open(path: &str) -> AppResult<Self> {
        let conn = tokio_rusqlite::Connection::open(path.to_string())
            .await
            .map_err(|e| map_tr_err(e.into()))?;
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA foreign_keys = ON;",
            )?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        Ok(Database { conn })
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL so a following process start sees everything.
    pub async fn close(&self) -> AppResult<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Adapt tokio-rusqlite errors into the persistence branch of the taxonomy.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> AppError {
    AppError::Persistence(e.to_string())
}
