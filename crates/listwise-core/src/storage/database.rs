//! SQLite connection and schema migrations

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;

/// Schema version written to `PRAGMA user_version` after migrating.
const SCHEMA_VERSION: i32 = 1;

/// Shared handle to the listwise database.
///
/// Cloning is cheap; all clones share one connection. Each statement runs
/// under the lock, so single-row writes are atomic with respect to each other.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// Fresh in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS drafts (
            id                TEXT PRIMARY KEY,
            batch_id          TEXT,
            store_id          TEXT NOT NULL,
            merchant_id       TEXT NOT NULL,
            group_index       INTEGER,
            name_en           TEXT NOT NULL,
            name_ar           TEXT NOT NULL,
            description_en    TEXT NOT NULL DEFAULT '',
            description_ar    TEXT NOT NULL DEFAULT '',
            category_en       TEXT NOT NULL DEFAULT '',
            category_ar       TEXT NOT NULL DEFAULT '',
            tags              TEXT NOT NULL DEFAULT '[]',
            suggested_price   REAL,
            image_urls        TEXT NOT NULL DEFAULT '[]',
            primary_image_url TEXT NOT NULL,
            confidence        TEXT NOT NULL DEFAULT 'low',
            status            TEXT NOT NULL DEFAULT 'draft'
                              CHECK (status IN ('draft', 'persisted', 'discarded')),
            metadata          TEXT NOT NULL DEFAULT '{}',
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_drafts_scope ON drafts(merchant_id, store_id, status);
        CREATE INDEX IF NOT EXISTS idx_drafts_batch ON drafts(batch_id);

        CREATE TABLE IF NOT EXISTS catalog_products (
            id                TEXT PRIMARY KEY,
            store_id          TEXT NOT NULL,
            merchant_id       TEXT NOT NULL,
            draft_id          TEXT NOT NULL UNIQUE REFERENCES drafts(id),
            slug              TEXT NOT NULL,
            name_en           TEXT NOT NULL,
            name_ar           TEXT NOT NULL,
            description_en    TEXT NOT NULL,
            description_ar    TEXT NOT NULL,
            category_en       TEXT NOT NULL,
            category_ar       TEXT NOT NULL,
            tags              TEXT NOT NULL,
            price             REAL,
            image_urls        TEXT NOT NULL,
            primary_image_url TEXT NOT NULL,
            confidence        TEXT NOT NULL,
            ai_generated      INTEGER NOT NULL DEFAULT 1,
            created_at        TEXT NOT NULL,
            UNIQUE(store_id, slug)
        );
        CREATE INDEX IF NOT EXISTS idx_catalog_scope ON catalog_products(merchant_id, store_id, category_en);

        CREATE TABLE IF NOT EXISTS generated_assets (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            merchant_id  TEXT NOT NULL,
            task_id      TEXT NOT NULL,
            draft_id     TEXT,
            operation    TEXT NOT NULL,
            original_url TEXT NOT NULL,
            edited_url   TEXT NOT NULL,
            metadata     TEXT NOT NULL DEFAULT '{}',
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_assets_task ON generated_assets(merchant_id, task_id);

        CREATE TABLE IF NOT EXISTS conversation_archive (
            id          TEXT PRIMARY KEY,
            merchant_id TEXT NOT NULL,
            store_id    TEXT NOT NULL,
            messages    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        ",
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tracing::debug!(version = SCHEMA_VERSION, "Database migrated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reopen_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("listwise.db");
        {
            let db = Database::new(&path).unwrap();
            db.conn()
                .execute(
                    "INSERT INTO conversation_archive (id, merchant_id, store_id, messages, created_at)
                     VALUES ('a1', 'm1', 's1', '[]', '2026-01-01T00:00:00Z')",
                    [],
                )
                .unwrap();
        }
        let db = Database::new(&path).unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM conversation_archive", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_status_check_constraint() {
        let db = Database::in_memory().unwrap();
        let result = db.conn().execute(
            "INSERT INTO drafts (id, store_id, merchant_id, name_en, name_ar, primary_image_url, status, created_at, updated_at)
             VALUES ('d1', 's1', 'm1', 'x', 'x', 'a.jpg', 'archived', 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
