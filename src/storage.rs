//! Market Board Storage
//!
//! SQLite persistence for per-item upload watermarks and deduplicated sale
//! history. A [`SaleStore`] only knows where the database lives; each sync
//! run opens its own [`StoreSession`] and drops it when the run ends.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::{ItemId, SaleRecord, Watermark};

// =============================================================================
// STORAGE SCHEMA
// =============================================================================

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;

-- One watermark per tracked item
CREATE TABLE IF NOT EXISTS last_updated (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER UNIQUE NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sale_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL,
    hq BOOLEAN NOT NULL,
    price_per_unit INTEGER NOT NULL,
    quantity INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    world_id INTEGER NOT NULL,
    hash TEXT NOT NULL UNIQUE,
    aggregated BOOLEAN NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_sale_history_item_ts
    ON sale_history(item_id, timestamp);
"#;

const UPSERT_WATERMARK_SQL: &str = r#"
INSERT INTO last_updated (item_id, timestamp)
VALUES (?1, ?2)
ON CONFLICT(item_id) DO UPDATE
    SET timestamp = excluded.timestamp
    WHERE excluded.timestamp > last_updated.timestamp
"#;

const INSERT_SALE_SQL: &str = r#"
INSERT INTO sale_history (
    item_id, hq, price_per_unit, quantity, timestamp, world_id, hash, aggregated
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT(hash) DO NOTHING
"#;

// =============================================================================
// STORE
// =============================================================================

/// Location of the market board database.
#[derive(Debug, Clone)]
pub struct SaleStore {
    db_path: PathBuf,
}

impl SaleStore {
    /// Create the database (and parent directory) if needed and apply the schema.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            if !parent.exists() && !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        // Opening a session applies the schema.
        StoreSession::open(&db_path).with_context(|| {
            format!("Failed to open market board database: {}", db_path.display())
        })?;
        info!(path = %db_path.display(), "Market board storage opened");

        Ok(Self { db_path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Open a session for a single sync run.
    pub fn session(&self) -> rusqlite::Result<StoreSession> {
        StoreSession::open(&self.db_path)
    }
}

/// A single connection held for the duration of one sync run.
pub struct StoreSession {
    conn: Connection,
}

impl StoreSession {
    pub fn open(db_path: &Path) -> rusqlite::Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        Self::from_connection(Connection::open_with_flags(db_path, flags)?)
    }

    /// In-memory session (for testing).
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Insert the watermark, or raise it when `timestamp` is strictly newer.
    /// Returns whether a row changed.
    pub fn upsert_watermark_if_newer(
        &self,
        item_id: ItemId,
        timestamp: i64,
    ) -> rusqlite::Result<bool> {
        let mut stmt = self.conn.prepare_cached(UPSERT_WATERMARK_SQL)?;
        let changes = stmt.execute(params![item_id, timestamp])?;
        Ok(changes > 0)
    }

    /// Insert a sale unless its identity hash is already stored.
    pub fn insert_sale_if_absent(&self, record: &SaleRecord) -> rusqlite::Result<bool> {
        insert_sale(&self.conn, record)
    }

    /// Insert all records in one transaction; colliding hashes are skipped.
    /// Returns the number of rows actually inserted. Nothing is committed
    /// if any insert fails.
    pub fn insert_sales_atomic(&mut self, records: &[SaleRecord]) -> rusqlite::Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        for record in records {
            if insert_sale(&tx, record)? {
                inserted += 1;
            }
        }
        tx.commit()?;

        Ok(inserted)
    }

    pub fn watermark(&self, item_id: ItemId) -> rusqlite::Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT timestamp FROM last_updated WHERE item_id = ?1",
                params![item_id],
                |row| row.get(0),
            )
            .optional()
    }

    /// All watermarks ordered by item id.
    pub fn watermarks(&self) -> rusqlite::Result<Vec<Watermark>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT item_id, timestamp FROM last_updated ORDER BY item_id ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Watermark {
                    item_id: row.get(0)?,
                    last_upload_time: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_sales(&self, item_id: ItemId) -> rusqlite::Result<usize> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM sale_history WHERE item_id = ?1",
            params![item_id],
            |row| row.get(0),
        )
    }

    pub fn total_sales(&self) -> rusqlite::Result<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM sale_history", [], |row| row.get(0))
    }

    /// Stored sales for an item in insertion order.
    pub fn sales_for_item(&self, item_id: ItemId) -> rusqlite::Result<Vec<SaleRecord>> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT item_id, hq, price_per_unit, quantity, timestamp, world_id, hash, aggregated
            FROM sale_history
            WHERE item_id = ?1
            ORDER BY id ASC
            "#,
        )?;

        let records = stmt
            .query_map(params![item_id], |row| {
                Ok(SaleRecord {
                    item_id: row.get(0)?,
                    hq: row.get(1)?,
                    price_per_unit: row.get(2)?,
                    quantity: row.get(3)?,
                    timestamp: row.get(4)?,
                    world_id: row.get(5)?,
                    identity_hash: row.get(6)?,
                    aggregated: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }
}

fn insert_sale(conn: &Connection, record: &SaleRecord) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare_cached(INSERT_SALE_SQL)?;
    let changes = stmt.execute(params![
        record.item_id,
        record.hq,
        record.price_per_unit,
        record.quantity,
        record.timestamp,
        record.world_id,
        record.identity_hash,
        record.aggregated,
    ])?;
    Ok(changes > 0)
}
