use chrono::Utc;
use pulse_models::record_schema::{RecordRow, RECORDS_TABLE_DDL};
use rusqlite::Connection;

use crate::error::StoreError;

/// SQLite record store.
///
/// Each record is a single row keyed by its kind. Writes go through a
/// transaction so a concurrent reader sees either the old row or the new one.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the store file. Creates the schema and enables WAL so
    /// readers in other processes never block on a write.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(RECORDS_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(RECORDS_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Get a record by key. Returns None if it was never written.
    pub fn get(&self, key: &str) -> Result<Option<RecordRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT key, value_json, run_id, updated_at FROM records WHERE key = ?1",
        )?;

        let result = stmt.query_row(rusqlite::params![key], |row| {
            Ok(RecordRow {
                key: row.get(0)?,
                value_json: row.get(1)?,
                run_id: row.get(2)?,
                updated_at: row.get(3)?,
            })
        });

        match result {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// Replace a record within a transaction.
    pub fn put(&mut self, key: &str, value_json: &str, run_id: Option<&str>) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO records (key, value_json, run_id, updated_at) \
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![key, value_json, run_id, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Count all records.
    pub fn count(&self) -> Result<usize, StoreError> {
        let count: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count)
    }
}
