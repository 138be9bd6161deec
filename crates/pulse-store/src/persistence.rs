use std::sync::{Mutex, MutexGuard};

use pulse_models::record_schema::{RawOutputRecord, RecordKind};
use pulse_models::report::RunResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::sqlite::SqliteStore;

/// Typed access to the persisted records.
///
/// This is the only writer of the last `RunResult` and the stored credential.
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct Persistence {
    sqlite: Mutex<SqliteStore>,
}

impl Persistence {
    pub fn new(sqlite: SqliteStore) -> Self {
        Self {
            sqlite: Mutex::new(sqlite),
        }
    }

    /// Open the store at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        Ok(Self::new(SqliteStore::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(SqliteStore::open_in_memory()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, SqliteStore>, StoreError> {
        self.sqlite
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    fn read<T: DeserializeOwned>(&self, kind: RecordKind) -> Result<Option<T>, StoreError> {
        let row = self.lock()?.get(kind.key())?;
        match row {
            Some(row) => Ok(Some(serde_json::from_str(&row.value_json)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(
        &self,
        kind: RecordKind,
        value: &T,
        run_id: Option<&str>,
    ) -> Result<(), StoreError> {
        // Serialize before taking the lock so a failure never touches the stored row.
        let json = serde_json::to_string(value)?;
        self.lock()?.put(kind.key(), &json, run_id)?;
        debug!(record = kind.key(), bytes = json.len(), "Record written");
        Ok(())
    }

    /// The last successful run, if any.
    pub fn load_last(&self) -> Result<Option<RunResult>, StoreError> {
        self.read(RecordKind::LastResult)
    }

    /// Atomically replace the last successful run.
    pub fn save_result(&self, result: &RunResult) -> Result<(), StoreError> {
        let run_id = result.run_id.to_string();
        self.write(RecordKind::LastResult, result, Some(&run_id))?;
        info!(
            run_id = %result.run_id,
            sources = result.sources.len(),
            signals = result.signals.len(),
            "Run result saved"
        );
        Ok(())
    }

    pub fn load_raw_output(&self) -> Result<Option<RawOutputRecord>, StoreError> {
        self.read(RecordKind::LastRawOutput)
    }

    pub fn save_raw_output(&self, record: &RawOutputRecord) -> Result<(), StoreError> {
        let run_id = record.run_id.to_string();
        self.write(RecordKind::LastRawOutput, record, Some(&run_id))
    }

    pub fn load_credential(&self) -> Result<Option<String>, StoreError> {
        let stored: Option<String> = self.read(RecordKind::Credential)?;
        Ok(stored.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
    }

    pub fn save_credential(&self, secret: &str) -> Result<(), StoreError> {
        self.write(RecordKind::Credential, &secret.trim().to_string(), None)?;
        info!("Credential stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_result(markdown: &str) -> RunResult {
        RunResult {
            run_id: Uuid::new_v4(),
            markdown: markdown.to_string(),
            tickers: vec![],
            sources: vec![],
            signals: vec![],
            indicators: vec![],
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn load_last_empty_store() {
        let store = Persistence::open_in_memory().unwrap();
        assert!(store.load_last().unwrap().is_none());
    }

    #[test]
    fn save_result_replaces_previous() {
        let store = Persistence::open_in_memory().unwrap();
        store.save_result(&sample_result("first")).unwrap();
        let second = sample_result("second");
        store.save_result(&second).unwrap();

        let loaded = store.load_last().unwrap().unwrap();
        assert_eq!(loaded, second);
    }

    #[test]
    fn raw_output_does_not_touch_last_result() {
        let store = Persistence::open_in_memory().unwrap();
        let result = sample_result("kept");
        store.save_result(&result).unwrap();

        store
            .save_raw_output(&RawOutputRecord {
                run_id: Uuid::new_v4(),
                model: "gpt-4o-mini".to_string(),
                content: "garbage".to_string(),
                recorded_at: Utc::now(),
            })
            .unwrap();

        assert_eq!(store.load_last().unwrap().unwrap(), result);
        assert_eq!(store.load_raw_output().unwrap().unwrap().content, "garbage");
    }

    #[test]
    fn credential_is_trimmed() {
        let store = Persistence::open_in_memory().unwrap();
        assert!(store.load_credential().unwrap().is_none());

        store.save_credential("  sk-test-123\n").unwrap();
        assert_eq!(store.load_credential().unwrap().as_deref(), Some("sk-test-123"));
    }
}
