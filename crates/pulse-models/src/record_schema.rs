use serde::{Deserialize, Serialize};

/// The persisted records. Each is read and written independently.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// The last successful `RunResult`.
    LastResult,
    /// The raw language-model reply of the last generation attempt, kept for diagnostics.
    LastRawOutput,
    /// The language-model API credential.
    Credential,
}

impl RecordKind {
    pub fn key(&self) -> &'static str {
        match self {
            RecordKind::LastResult => "last_result",
            RecordKind::LastRawOutput => "last_raw_output",
            RecordKind::Credential => "credential",
        }
    }
}

/// SQLite schema for the record store.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS records (
///     key         TEXT PRIMARY KEY,
///     value_json  TEXT NOT NULL,
///     run_id      TEXT,
///     updated_at  TEXT NOT NULL
/// );
/// ```
pub const RECORDS_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS records (
    key         TEXT PRIMARY KEY,
    value_json  TEXT NOT NULL,
    run_id      TEXT,
    updated_at  TEXT NOT NULL
);
";

/// A raw record row as read from SQLite.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub key: String,
    pub value_json: String,
    pub run_id: Option<String>,
    pub updated_at: String,
}

/// The diagnostic record written for every generation attempt, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawOutputRecord {
    pub run_id: uuid::Uuid,
    pub model: String,
    pub content: String,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}
