//! Snapshot persistence over a namespaced key/value table.
//!
//! # Responsibility
//! - Serialize the whole patient/session state as one JSON document.
//! - Read it back, rejecting malformed content and dropping invalid records.
//! - Copy an unreadable value aside before it can be overwritten.
//!
//! # Invariants
//! - Every save rewrites the full snapshot (no partial writes).
//! - Read paths report corrupt data instead of masking it; recovery policy
//!   belongs to the caller.

use crate::db::DbError;
use crate::model::patient::{Patient, PatientId};
use crate::model::session::SessionSummary;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Key under which the snapshot is stored.
pub const SNAPSHOT_KEY: &str = "eyeapp.patientStore.v1";

pub type RepoResult<T> = Result<T, RepoError>;

/// Full persisted state: patients plus per-patient session summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub patients: BTreeMap<PatientId, Patient>,
    #[serde(default)]
    pub sessions_by_patient: BTreeMap<PatientId, Vec<SessionSummary>>,
}

impl Snapshot {
    /// Drops records that cannot be trusted and describes each drop.
    ///
    /// Removes patients that fail validation or sit under a foreign key,
    /// session lists of patients that are not present, and summaries filed
    /// under the wrong patient. Everything else is kept as stored.
    pub fn salvage(&mut self) -> Vec<String> {
        let mut problems = Vec::new();

        self.patients.retain(|key, patient| {
            if let Err(err) = patient.validate() {
                problems.push(format!("patient `{key}`: {err}"));
                return false;
            }
            if key != &patient.id {
                problems.push(format!("patient stored under `{key}` has id `{}`", patient.id));
                return false;
            }
            true
        });

        let patients = &self.patients;
        self.sessions_by_patient.retain(|patient_id, sessions| {
            if !patients.contains_key(patient_id) {
                if !sessions.is_empty() {
                    problems.push(format!(
                        "{} session(s) of missing patient `{patient_id}`",
                        sessions.len()
                    ));
                }
                return false;
            }
            sessions.retain(|summary| {
                if &summary.patient_id == patient_id {
                    return true;
                }
                problems.push(format!(
                    "session `{}` listed under `{patient_id}` belongs to `{}`",
                    summary.id, summary.patient_id
                ));
                false
            });
            true
        });

        problems
    }
}

/// Persistence error for snapshot reads and writes.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Serialize(serde_json::Error),
    /// Stored value is not a readable snapshot at all.
    InvalidData(String),
    /// Stored snapshot parsed, but some records were invalid and dropped.
    InvalidRecords {
        salvaged: Box<Snapshot>,
        problems: Vec<String>,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialize(err) => write!(f, "failed to serialize snapshot: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted snapshot: {message}"),
            Self::InvalidRecords { problems, .. } => write!(
                f,
                "dropped {} invalid persisted record(s): {}",
                problems.len(),
                problems.join("; ")
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialize(err) => Some(err),
            Self::InvalidData(_) | Self::InvalidRecords { .. } => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable storage for the whole snapshot.
pub trait SnapshotRepository {
    /// Returns `Ok(None)` when nothing has been saved yet.
    fn load_snapshot(&self) -> RepoResult<Option<Snapshot>>;
    fn save_snapshot(&self, snapshot: &Snapshot) -> RepoResult<()>;
    /// Copies the stored value aside so a later save cannot destroy it.
    ///
    /// Returns where the copy went, or `None` when nothing is stored.
    fn backup_current(&self) -> RepoResult<Option<String>>;
}

/// SQLite-backed snapshot storage using the `kv_store` table.
pub struct SqliteSnapshotRepository<'conn> {
    conn: &'conn Connection,
    key: String,
}

impl<'conn> SqliteSnapshotRepository<'conn> {
    /// Uses the default [`SNAPSHOT_KEY`] namespace.
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_key(conn, SNAPSHOT_KEY)
    }

    pub fn with_key(conn: &'conn Connection, key: impl Into<String>) -> Self {
        Self {
            conn,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl SnapshotRepository for SqliteSnapshotRepository<'_> {
    fn load_snapshot(&self) -> RepoResult<Option<Snapshot>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1;",
                params![self.key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let mut snapshot: Snapshot = serde_json::from_str(&raw)
            .map_err(|err| RepoError::InvalidData(format!("malformed JSON: {err}")))?;
        let problems = snapshot.salvage();
        if !problems.is_empty() {
            return Err(RepoError::InvalidRecords {
                salvaged: Box::new(snapshot),
                problems,
            });
        }
        Ok(Some(snapshot))
    }

    fn save_snapshot(&self, snapshot: &Snapshot) -> RepoResult<()> {
        let raw = serde_json::to_string(snapshot).map_err(RepoError::Serialize)?;
        self.conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![self.key, raw],
        )?;
        Ok(())
    }

    fn backup_current(&self) -> RepoResult<Option<String>> {
        let backup_key = format!("{}.corrupt-{}", self.key, Utc::now().timestamp_millis());
        let copied = self.conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value)
             SELECT ?2, value FROM kv_store WHERE key = ?1;",
            params![self.key, backup_key],
        )?;
        Ok((copied > 0).then_some(backup_key))
    }
}
