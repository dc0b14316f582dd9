//! Patient and session-summary registry.
//!
//! # Responsibility
//! - Own the in-memory projection of the persisted snapshot.
//! - Provide the only write paths for patients and session summaries.
//! - Write the full snapshot through to the store on every mutation.
//!
//! # Invariants
//! - Memory is updated only after the store write succeeded.
//! - Deleting a patient removes its session summaries in the same write.
//! - Session summaries always reference a live patient.
//! - `revision()` increases by one per committed mutation.
//! - An unreadable stored value is backed up before anything overwrites it.

use crate::ids::new_patient_code_avoiding;
use crate::model::patient::{NewPatient, Patient, PatientId};
use crate::model::session::SessionSummary;
use crate::repo::snapshot_repo::{RepoError, Snapshot, SnapshotRepository};
use crate::service::session_engine::SessionSink;
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors from registry mutations.
#[derive(Debug)]
pub enum RegistryError {
    /// Snapshot write failed; in-memory state is unchanged.
    Store(RepoError),
    /// Session summary references a patient that does not exist.
    PatientNotFound(PatientId),
    /// No unused anonymous code could be generated.
    CodeSpaceExhausted,
    /// An unreadable stored snapshot could not be backed up, so writes that
    /// would replace it are refused.
    ReadOnly,
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "failed to persist patient store: {err}"),
            Self::PatientNotFound(id) => write!(f, "patient not found: {id}"),
            Self::CodeSpaceExhausted => write!(f, "no unused patient code available"),
            Self::ReadOnly => write!(
                f,
                "patient store is read-only: unreadable stored data could not be backed up"
            ),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for RegistryError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// In-memory patient/session state backed by a snapshot repository.
pub struct Registry<R: SnapshotRepository> {
    repo: R,
    state: Snapshot,
    load_warning: Option<String>,
    read_only: bool,
    revision: u64,
}

impl<R: SnapshotRepository> Registry<R> {
    /// Loads the persisted snapshot once.
    ///
    /// A missing snapshot yields an empty registry. When the stored value is
    /// unreadable or holds invalid records, the raw value is first copied
    /// aside through [`SnapshotRepository::backup_current`]; the registry then
    /// keeps whatever records were valid (nothing, for malformed JSON). The
    /// failure is logged and kept in [`Registry::load_warning`]. If the backup
    /// itself fails, the registry refuses writes for the rest of its life.
    pub fn open(repo: R) -> Self {
        let (state, load_warning, read_only) = match repo.load_snapshot() {
            Ok(Some(snapshot)) => {
                info!(
                    "event=store_load module=registry status=ok patients={}",
                    snapshot.patients.len()
                );
                (snapshot, None, false)
            }
            Ok(None) => {
                info!("event=store_load module=registry status=empty");
                (Snapshot::default(), None, false)
            }
            Err(err) => {
                warn!("event=store_load module=registry status=error error={err}");
                let mut warning = err.to_string();
                let read_only = match repo.backup_current() {
                    Ok(Some(backup_key)) => {
                        info!(
                            "event=store_backup module=registry status=ok backup_key={backup_key}"
                        );
                        warning.push_str(&format!("; original kept under `{backup_key}`"));
                        false
                    }
                    Ok(None) => false,
                    Err(backup_err) => {
                        warn!(
                            "event=store_backup module=registry status=error error={backup_err}"
                        );
                        warning.push_str("; backup failed, store is read-only");
                        true
                    }
                };
                let state = match err {
                    RepoError::InvalidRecords { salvaged, .. } => *salvaged,
                    _ => Snapshot::default(),
                };
                (state, Some(warning), read_only)
            }
        };

        Self {
            repo,
            state,
            load_warning,
            read_only,
            revision: 0,
        }
    }

    /// Describes a failed startup load, if any.
    pub fn load_warning(&self) -> Option<&str> {
        self.load_warning.as_deref()
    }

    /// Whether mutations are refused because stored data could not be kept.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Monotonic change counter for hosts that poll for updates.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.state
    }

    /// Creates and persists a patient with fresh id, code and timestamp.
    pub fn add_patient(&mut self, fields: NewPatient) -> RegistryResult<Patient> {
        let code = {
            let existing: HashSet<&str> = self
                .state
                .patients
                .values()
                .map(|patient| patient.code.as_str())
                .collect();
            new_patient_code_avoiding(&existing).ok_or(RegistryError::CodeSpaceExhausted)?
        };
        let patient = Patient::create(fields, code, Utc::now());

        let mut next = self.state.clone();
        next.patients.insert(patient.id.clone(), patient.clone());
        self.commit(next)?;

        info!(
            "event=patient_add module=registry status=ok code={}",
            patient.code
        );
        Ok(patient)
    }

    /// Deletes a patient and all of its session summaries.
    ///
    /// Unknown ids are a no-op and do not touch the store.
    pub fn delete_patient(&mut self, id: &str) -> RegistryResult<()> {
        if !self.state.patients.contains_key(id) {
            debug!("event=patient_delete module=registry status=noop");
            return Ok(());
        }

        let mut next = self.state.clone();
        next.patients.remove(id);
        let removed_sessions = next
            .sessions_by_patient
            .remove(id)
            .map_or(0, |sessions| sessions.len());
        self.commit(next)?;

        info!(
            "event=patient_delete module=registry status=ok removed_sessions={removed_sessions}"
        );
        Ok(())
    }

    /// Returns patients ordered by ascending `created_at`, ties by id.
    pub fn list_patients(&self) -> Vec<&Patient> {
        let mut patients: Vec<&Patient> = self.state.patients.values().collect();
        patients.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        patients
    }

    pub fn get_patient(&self, id: &str) -> Option<&Patient> {
        self.state.patients.get(id)
    }

    /// Resolves the patient-selection parameter handed over by navigation.
    pub fn resolve_selection(&self, param: Option<&str>) -> Option<&Patient> {
        param
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .and_then(|id| self.get_patient(id))
    }

    /// Appends a completed-session summary to its patient's list.
    pub fn add_session_summary(&mut self, summary: SessionSummary) -> RegistryResult<()> {
        if !self.state.patients.contains_key(&summary.patient_id) {
            return Err(RegistryError::PatientNotFound(summary.patient_id));
        }

        let session_id = summary.id.clone();
        let mut next = self.state.clone();
        next.sessions_by_patient
            .entry(summary.patient_id.clone())
            .or_default()
            .push(summary);
        self.commit(next)?;

        info!("event=session_add module=registry status=ok session_id={session_id}");
        Ok(())
    }

    /// Returns a patient's summaries in completion order.
    pub fn list_sessions(&self, patient_id: &str) -> &[SessionSummary] {
        self.state
            .sessions_by_patient
            .get(patient_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn commit(&mut self, next: Snapshot) -> RegistryResult<()> {
        if self.read_only {
            warn!("event=store_save module=registry status=rejected reason=read_only");
            return Err(RegistryError::ReadOnly);
        }
        if let Err(err) = self.repo.save_snapshot(&next) {
            warn!("event=store_save module=registry status=error error={err}");
            return Err(err.into());
        }
        self.state = next;
        self.revision += 1;
        Ok(())
    }
}

impl<R: SnapshotRepository> SessionSink for Registry<R> {
    fn record_session(&mut self, summary: SessionSummary) -> RegistryResult<()> {
        self.add_session_summary(summary)
    }
}
