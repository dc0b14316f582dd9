//! Core logic for the eyeapp slide-session recorder.
//!
//! Owns patient records, per-patient session summaries, slide-session
//! timing, and anonymized session export. Hosts (CLI, desktop shell) drive
//! it through [`Registry`] and [`SessionEngine`].

pub mod config;
pub mod db;
pub mod export;
pub mod ids;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::AppPaths;
pub use export::{
    build_session_export, export_file_name, write_export, DirFileWriter, EndedSession,
    ExportError, FileWriter, ProtocolMeta, APP_BUILD,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::patient::{NewPatient, Patient, PatientId, PatientValidationError};
pub use model::protocol::{
    load_manifest, load_manifest_or_empty, ManifestError, Protocol, ProtocolManifest,
    DEFAULT_PROTOCOL_KEY,
};
pub use model::session::{SessionExport, SessionSummary, SlideMark};
pub use repo::snapshot_repo::{
    RepoError, RepoResult, Snapshot, SnapshotRepository, SqliteSnapshotRepository, SNAPSHOT_KEY,
};
pub use service::registry::{Registry, RegistryError, RegistryResult};
pub use service::session_engine::{
    derive_durations, Clock, ManualClock, SessionEngine, SessionSink, SessionState, SystemClock,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
