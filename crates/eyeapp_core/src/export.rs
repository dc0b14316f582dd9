//! Anonymized session export.
//!
//! # Responsibility
//! - Assemble the export document from an ended session.
//! - Derive the export file name and hand the JSON to a file writer.
//!
//! # Invariants
//! - The anonymous patient code is the only patient data copied out.
//! - Building a document has no side effects.

use crate::model::patient::Patient;
use crate::model::session::{SessionExport, SlideMark};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Build tag stamped into every export.
pub const APP_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), "-desktop");

/// Timing data of a session that has been ended.
#[derive(Debug, Clone, PartialEq)]
pub struct EndedSession {
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
    pub marks: Vec<SlideMark>,
    pub durations: Vec<u64>,
}

/// Protocol metadata copied into the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolMeta<'a> {
    pub key: &'a str,
    pub label: &'a str,
    pub total_slides: usize,
}

/// Builds the export document for an ended session.
pub fn build_session_export(
    session: &EndedSession,
    patient: Option<&Patient>,
    protocol: ProtocolMeta<'_>,
) -> SessionExport {
    SessionExport {
        id: session.id.clone(),
        started_at: session.started_at.clone(),
        ended_at: session.ended_at.clone(),
        protocol_key: protocol.key.to_string(),
        protocol_label: protocol.label.to_string(),
        total_slides: protocol.total_slides,
        marks: session.marks.clone(),
        durations: session.durations.clone(),
        app_build: APP_BUILD.to_string(),
        patient_code: patient.map(|patient| patient.code.clone()),
    }
}

/// Returns `<patientCode_><sessionId>_<protocolKey>.json`.
pub fn export_file_name(export: &SessionExport) -> String {
    let code_prefix = export
        .patient_code
        .as_deref()
        .map(|code| format!("{code}_"))
        .unwrap_or_default();
    format!("{code_prefix}{}_{}.json", export.id, export.protocol_key)
}

/// Destination for serialized export documents.
pub trait FileWriter {
    /// Writes `contents` under `file_name`, returning where it landed.
    fn write_file(&mut self, file_name: &str, contents: &[u8]) -> std::io::Result<PathBuf>;
}

/// Writes exports into a fixed directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirFileWriter {
    dir: PathBuf,
}

impl DirFileWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileWriter for DirFileWriter {
    fn write_file(&mut self, file_name: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}

/// Serializes `export` as pretty JSON and hands it to `writer`.
pub fn write_export<W: FileWriter + ?Sized>(
    export: &SessionExport,
    writer: &mut W,
) -> Result<PathBuf, ExportError> {
    let file_name = export_file_name(export);
    let body = serde_json::to_vec_pretty(export).map_err(ExportError::Serialize)?;
    let path = writer
        .write_file(&file_name, &body)
        .map_err(ExportError::Io)?;
    info!(
        "event=session_export module=export status=ok session_id={} bytes={}",
        export.id,
        body.len()
    );
    Ok(path)
}

/// Errors while writing an export file.
#[derive(Debug)]
pub enum ExportError {
    Serialize(serde_json::Error),
    Io(std::io::Error),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialize(err) => write!(f, "failed to serialize export: {err}"),
            Self::Io(err) => write!(f, "failed to write export: {err}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Serialize(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}
