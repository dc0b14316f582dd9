//! Session records: persisted summaries, slide marks and the export document.
//!
//! # Invariants
//! - A session's first mark is always `{slide: 0, t: 0}`.
//! - `SessionExport` has no field able to carry patient id, initials, birth
//!   year or notes; `patient_code` is its only patient identifier.

use crate::model::patient::PatientId;
use serde::{Deserialize, Serialize};

/// Compact record of a completed session, persisted per patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// `sess-<compact ISO timestamp>`.
    pub id: String,
    /// Owning patient. Summaries are removed with their patient.
    pub patient_id: PatientId,
    pub protocol_key: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

/// Slide transition timestamp, relative to session start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlideMark {
    /// Zero-based slide index.
    pub slide: usize,
    /// Milliseconds elapsed since session start on the monotonic clock.
    pub t: f64,
}

impl SlideMark {
    /// Mark recorded when a session starts.
    pub const START: SlideMark = SlideMark { slide: 0, t: 0.0 };
}

/// Anonymized session document handed to the file writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
    pub protocol_key: String,
    pub protocol_label: String,
    pub total_slides: usize,
    pub marks: Vec<SlideMark>,
    /// Per-mark durations in whole milliseconds; same length as `marks`.
    pub durations: Vec<u64>,
    pub app_build: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_code: Option<String>,
}
