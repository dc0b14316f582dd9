//! Patient domain model.
//!
//! # Responsibility
//! - Define the persisted patient record and its creation input.
//! - Validate records read back from storage.
//!
//! # Invariants
//! - `id`, `code` and `created_at` are assigned once at creation.
//! - Optional operator fields are omitted from JSON when absent.

use crate::ids::{is_patient_code, iso_timestamp, new_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Internal patient identifier. Never exported.
pub type PatientId = String;

/// A patient record owned by the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Opaque internal id used as the store key.
    pub id: PatientId,
    /// Anonymous code such as `P-7G2Q`.
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initials: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// ISO-8601 UTC creation timestamp.
    pub created_at: String,
}

impl Patient {
    /// Builds a new record with a fresh id and the given code.
    ///
    /// Blank optional text fields are normalized to `None`.
    pub fn create(fields: NewPatient, code: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            code,
            initials: normalize_text(fields.initials),
            birth_year: fields.birth_year,
            notes: normalize_text(fields.notes),
            created_at: iso_timestamp(created_at),
        }
    }

    /// Validates identity fields of a stored record.
    pub fn validate(&self) -> Result<(), PatientValidationError> {
        if self.id.trim().is_empty() {
            return Err(PatientValidationError::EmptyId);
        }
        if !is_patient_code(&self.code) {
            return Err(PatientValidationError::InvalidCode(self.code.clone()));
        }
        if self.created_at.trim().is_empty() {
            return Err(PatientValidationError::MissingCreatedAt(self.id.clone()));
        }
        Ok(())
    }
}

/// Operator-supplied fields for a new patient. All optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPatient {
    pub initials: Option<String>,
    pub birth_year: Option<i32>,
    pub notes: Option<String>,
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

/// Validation errors for persisted patient records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatientValidationError {
    EmptyId,
    InvalidCode(String),
    MissingCreatedAt(PatientId),
}

impl Display for PatientValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "patient id must not be empty"),
            Self::InvalidCode(code) => write!(f, "patient code is invalid: {code}"),
            Self::MissingCreatedAt(id) => write!(f, "patient {id} has no createdAt"),
        }
    }
}

impl Error for PatientValidationError {}
