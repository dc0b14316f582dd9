//! Identifier and anonymous code generation.
//!
//! # Responsibility
//! - Produce opaque internal ids for patient records.
//! - Produce short human-readable anonymous patient codes.
//! - Derive deterministic session ids from the session start instant.
//!
//! # Invariants
//! - Patient codes are `P-` followed by 4 characters from [`CODE_ALPHABET`].
//! - Session ids are a pure function of the start instant.
//! - Timestamps are rendered as UTC ISO-8601 with millisecond precision.

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::collections::HashSet;
use uuid::Uuid;

/// Alphabet for anonymous codes. Omits `0`, `1`, `I` and `O`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Prefix shared by every anonymous patient code.
pub const PATIENT_CODE_PREFIX: &str = "P-";
/// Number of random characters after the prefix.
pub const PATIENT_CODE_LEN: usize = 4;
/// Prefix shared by every session id.
pub const SESSION_ID_PREFIX: &str = "sess-";

const MAX_CODE_ATTEMPTS: usize = 64;

static PATIENT_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^P-[ABCDEFGHJKLMNPQRSTUVWXYZ23456789]{4}$").expect("valid patient code regex")
});

/// Returns a random opaque id suitable for keying the patient map.
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Returns a random anonymous code such as `P-7G2Q`.
///
/// No uniqueness check is performed; see [`new_patient_code_avoiding`].
pub fn new_patient_code() -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(PATIENT_CODE_PREFIX.len() + PATIENT_CODE_LEN);
    code.push_str(PATIENT_CODE_PREFIX);
    for _ in 0..PATIENT_CODE_LEN {
        let index = rng.gen_range(0..CODE_ALPHABET.len());
        code.push(char::from(CODE_ALPHABET[index]));
    }
    code
}

/// Returns a fresh anonymous code that is not contained in `existing`.
///
/// Returns `None` when every attempt collided, which only happens when the
/// code space is close to exhausted.
pub fn new_patient_code_avoiding(existing: &HashSet<&str>) -> Option<String> {
    (0..MAX_CODE_ATTEMPTS)
        .map(|_| new_patient_code())
        .find(|code| !existing.contains(code.as_str()))
}

/// Returns whether `value` has the anonymous patient code format.
pub fn is_patient_code(value: &str) -> bool {
    PATIENT_CODE_RE.is_match(value)
}

/// Renders an instant as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn iso_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Derives the session id for a session started at `started_at`.
///
/// `2024-01-01T12:00:00.000Z` becomes `sess-20240101_120000000Z`.
pub fn new_session_id(started_at: DateTime<Utc>) -> String {
    let stamp: String = iso_timestamp(started_at)
        .chars()
        .filter(|c| !matches!(c, ':' | '.' | '-'))
        .map(|c| if c == 'T' { '_' } else { c })
        .collect();
    format!("{SESSION_ID_PREFIX}{stamp}")
}

#[cfg(test)]
mod tests {
    use super::{
        is_patient_code, iso_timestamp, new_id, new_patient_code, new_patient_code_avoiding,
        new_session_id, CODE_ALPHABET,
    };
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    #[test]
    fn alphabet_excludes_ambiguous_characters() {
        for ambiguous in [b'0', b'1', b'I', b'O'] {
            assert!(!CODE_ALPHABET.contains(&ambiguous));
        }
    }

    #[test]
    fn generated_codes_match_format() {
        for _ in 0..200 {
            let code = new_patient_code();
            assert!(is_patient_code(&code), "bad code {code}");
        }
    }

    #[test]
    fn code_format_rejects_ambiguous_and_short_values() {
        assert!(is_patient_code("P-7G2Q"));
        assert!(!is_patient_code("P-7G2O"));
        assert!(!is_patient_code("P-7G2"));
        assert!(!is_patient_code("X-7G2Q"));
        assert!(!is_patient_code("p-7g2q"));
    }

    #[test]
    fn avoiding_skips_existing_codes() {
        let taken = new_patient_code();
        let existing: HashSet<&str> = [taken.as_str()].into_iter().collect();
        let fresh = new_patient_code_avoiding(&existing).expect("code space is not exhausted");
        assert_ne!(fresh, taken);
    }

    #[test]
    fn ids_are_distinct() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn session_id_is_compact_iso_stamp() {
        let started = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(iso_timestamp(started), "2024-01-01T12:00:00.000Z");
        assert_eq!(new_session_id(started), "sess-20240101_120000000Z");
    }
}
