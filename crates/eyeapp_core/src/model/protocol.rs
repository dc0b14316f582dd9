//! Slide protocol manifest.
//!
//! # Responsibility
//! - Parse the read-only `{ key: { label, slides } }` manifest.
//! - Degrade to an empty manifest when the startup load fails.
//!
//! # Invariants
//! - Protocol keys are iterated in sorted order.
//! - An empty manifest is a valid, usable state ("no slides").

use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Protocol selected when the caller does not name one.
pub const DEFAULT_PROTOCOL_KEY: &str = "saccades";

/// Named ordered sequence of slide image references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub label: String,
    pub slides: Vec<String>,
}

impl Protocol {
    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }
}

/// All protocols available to the slide stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolManifest {
    protocols: BTreeMap<String, Protocol>,
}

impl ProtocolManifest {
    pub fn from_json(raw: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(raw).map_err(ManifestError::Parse)
    }

    pub fn get(&self, key: &str) -> Option<&Protocol> {
        self.protocols.get(key)
    }

    /// Returns the protocol label, falling back to the key itself.
    pub fn label_for<'a>(&'a self, key: &'a str) -> &'a str {
        self.get(key).map_or(key, |protocol| protocol.label.as_str())
    }

    /// Returns the named protocol, or an empty one labelled by `key` so the
    /// stage can still show "no slides".
    pub fn protocol_or_empty(&self, key: &str) -> Protocol {
        self.get(key).cloned().unwrap_or_else(|| Protocol {
            label: key.to_string(),
            slides: Vec::new(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Protocol)> {
        self.protocols
            .iter()
            .map(|(key, protocol)| (key.as_str(), protocol))
    }

    pub fn insert(&mut self, key: impl Into<String>, protocol: Protocol) {
        self.protocols.insert(key.into(), protocol);
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

/// Reads and parses a manifest file.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<ProtocolManifest, ManifestError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|err| ManifestError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    ProtocolManifest::from_json(&raw)
}

/// Loads the manifest once at startup, leaving it empty on failure.
///
/// # Side effects
/// - Emits `manifest_load` events; failures are logged, never returned.
pub fn load_manifest_or_empty(path: impl AsRef<Path>) -> ProtocolManifest {
    let path = path.as_ref();
    match load_manifest(path) {
        Ok(manifest) => {
            info!(
                "event=manifest_load module=protocol status=ok protocols={}",
                manifest.len()
            );
            manifest
        }
        Err(err) => {
            error!(
                "event=manifest_load module=protocol status=error path={} error={}",
                path.display(),
                err
            );
            ProtocolManifest::default()
        }
    }
}

/// Errors while reading the protocol manifest.
#[derive(Debug)]
pub enum ManifestError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read manifest `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid protocol manifest: {err}"),
        }
    }
}

impl Error for ManifestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}
