//! On-device file layout.
//!
//! # Responsibility
//! - Derive every path the app touches from one data directory.
//!
//! # Invariants
//! - The data directory must be absolute; logging requires absolute paths.

use std::path::{Path, PathBuf};

pub const DB_FILE_NAME: &str = "eyeapp.sqlite3";
pub const LOG_DIR_NAME: &str = "logs";
pub const EXPORT_DIR_NAME: &str = "exports";
pub const MANIFEST_FILE_NAME: &str = "protocols.json";

/// Paths under the application data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    /// Returns an error message when `data_dir` is empty or relative.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, String> {
        let data_dir = data_dir.into();
        if data_dir.as_os_str().is_empty() {
            return Err("data_dir cannot be empty".to_string());
        }
        if !data_dir.is_absolute() {
            return Err(format!(
                "data_dir must be an absolute path, got `{}`",
                data_dir.display()
            ));
        }
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }

    pub fn export_dir(&self) -> PathBuf {
        self.data_dir.join(EXPORT_DIR_NAME)
    }

    /// Default manifest location when the host does not name one.
    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join(MANIFEST_FILE_NAME)
    }
}
