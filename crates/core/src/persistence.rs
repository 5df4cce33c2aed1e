//! Last-applied record persistence
//!
//! The record is stored as a JSON file in the host's settings directory,
//! namespaced per host application so multiple hosts sharing one settings
//! directory do not clobber each other. Writes are atomic (temp file +
//! rename).

use crate::record::LastAppliedRecord;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Error types for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Path of the record file for a host application
///
/// # Example
/// ```
/// use std::path::Path;
/// use filter_runner_core::persistence::record_path;
///
/// let path = record_path(Path::new("/tmp/settings"), "gimp");
/// assert_eq!(path, Path::new("/tmp/settings/last-execution-gimp.json"));
/// ```
pub fn record_path(dir: &Path, host: &str) -> PathBuf {
    dir.join(format!("last-execution-{}.json", host))
}

/// Save the last-applied record for a host application.
///
/// An empty record (no successful apply yet) is persisted as the default
/// record, so readers always find all fields present with empty/zero
/// values. Returns the path written.
pub fn save_record(
    dir: &Path,
    host: &str,
    record: &LastAppliedRecord,
) -> PersistenceResult<PathBuf> {
    let path = record_path(dir, host);
    let default_record;
    let to_write = if record.is_empty() {
        default_record = LastAppliedRecord::default();
        &default_record
    } else {
        record
    };

    let json = serde_json::to_string_pretty(to_write)
        .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, &path)?;

    Ok(path)
}

/// Load the last-applied record for a host application
///
/// Returns `None` if no record file exists.
pub fn load_record(dir: &Path, host: &str) -> PersistenceResult<Option<LastAppliedRecord>> {
    let path = record_path(dir, host);
    if !path.exists() {
        return Ok(None);
    }

    let json = fs::read_to_string(&path)?;
    let record: LastAppliedRecord = serde_json::from_str(&json)
        .map_err(|e| PersistenceError::Deserialization(e.to_string()))?;

    Ok(Some(record))
}

/// Check whether a record file exists for a host application
pub fn record_exists(dir: &Path, host: &str) -> bool {
    record_path(dir, host).exists()
}
