//! Durable snapshotting for the result cache.
//!
//! The snapshot is a single JSON document holding the full entry map. The
//! format round-trips every [`CacheEntry`] field but is an implementation
//! detail, not a public contract: every cached value is re-derivable from
//! upstream, so a discarded snapshot only costs a cold cache.

use std::{collections::HashMap, fs, io, path::Path};

use thiserror::Error;

use super::CacheEntry;

/// Errors raised by snapshot I/O. Callers log and swallow these; cache
/// persistence failures are never allowed to fail a mutation.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("snapshot (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SnapshotError {
    /// A missing snapshot file is the normal first-run case, not corruption.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(err) if err.kind() == io::ErrorKind::NotFound)
    }
}

/// Writes the full entry set to `path`, replacing any previous snapshot.
pub(super) fn save(path: &Path, entries: &HashMap<String, CacheEntry>) -> Result<(), SnapshotError> {
    let payload = serde_json::to_vec(entries)?;
    // Write-then-rename so a crash mid-write never leaves a torn snapshot
    // where the loader would find it.
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, payload)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Loads the entry set from `path`.
pub(super) fn load(path: &Path) -> Result<HashMap<String, CacheEntry>, SnapshotError> {
    let payload = fs::read(path)?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Removes the snapshot file if present.
pub(super) fn remove(path: &Path) -> Result<(), SnapshotError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
