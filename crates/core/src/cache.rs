//! Idempotent capture store.
//!
//! A capture is the full record sequence for one target, stored as
//! `<root>/<key>.json`. Captures are written at most once and never
//! mutated: a capture either exists in full or does not exist at all.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::record::Record;
use crate::shard::sanitize_name;
use crate::store::{Publish, Published, to_json_bytes, write_atomic};
use crate::{QuarryError, Result};

/// File-based store of captures keyed by a logical target key.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the capture for `key` lives.
    pub fn capture_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_name(key)))
    }

    /// Whether a capture for `key` has been published.
    pub fn has(&self, key: &str) -> bool {
        self.capture_path(key).is_file()
    }

    /// Loads a previously saved capture.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::FileNotFound`] if there is no capture for `key`.
    pub fn load(&self, key: &str) -> Result<Vec<Record>> {
        let path = self.capture_path(key);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => QuarryError::FileNotFound(path.clone()),
            _ => QuarryError::Io(e),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Saves the capture for `key` and returns its path.
    ///
    /// The payload is written to a temporary file and published with a
    /// no-clobber rename, so an interrupted save leaves no capture behind
    /// and an existing capture is never replaced.
    ///
    /// # Errors
    ///
    /// [`QuarryError::CaptureExists`] if a capture is already present,
    /// [`QuarryError::CacheWrite`] for any other filesystem failure.
    pub fn save(&self, key: &str, records: &[Record]) -> Result<PathBuf> {
        let path = self.capture_path(key);
        let bytes = to_json_bytes(records)?;

        let published = write_atomic(&path, &bytes, Publish::NoClobber)
            .map_err(|source| QuarryError::CacheWrite { path: path.clone(), source })?;
        if published == Published::AlreadyPresent {
            return Err(QuarryError::CaptureExists(path));
        }

        tracing::debug!(path = %path.display(), records = records.len(), "saved capture");
        Ok(path)
    }
}
