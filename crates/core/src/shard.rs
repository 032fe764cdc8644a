//! Per-record shard output.
//!
//! Each record is written to `<root>/<ordinal>.<name>/<name>.<ext>`, where
//! the ordinal is the record's 1-based position in extraction order and
//! the name is a sanitized form of the record's designated name field.
//! Writing the same records again overwrites the same files.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::record::Record;
use crate::store::{Publish, to_json_bytes, write_atomic};
use crate::{QuarryError, Result};

/// Fallback used when a record has no usable name.
pub const UNTITLED: &str = "untitled";

pub const MAX_NAME_CHARS: usize = 100;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|\p{Cc}]"#).expect("static regex is valid"));

/// Makes a string safe to use as a single path component.
///
/// Strips path separators, reserved and control characters, collapses
/// whitespace, trims surrounding dots and spaces and caps the length.
/// Returns [`UNTITLED`] when nothing usable remains.
pub fn sanitize_name(raw: &str) -> String {
    let spaced = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let stripped = UNSAFE_CHARS.replace_all(&spaced, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped: String = collapsed.chars().take(MAX_NAME_CHARS).collect();
    let trimmed = capped.trim_matches(|c: char| c == '.' || c.is_whitespace());

    if trimmed.is_empty() { UNTITLED.to_string() } else { trimmed.to_string() }
}

/// Writes records as individual shard files.
#[derive(Debug, Clone)]
pub struct ShardWriter {
    name_field: String,
    extension: String,
}

impl Default for ShardWriter {
    fn default() -> Self {
        Self { name_field: "name".to_string(), extension: "json".to_string() }
    }
}

impl ShardWriter {
    pub fn new(name_field: impl Into<String>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        let extension = extension.trim_start_matches('.').to_string();
        Self { name_field: name_field.into(), extension }
    }

    pub fn name_field(&self) -> &str {
        &self.name_field
    }

    /// The path the record at `ordinal` (1-based) is written to.
    pub fn shard_path(&self, root: &Path, ordinal: usize, record: &Record) -> PathBuf {
        let name = sanitize_name(record.get_str(&self.name_field).unwrap_or_default());
        root.join(format!("{}.{}", ordinal, name))
            .join(format!("{}.{}", name, self.extension))
    }

    /// Writes every record under `root`, in order, returning the file paths.
    ///
    /// # Errors
    ///
    /// Stops at the first failure with [`QuarryError::ShardWrite`]; shards
    /// written before it are left in place.
    pub fn write(&self, records: &[Record], root: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let path = self.shard_path(root, index + 1, record);
            let bytes = to_json_bytes(record)?;
            write_atomic(&path, &bytes, Publish::Overwrite)
                .map_err(|source| QuarryError::ShardWrite { path: path.clone(), source })?;
            written.push(path);
        }

        tracing::debug!(root = %root.display(), shards = written.len(), "wrote shards");
        Ok(written)
    }
}
