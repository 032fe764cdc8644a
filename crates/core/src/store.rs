//! On-disk encoding and atomic file publication.
//!
//! Captures and shards are pretty-printed JSON with four-space indentation
//! and non-ASCII text written verbatim. Files are written to a temporary
//! sibling first and renamed into place, so readers never observe a
//! half-written file.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tempfile::NamedTempFile;

use crate::Result;

const INDENT: &[u8] = b"    ";

/// Serializes a value as four-space indented JSON.
pub fn to_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(INDENT));
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// How [`write_atomic`] treats an existing file at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// Replace whatever is there.
    Overwrite,
    /// Leave an existing destination untouched.
    NoClobber,
}

/// What a successful [`write_atomic`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    Written,
    /// `Publish::NoClobber` found the destination already present.
    AlreadyPresent,
}

/// Writes `bytes` to `path` through a temporary file in the same directory.
///
/// The parent directory is created if needed. On any error the temporary
/// file is removed and nothing is published at `path`. Only the final
/// no-clobber rename can yield [`Published::AlreadyPresent`]; errors from
/// preparing the directory or the temporary file are always returned as
/// errors, whatever their kind.
pub fn write_atomic(path: &Path, bytes: &[u8], mode: Publish) -> io::Result<Published> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    match mode {
        Publish::Overwrite => tmp.persist(path).map(|_| Published::Written).map_err(|e| e.error),
        Publish::NoClobber => match tmp.persist_noclobber(path) {
            Ok(_) => Ok(Published::Written),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(Published::AlreadyPresent),
            Err(e) => Err(e.error),
        },
    }
}
