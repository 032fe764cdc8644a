//! Error types for Quarry operations.
//!
//! This module defines the main error type [`QuarryError`] which represents
//! everything that can fail while compiling a schema, fetching a target,
//! or persisting captures and shards, and [`ValidationError`] for the
//! structural problems the schema compiler rejects.
//!
//! # Example
//!
//! ```rust
//! use quarry_core::{QuarryError, ValidationError, compile_schema_str};
//!
//! let raw = r#"{"baseSelector": "div.card", "fields": [
//!     {"name": "link", "selector": "a", "kind": "attribute"}
//! ]}"#;
//!
//! match compile_schema_str(raw) {
//!     Err(QuarryError::Validation(ValidationError::MissingAttributeName { field })) => {
//!         assert_eq!(field, "link");
//!     }
//!     other => panic!("unexpected: {:?}", other.map(|_| ())),
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Structural problems found while compiling a schema description.
///
/// Field locations are reported as dotted paths from the top-level field
/// list, e.g. `lines.pinyin` for a field nested inside the `lines` list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The field's kind tag is not one of `text`, `attribute` or `list`.
    #[error("field `{field}` has unknown kind `{kind}` (expected text, attribute or list)")]
    UnknownFieldKind { field: String, kind: String },

    /// An attribute field without a (non-empty) attribute name.
    #[error("attribute field `{field}` is missing its attribute name")]
    MissingAttributeName { field: String },

    /// A list field without sub-fields.
    #[error("list field `{field}` has no sub-fields")]
    EmptySubSchema { field: String },

    /// Two sibling fields share a name.
    #[error("duplicate field name `{field}`")]
    DuplicateFieldName { field: String },

    /// The schema has no base selector.
    #[error("schema base selector is empty")]
    EmptyBaseSelector,

    /// A selector string that does not parse as CSS.
    #[error("invalid selector `{selector}` for `{field}`: {reason}")]
    InvalidSelector { field: String, selector: String, reason: String },
}

/// Main error type for extraction and persistence operations.
#[derive(Error, Debug)]
pub enum QuarryError {
    /// HTTP request errors from reqwest.
    ///
    /// This variant wraps network errors, DNS failures, connection issues,
    /// and other HTTP-related problems.
    #[cfg(feature = "fetch")]
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Request timeout.
    #[error("Request timed out after {timeout} seconds")]
    Timeout { timeout: u64 },

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A CSS selector that failed to parse outside of schema compilation.
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// Schema failed validation.
    ///
    /// Raised by the compiler before any fetch happens.
    #[error("Schema validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Generic I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing a capture file failed. Nothing was published at `path`.
    #[error("Failed to write capture {}: {source}", path.display())]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A capture already exists for the target and captures are never overwritten.
    #[error("Capture already exists: {0}")]
    CaptureExists(PathBuf),

    /// Writing a shard failed.
    #[error("Failed to write shard {}: {source}", path.display())]
    ShardWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Job or pipeline configuration errors.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias for QuarryError.
pub type Result<T> = std::result::Result<T, QuarryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuarryError::InvalidUrl("not a url".to_string());
        assert!(err.to_string().contains("Invalid URL"));
    }

    #[test]
    fn test_validation_error_names_field() {
        let err: QuarryError = ValidationError::EmptySubSchema { field: "lines".to_string() }.into();
        assert!(err.to_string().contains("`lines`"));
        assert!(matches!(err, QuarryError::Validation(_)));
    }

    #[test]
    fn test_cache_write_error_mentions_path() {
        let err = QuarryError::CacheWrite {
            path: PathBuf::from("data/poems.json"),
            source: std::io::Error::other("disk full"),
        };
        let message = err.to_string();
        assert!(message.contains("data/poems.json"));
        assert!(message.contains("disk full"));
    }

    #[test]
    fn test_timeout_error() {
        let err = QuarryError::Timeout { timeout: 30 };
        assert!(err.to_string().contains("30"));
    }
}
