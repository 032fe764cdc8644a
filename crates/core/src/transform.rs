//! Post-extraction record transforms.
//!
//! Transforms run over freshly extracted records before they are captured.
//! None run implicitly; a pipeline applies exactly the transforms it is
//! configured with, in order.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::record::{FieldValue, Record};
use crate::{QuarryError, Result};

/// A rewrite applied to each extracted record.
pub trait RecordTransform: Send + Sync {
    /// Rewrites `record` in place. `page_url` is the URL the record was
    /// extracted from, when the target is a URL.
    fn apply(&self, record: &mut Record, page_url: Option<&Url>);
}

/// Declarative transform entry, as written in a job file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformSpec {
    /// Resolve a relative link field into an absolute URL.
    Absolutize {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base: Option<String>,
    },
}

impl TransformSpec {
    /// Builds the runtime transform.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::InvalidUrl`] if a configured base is not a URL.
    pub fn build(&self) -> Result<Box<dyn RecordTransform>> {
        match self {
            TransformSpec::Absolutize { field, base } => {
                let base = base
                    .as_deref()
                    .map(|b| Url::parse(b).map_err(|e| QuarryError::InvalidUrl(format!("{}: {}", b, e))))
                    .transpose()?;
                Ok(Box::new(AbsolutizeUrl { field: field.clone(), base }))
            }
        }
    }
}

/// Rewrites a named scalar field into an absolute URL.
///
/// The field is rewritten wherever it appears, including inside list
/// sub-records. Values are joined against the configured base, falling
/// back to the page URL. Absent values stay absent; values that cannot be
/// joined are kept as-is.
#[derive(Debug, Clone)]
pub struct AbsolutizeUrl {
    pub field: String,
    pub base: Option<Url>,
}

impl AbsolutizeUrl {
    pub fn new(field: impl Into<String>, base: Option<Url>) -> Self {
        Self { field: field.into(), base }
    }

    fn rewrite(&self, record: &mut Record, base: &Url) {
        for (name, value) in record.iter_mut() {
            match value {
                FieldValue::Scalar(Some(link)) if name == self.field => match base.join(link.trim()) {
                    Ok(absolute) => *link = absolute.to_string(),
                    Err(e) => tracing::warn!(field = name, value = %link, error = %e, "could not absolutize link"),
                },
                FieldValue::List(records) => {
                    for sub in records.iter_mut() {
                        self.rewrite(sub, base);
                    }
                }
                FieldValue::Scalar(_) => {}
            }
        }
    }
}

impl RecordTransform for AbsolutizeUrl {
    fn apply(&self, record: &mut Record, page_url: Option<&Url>) {
        match self.base.as_ref().or(page_url) {
            Some(base) => self.rewrite(record, base),
            None => tracing::warn!(field = %self.field, "no base URL to absolutize against"),
        }
    }
}

/// Applies transforms in order to every record.
pub fn apply_transforms(records: &mut [Record], transforms: &[Box<dyn RecordTransform>], page_url: Option<&Url>) {
    for record in records.iter_mut() {
        for transform in transforms {
            transform.apply(record, page_url);
        }
    }
}
