//! Field-extraction schemas.
//!
//! A schema is described declaratively ([`RawSchema`], usually JSON) and
//! compiled once into an immutable [`Schema`] before any fetch happens.
//! Compilation validates the whole tree and parses every selector, so a
//! malformed schema fails fast without network cost.
//!
//! # Example
//!
//! ```rust
//! use quarry_core::schema::{FieldKind, compile_schema_str};
//!
//! let schema = compile_schema_str(r#"{
//!     "baseSelector": "div.card",
//!     "fields": [
//!         {"name": "title", "selector": "h4", "kind": "text"},
//!         {"name": "link", "selector": "a", "kind": "attribute", "attributeName": "href"}
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(schema.fields().len(), 2);
//! assert!(matches!(schema.fields()[1].kind(), FieldKind::Attribute(attr) if attr == "href"));
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::{QuarryError, Result};

/// Schema description as written by users.
///
/// Accepts `type` as an alias for `kind` and `attribute` as an alias for
/// `attributeName`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSchema {
    /// Informational label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub base_selector: String,
    #[serde(default)]
    pub fields: Vec<RawField>,
}

/// One field rule as written by users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawField {
    pub name: String,
    pub selector: String,
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default, alias = "attribute", skip_serializing_if = "Option::is_none")]
    pub attribute_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<RawField>>,
}

/// A compiled, validated schema.
#[derive(Debug, Clone)]
pub struct Schema {
    name: Option<String>,
    base_selector: Selector,
    base_selector_source: String,
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Selector for the repeating root nodes, one per record.
    pub fn base_selector(&self) -> &Selector {
        &self.base_selector
    }

    pub fn base_selector_source(&self) -> &str {
        &self.base_selector_source
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

/// A compiled field rule.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    selector: Selector,
    selector_source: String,
    kind: FieldKind,
}

impl FieldSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn selector_source(&self) -> &str {
        &self.selector_source
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }
}

/// What a field extracts from the nodes its selector matches.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Normalized text of the first match.
    Text,
    /// The named attribute of the first match.
    Attribute(String),
    /// One sub-record per match, built from the nested fields.
    List(Vec<FieldSpec>),
}

/// Compiles a schema description, validating it recursively.
///
/// Rejects unknown kinds, attribute fields without an attribute name,
/// list fields without sub-fields, duplicate sibling names, and selectors
/// that do not parse.
pub fn compile(raw: &RawSchema) -> std::result::Result<Schema, ValidationError> {
    if raw.base_selector.trim().is_empty() {
        return Err(ValidationError::EmptyBaseSelector);
    }
    let base_selector = compile_selector("<base>", &raw.base_selector)?;
    let fields = compile_fields(&raw.fields, "")?;

    Ok(Schema {
        name: raw.name.clone(),
        base_selector,
        base_selector_source: raw.base_selector.clone(),
        fields,
    })
}

/// Parses a JSON schema description and compiles it.
pub fn compile_schema_str(json: &str) -> Result<Schema> {
    let raw: RawSchema = serde_json::from_str(json)?;
    Ok(compile(&raw)?)
}

/// Reads a JSON schema description from disk and compiles it.
pub fn load_schema_file<P: AsRef<Path>>(path: P) -> Result<Schema> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(QuarryError::FileNotFound(path.to_path_buf()));
    }
    compile_schema_str(&fs::read_to_string(path)?)
}

fn compile_fields(raw_fields: &[RawField], parent: &str) -> std::result::Result<Vec<FieldSpec>, ValidationError> {
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(raw_fields.len());

    for raw in raw_fields {
        let path = if parent.is_empty() { raw.name.clone() } else { format!("{}.{}", parent, raw.name) };

        if !seen.insert(raw.name.as_str()) {
            return Err(ValidationError::DuplicateFieldName { field: path });
        }

        let kind = match raw.kind.trim().to_lowercase().as_str() {
            "text" => FieldKind::Text,
            "attribute" => match raw.attribute_name.as_deref().map(str::trim) {
                Some(attr) if !attr.is_empty() => FieldKind::Attribute(attr.to_string()),
                _ => return Err(ValidationError::MissingAttributeName { field: path }),
            },
            "list" => match raw.fields.as_deref() {
                Some(sub) if !sub.is_empty() => FieldKind::List(compile_fields(sub, &path)?),
                _ => return Err(ValidationError::EmptySubSchema { field: path }),
            },
            other => return Err(ValidationError::UnknownFieldKind { field: path, kind: other.to_string() }),
        };

        if !matches!(kind, FieldKind::Attribute(_)) && raw.attribute_name.is_some() {
            tracing::warn!(field = %path, "attributeName ignored on a non-attribute field");
        }
        if !matches!(kind, FieldKind::List(_)) && raw.fields.is_some() {
            tracing::warn!(field = %path, "sub-fields ignored on a non-list field");
        }

        let selector = compile_selector(&path, &raw.selector)?;
        fields.push(FieldSpec { name: raw.name.clone(), selector, selector_source: raw.selector.clone(), kind });
    }

    Ok(fields)
}

fn compile_selector(field: &str, source: &str) -> std::result::Result<Selector, ValidationError> {
    Selector::parse(source).map_err(|e| ValidationError::InvalidSelector {
        field: field.to_string(),
        selector: source.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn field(name: &str, kind: &str) -> RawField {
        RawField { name: name.into(), selector: "span".into(), kind: kind.into(), attribute_name: None, fields: None }
    }

    fn schema_with(fields: Vec<RawField>) -> RawSchema {
        RawSchema { name: None, base_selector: "div.card".into(), fields }
    }

    #[test]
    fn test_compile_valid_nested_schema() {
        let raw = schema_with(vec![
            field("title", "text"),
            RawField { attribute_name: Some("href".into()), ..field("link", "attribute") },
            RawField { fields: Some(vec![field("hanzi", "text"), field("pinyin", "text")]), ..field("lines", "list") },
        ]);

        let schema = compile(&raw).unwrap();
        assert_eq!(schema.base_selector_source(), "div.card");
        assert_eq!(schema.fields()[0].name(), "title");
        match schema.fields()[2].kind() {
            FieldKind::List(sub) => {
                assert_eq!(sub.len(), 2);
                assert_eq!(sub[1].name(), "pinyin");
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_attribute_name() {
        let raw = schema_with(vec![field("link", "attribute")]);
        assert_eq!(
            compile(&raw).unwrap_err(),
            ValidationError::MissingAttributeName { field: "link".into() }
        );
    }

    #[test]
    fn test_blank_attribute_name_is_missing() {
        let raw = schema_with(vec![RawField { attribute_name: Some("  ".into()), ..field("link", "attribute") }]);
        assert!(matches!(compile(&raw), Err(ValidationError::MissingAttributeName { .. })));
    }

    #[rstest]
    #[case(None)]
    #[case(Some(Vec::new()))]
    fn test_empty_sub_schema(#[case] sub: Option<Vec<RawField>>) {
        let raw = schema_with(vec![RawField { fields: sub, ..field("lines", "list") }]);
        assert_eq!(compile(&raw).unwrap_err(), ValidationError::EmptySubSchema { field: "lines".into() });
    }

    #[test]
    fn test_duplicate_sibling_names() {
        let raw = schema_with(vec![field("name", "text"), field("name", "text")]);
        assert_eq!(compile(&raw).unwrap_err(), ValidationError::DuplicateFieldName { field: "name".into() });
    }

    #[test]
    fn test_same_name_at_different_levels_is_allowed() {
        let raw = schema_with(vec![
            field("name", "text"),
            RawField { fields: Some(vec![field("name", "text")]), ..field("lines", "list") },
        ]);
        assert!(compile(&raw).is_ok());
    }

    #[test]
    fn test_nested_errors_report_dotted_path() {
        let raw = schema_with(vec![RawField {
            fields: Some(vec![field("a", "text"), field("a", "text")]),
            ..field("lines", "list")
        }]);
        assert_eq!(compile(&raw).unwrap_err(), ValidationError::DuplicateFieldName { field: "lines.a".into() });
    }

    #[rstest]
    #[case("html")]
    #[case("regex")]
    #[case("")]
    fn test_unknown_kind(#[case] kind: &str) {
        let raw = schema_with(vec![field("x", kind)]);
        assert!(matches!(compile(&raw), Err(ValidationError::UnknownFieldKind { .. })));
    }

    #[test]
    fn test_kind_tag_is_case_insensitive() {
        let raw = schema_with(vec![field("x", "TEXT")]);
        assert!(compile(&raw).is_ok());
    }

    #[test]
    fn test_invalid_selector() {
        let raw = schema_with(vec![RawField { selector: "[[nope".into(), ..field("x", "text") }]);
        assert!(matches!(compile(&raw), Err(ValidationError::InvalidSelector { .. })));
    }

    #[test]
    fn test_empty_base_selector() {
        let raw = RawSchema { name: None, base_selector: " ".into(), fields: vec![] };
        assert_eq!(compile(&raw).unwrap_err(), ValidationError::EmptyBaseSelector);
    }

    #[test]
    fn test_aliases_from_json() {
        let schema = compile_schema_str(
            r#"{
                "name": "poems",
                "baseSelector": "div.card-body",
                "fields": [
                    {"name": "name", "selector": "h4.card-title", "type": "text"},
                    {"name": "pinyin_url", "selector": "a.card-link", "type": "attribute", "attribute": "href"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(schema.name(), Some("poems"));
        assert!(matches!(schema.fields()[1].kind(), FieldKind::Attribute(a) if a == "href"));
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        assert!(matches!(compile_schema_str("{"), Err(QuarryError::Json(_))));
    }

    #[test]
    fn test_load_schema_file_missing() {
        let result = load_schema_file("/nonexistent/schema.json");
        assert!(matches!(result, Err(QuarryError::FileNotFound(_))));
    }
}
