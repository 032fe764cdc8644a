//! Schema-driven record extraction.
//!
//! Every node matching the schema's base selector yields one [`Record`],
//! in document order. Field selectors are scoped to the current context
//! node, so list fields only ever narrow the search into descendants.
//! Selector misses are values, not errors: scalars become absent and
//! lists become empty.

use crate::parse::{Document, Element};
use crate::record::{FieldValue, Record};
use crate::schema::{FieldKind, FieldSpec, Schema};

/// Configuration for record extraction
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Collapse whitespace runs and trim text values
    pub normalize_whitespace: bool,
    /// Treat text matches that are empty after trimming as absent
    pub empty_text_as_absent: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self { normalize_whitespace: true, empty_text_as_absent: false }
    }
}

/// Extracts records using the default configuration.
pub fn extract_records(schema: &Schema, doc: &Document) -> Vec<Record> {
    extract_records_with_config(schema, doc, &ExtractConfig::default())
}

/// Extracts records, one per base-selector match, in document order.
pub fn extract_records_with_config(schema: &Schema, doc: &Document, config: &ExtractConfig) -> Vec<Record> {
    let records: Vec<Record> = doc
        .select_with(schema.base_selector())
        .iter()
        .map(|node| apply_fields(schema.fields(), node, config))
        .collect();

    tracing::debug!(
        base_selector = schema.base_selector_source(),
        records = records.len(),
        "extracted records"
    );

    records
}

/// Builds one record by evaluating each field against the context node.
fn apply_fields(fields: &[FieldSpec], context: &Element<'_>, config: &ExtractConfig) -> Record {
    let mut record = Record::new();
    for field in fields {
        record.insert(field.name(), extract_field(field, context, config));
    }
    record
}

fn extract_field(field: &FieldSpec, context: &Element<'_>, config: &ExtractConfig) -> FieldValue {
    match field.kind() {
        FieldKind::Text => FieldValue::Scalar(extract_text(field, context, config)),
        FieldKind::Attribute(attr) => FieldValue::Scalar(extract_attribute(field, attr, context)),
        FieldKind::List(sub_fields) => FieldValue::List(extract_list(field, sub_fields, context, config)),
    }
}

fn extract_text(field: &FieldSpec, context: &Element<'_>, config: &ExtractConfig) -> Option<String> {
    let node = context.select_first(field.selector())?;
    let text = if config.normalize_whitespace { node.normalized_text() } else { node.text() };

    if config.empty_text_as_absent && text.trim().is_empty() { None } else { Some(text) }
}

fn extract_attribute(field: &FieldSpec, attr: &str, context: &Element<'_>) -> Option<String> {
    context
        .select_first(field.selector())
        .and_then(|node| node.attr(attr).map(str::to_string))
}

fn extract_list(
    field: &FieldSpec, sub_fields: &[FieldSpec], context: &Element<'_>, config: &ExtractConfig,
) -> Vec<Record> {
    context
        .select_with(field.selector())
        .iter()
        .map(|node| apply_fields(sub_fields, node, config))
        .collect()
}
