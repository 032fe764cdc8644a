//! Structured records produced by the extractor.
//!
//! A [`Record`] is an ordered mapping from field name to [`FieldValue`].
//! Field order follows the schema and survives serialization: records are
//! written as JSON objects whose keys appear in field order, and absent
//! scalars are written as an explicit `null` instead of being dropped.

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// The value of one field within a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Text or attribute value; `None` when the selector matched nothing
    /// or the attribute was missing.
    Scalar(Option<String>),
    /// One sub-record per node matched by a list field, in match order.
    List(Vec<Record>),
}

impl FieldValue {
    /// Returns the scalar string, if this is a present scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(value) => value.as_deref(),
            FieldValue::List(_) => None,
        }
    }

    /// Returns the sub-records, if this is a list value.
    pub fn as_list(&self) -> Option<&[Record]> {
        match self {
            FieldValue::List(records) => Some(records),
            FieldValue::Scalar(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Scalar(Some(value.to_string()))
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        FieldValue::Scalar(value)
    }
}

impl From<Vec<Record>> for FieldValue {
    fn from(records: Vec<Record>) -> Self {
        FieldValue::List(records)
    }
}

/// An ordered mapping from field name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    entries: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing the value in place if the name already exists
    /// so the original position is kept.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder-style [`Record::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Shorthand for the present string value of a scalar field.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Field names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut FieldValue)> {
        self.entries.iter_mut().map(|(n, v)| (n.as_str(), v))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Scalar(Some(value)) => serializer.serialize_str(value),
            FieldValue::Scalar(None) => serializer.serialize_none(),
            FieldValue::List(records) => records.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a record object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
        let mut entries: Vec<(String, FieldValue)> = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, value)) = access.next_entry::<String, FieldValue>()? {
            if entries.iter().any(|(existing, _)| *existing == name) {
                return Err(de::Error::custom(format!("duplicate field `{}`", name)));
            }
            entries.push((name, value));
        }
        Ok(Record { entries })
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldValueVisitor)
    }
}

struct FieldValueVisitor;

impl<'de> Visitor<'de> for FieldValueVisitor {
    type Value = FieldValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string, null, or an array of records")
    }

    fn visit_unit<E: de::Error>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Scalar(None))
    }

    fn visit_none<E: de::Error>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Scalar(None))
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<FieldValue, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<FieldValue, E> {
        Ok(FieldValue::Scalar(Some(value.to_string())))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<FieldValue, E> {
        Ok(FieldValue::Scalar(Some(value)))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<FieldValue, A::Error> {
        let mut records = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(record) = seq.next_element::<Record>()? {
            records.push(record);
        }
        Ok(FieldValue::List(records))
    }
}
