//! In-memory tree of extracted fields.
//!
//! A [`DocumentTree`] is built once per document by
//! [`crate::pipeline::parse`] and only read afterwards. Nested entities become
//! a [`Field`] whose `children` hold one [`Row`] per occurrence.

use crate::document::NormalizedValue;
use chrono::NaiveDateTime;
use serde_json::{json, Value};

/// Confidence and page number of fields that did not come from the extractor.
pub const NOT_APPLICABLE: i32 = -1;

/// A scalar field value.
///
/// Extracted fields always carry [`FieldValue::Text`]; the other variants come
/// from synthetic metadata fields.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Boolean(bool),
    Integer(i64),
    Float(f64),
    DateTime(NaiveDateTime),
}

impl FieldValue {
    /// Text rendering, as the raw-mention casting rules see it.
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::DateTime(dt) => dt.format(crate::pipeline::cast::DATETIME_FORMAT).to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::DateTime(_) => Value::String(self.to_text()),
        }
    }

    /// Interpret a JSON scalar as a value; arrays and objects are kept as text.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(FieldValue::Boolean(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(FieldValue::Integer)
                .or_else(|| n.as_f64().map(FieldValue::Float)),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            other => Some(FieldValue::Text(other.to_string())),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(dt: NaiveDateTime) -> Self {
        FieldValue::DateTime(dt)
    }
}

/// One named value, or a group of nested rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    /// Raw mention; `None` when the extractor found no text.
    pub value: Option<FieldValue>,
    pub normalized_value: Option<NormalizedValue>,
    /// In `[-1, 1]`; [`NOT_APPLICABLE`] for synthetic fields.
    pub confidence: f32,
    /// 1-based; [`NOT_APPLICABLE`] when not paginated.
    pub page_number: i32,
    pub children: Vec<Row>,
}

impl Field {
    pub fn new(name: impl Into<String>, value: Option<FieldValue>) -> Self {
        Self {
            name: name.into(),
            value,
            normalized_value: None,
            confidence: NOT_APPLICABLE as f32,
            page_number: NOT_APPLICABLE,
            children: Vec::new(),
        }
    }

    /// A synthetic scalar field, as built for metadata values.
    ///
    /// The normalized reading mirrors the value so both casting methodologies
    /// see the same data.
    pub fn synthetic(name: impl Into<String>, value: Option<FieldValue>) -> Self {
        let normalized_value = value.as_ref().map(NormalizedValue::from);
        Self {
            normalized_value,
            ..Self::new(name, value)
        }
    }

    /// Name usable as a destination column.
    pub fn column_name(&self) -> String {
        column_safe(&self.name)
    }

    pub fn is_group(&self) -> bool {
        !self.children.is_empty()
    }

    /// Raw-entity record: `{name, value, confidence, page_number, children?}`.
    pub fn to_raw(&self) -> Value {
        let mut obj = json!({
            "name": self.column_name(),
            "value": self.value.as_ref().map(FieldValue::to_json),
            "confidence": self.confidence,
            "page_number": self.page_number,
        });
        if self.is_group() {
            let children: Vec<Value> = self.children.iter().map(Row::to_raw).collect();
            obj["children"] = Value::Array(children);
        }
        obj
    }
}

/// Replace characters a column name cannot hold.
pub fn column_safe(name: &str) -> String {
    name.replace('-', "_")
}

/// Ordered fields with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub fields: Vec<Field>,
}

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Find a field by column-safe name.
    pub fn find(&self, column: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.column_name() == column)
    }

    /// Names are compared in column-safe form, like [`Row::find`].
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Field> {
        let column = column_safe(name);
        self.fields.iter_mut().find(|f| f.column_name() == column)
    }

    /// True if a field would land in the same column as `name`.
    pub fn contains(&self, name: &str) -> bool {
        let column = column_safe(name);
        self.fields.iter().any(|f| f.column_name() == column)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_raw(&self) -> Value {
        Value::Array(self.fields.iter().map(Field::to_raw).collect())
    }
}

/// The parsed document: its top-level row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentTree {
    pub root: Row,
}

impl DocumentTree {
    pub fn new(root: Row) -> Self {
        Self { root }
    }

    /// JSON string of the whole tree, stored in the `raw_entities` column.
    pub fn to_raw_entities(&self) -> String {
        self.root.to_raw().to_string()
    }
}

impl From<&FieldValue> for NormalizedValue {
    fn from(value: &FieldValue) -> Self {
        let mut nv = NormalizedValue {
            text: Some(value.to_text()),
            ..Default::default()
        };
        match value {
            FieldValue::Text(_) => {}
            FieldValue::Boolean(b) => nv.boolean_value = Some(*b),
            FieldValue::Integer(i) => nv.integer_value = Some(*i),
            FieldValue::Float(f) => nv.float_value = Some(*f),
            FieldValue::DateTime(dt) => {
                use chrono::{Datelike, Timelike};
                nv.datetime_value = Some(crate::document::DateTimeParts {
                    year: dt.year(),
                    month: dt.month(),
                    day: dt.day(),
                    hours: dt.hour(),
                    minutes: dt.minute(),
                    seconds: dt.second(),
                    nanos: dt.nanosecond(),
                });
            }
        }
        nv
    }
}
