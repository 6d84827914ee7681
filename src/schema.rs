//! Destination table schema, in the BigQuery schema JSON shape.
//!
//! ```json
//! [{"name": "invoice_id", "type": "STRING", "mode": "NULLABLE"},
//!  {"name": "line_item", "type": "RECORD", "mode": "REPEATED",
//!   "fields": [{"name": "amount", "type": "NUMERIC"}]}]
//! ```

use crate::error::Doc2TableError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Declared type of a destination column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnType {
    String,
    Boolean,
    Datetime,
    Integer,
    Numeric,
    Float,
    Decimal,
    Record,
    /// A type name this crate does not cast; values pass through as text.
    Other(String),
}

impl From<String> for ColumnType {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRING" => ColumnType::String,
            "BOOLEAN" | "BOOL" => ColumnType::Boolean,
            "DATETIME" => ColumnType::Datetime,
            "INTEGER" | "INT64" => ColumnType::Integer,
            "NUMERIC" | "BIGNUMERIC" => ColumnType::Numeric,
            "FLOAT" | "FLOAT64" => ColumnType::Float,
            "DECIMAL" | "BIGDECIMAL" => ColumnType::Decimal,
            "RECORD" | "STRUCT" => ColumnType::Record,
            other => ColumnType::Other(other.to_string()),
        }
    }
}

impl From<ColumnType> for String {
    fn from(t: ColumnType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "STRING",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Datetime => "DATETIME",
            ColumnType::Integer => "INTEGER",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Float => "FLOAT",
            ColumnType::Decimal => "DECIMAL",
            ColumnType::Record => "RECORD",
            ColumnType::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// Cardinality of a destination column.
///
/// BigQuery's `NULLABLE` and `REQUIRED` both read as [`ColumnMode::Scalar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnMode {
    #[default]
    Scalar,
    Repeated,
}

impl From<String> for ColumnMode {
    fn from(s: String) -> Self {
        if s.trim().eq_ignore_ascii_case("REPEATED") {
            ColumnMode::Repeated
        } else {
            ColumnMode::Scalar
        }
    }
}

impl From<ColumnMode> for String {
    fn from(m: ColumnMode) -> Self {
        match m {
            ColumnMode::Scalar => "NULLABLE".to_string(),
            ColumnMode::Repeated => "REPEATED".to_string(),
        }
    }
}

/// One destination column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub mode: ColumnMode,
    /// Child columns of a record; ordered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<SchemaColumn>,
}

impl SchemaColumn {
    pub fn scalar(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            mode: ColumnMode::Scalar,
            fields: Vec::new(),
        }
    }

    /// A repeated record column with the given children.
    pub fn repeated(name: impl Into<String>, fields: Vec<SchemaColumn>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Record,
            mode: ColumnMode::Repeated,
            fields,
        }
    }

    pub fn is_repeated(&self) -> bool {
        self.mode == ColumnMode::Repeated
    }
}

/// Find a column by exact name.
pub fn find_column<'a>(columns: &'a [SchemaColumn], name: &str) -> Option<&'a SchemaColumn> {
    columns.iter().find(|c| c.name == name)
}

/// Parse a schema from JSON: a bare column array or `{"fields": [...]}`.
pub fn schema_from_json(bytes: &[u8]) -> Result<Vec<SchemaColumn>, serde_json::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SchemaJson {
        Columns(Vec<SchemaColumn>),
        Wrapped { fields: Vec<SchemaColumn> },
    }

    Ok(match serde_json::from_slice::<SchemaJson>(bytes)? {
        SchemaJson::Columns(c) => c,
        SchemaJson::Wrapped { fields } => fields,
    })
}

/// Reject structurally invalid schemas before any mapping work.
///
/// Invalid: empty column names, duplicate names among siblings, and
/// `RECORD` columns without children.
pub fn validate_schema(columns: &[SchemaColumn]) -> Result<(), Doc2TableError> {
    validate_level(columns, "")
}

fn validate_level(columns: &[SchemaColumn], prefix: &str) -> Result<(), Doc2TableError> {
    let mut seen = HashSet::new();
    for col in columns {
        let path = format!("{prefix}{}", col.name);
        if col.name.trim().is_empty() {
            return Err(Doc2TableError::MalformedSchema {
                column: path,
                detail: "column name is empty".into(),
            });
        }
        if !seen.insert(col.name.as_str()) {
            return Err(Doc2TableError::MalformedSchema {
                column: path,
                detail: "duplicate column name".into(),
            });
        }
        if col.column_type == ColumnType::Record && col.fields.is_empty() {
            return Err(Doc2TableError::MalformedSchema {
                column: path,
                detail: "RECORD column has no child fields".into(),
            });
        }
        validate_level(&col.fields, &format!("{path}."))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bigquery_schema_json() {
        let json = br#"[
            {"name": "invoice_id", "type": "STRING", "mode": "NULLABLE"},
            {"name": "total", "type": "FLOAT64"},
            {"name": "line_item", "type": "RECORD", "mode": "REPEATED",
             "fields": [{"name": "amount", "type": "NUMERIC", "mode": "REQUIRED"}]}
        ]"#;
        let cols = schema_from_json(json).unwrap();
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[1].column_type, ColumnType::Float);
        assert_eq!(cols[1].mode, ColumnMode::Scalar);
        assert!(cols[2].is_repeated());
        assert_eq!(cols[2].fields[0].mode, ColumnMode::Scalar);
        validate_schema(&cols).unwrap();
    }

    #[test]
    fn parses_wrapped_schema() {
        let json = br#"{"fields": [{"name": "a", "type": "geography"}]}"#;
        let cols = schema_from_json(json).unwrap();
        assert_eq!(cols[0].column_type, ColumnType::Other("GEOGRAPHY".into()));
    }

    #[test]
    fn rejects_duplicate_sibling_names() {
        let cols = vec![
            SchemaColumn::scalar("a", ColumnType::String),
            SchemaColumn::scalar("a", ColumnType::Integer),
        ];
        let err = validate_schema(&cols).unwrap_err();
        assert!(matches!(err, Doc2TableError::MalformedSchema { ref column, .. } if column == "a"));
    }

    #[test]
    fn rejects_record_without_children() {
        let cols = vec![SchemaColumn::repeated("items", vec![])];
        assert!(validate_schema(&cols).is_err());
    }

    #[test]
    fn nested_errors_report_dotted_path() {
        let cols = vec![SchemaColumn::repeated(
            "items",
            vec![SchemaColumn::scalar(" ", ColumnType::String)],
        )];
        match validate_schema(&cols).unwrap_err() {
            Doc2TableError::MalformedSchema { column, .. } => assert_eq!(column, "items. "),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn type_names_round_trip() {
        for name in ["STRING", "BOOLEAN", "DATETIME", "INTEGER", "NUMERIC", "RECORD"] {
            assert_eq!(ColumnType::from(name.to_string()).to_string(), name);
        }
    }
}
