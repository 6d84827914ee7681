//! Row validation against a table schema, modelled on BigQuery streaming
//! inserts: unknown columns and type mismatches are reported per column with
//! a location path, and `null` is always accepted.

use super::{InsertError, TableRow};
use crate::schema::{find_column, ColumnType, SchemaColumn};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

const INVALID: &str = "invalid";

/// Validate a row; an empty result means the row is acceptable.
pub fn validate_row(row: &TableRow, schema: &[SchemaColumn]) -> Vec<InsertError> {
    let mut errors = Vec::new();
    validate_object(row, schema, "", &mut errors);
    errors
}

fn validate_object(
    row: &TableRow,
    schema: &[SchemaColumn],
    prefix: &str,
    errors: &mut Vec<InsertError>,
) {
    for (name, value) in row {
        let location = format!("{prefix}{name}");
        let Some(column) = find_column(schema, name) else {
            errors.push(InsertError::new(
                &location,
                INVALID,
                format!("no such field: {location}."),
            ));
            continue;
        };
        if value.is_null() {
            continue;
        }
        if column.is_repeated() {
            let Value::Array(items) = value else {
                errors.push(InsertError::new(
                    &location,
                    INVALID,
                    "Array specified for non-repeated field or value is not an array.",
                ));
                continue;
            };
            for (i, item) in items.iter().enumerate() {
                validate_value(column, item, &format!("{location}[{i}]"), errors);
            }
        } else {
            validate_value(column, value, &location, errors);
        }
    }
}

fn validate_value(
    column: &SchemaColumn,
    value: &Value,
    location: &str,
    errors: &mut Vec<InsertError>,
) {
    if value.is_null() {
        return;
    }
    if column.column_type == ColumnType::Record {
        match value {
            Value::Object(obj) => validate_object(obj, &column.fields, &format!("{location}."), errors),
            _ => errors.push(InsertError::new(
                location,
                INVALID,
                "This field is not a record.",
            )),
        }
        return;
    }
    if !scalar_matches(&column.column_type, value) {
        errors.push(InsertError::new(
            location,
            INVALID,
            format!(
                "Cannot convert value to {}: {}",
                column.column_type.to_string().to_lowercase(),
                value
            ),
        ));
    }
}

fn scalar_matches(column_type: &ColumnType, value: &Value) -> bool {
    match (column_type, value) {
        (ColumnType::String, Value::String(_)) => true,
        (ColumnType::String, _) => false,
        (ColumnType::Boolean, Value::Bool(_)) => true,
        (ColumnType::Boolean, Value::String(s)) => {
            s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false")
        }
        (ColumnType::Boolean, _) => false,
        (ColumnType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
        (ColumnType::Integer, Value::String(s)) => s.trim().parse::<i64>().is_ok(),
        (ColumnType::Integer, _) => false,
        (ColumnType::Numeric | ColumnType::Float | ColumnType::Decimal, Value::Number(_)) => true,
        (ColumnType::Numeric | ColumnType::Float | ColumnType::Decimal, Value::String(s)) => {
            s.trim().parse::<f64>().map(f64::is_finite).unwrap_or(false)
        }
        (ColumnType::Numeric | ColumnType::Float | ColumnType::Decimal, _) => false,
        (ColumnType::Datetime, Value::String(s)) => is_datetime(s),
        (ColumnType::Datetime, _) => false,
        (ColumnType::Record, _) => false,
        (ColumnType::Other(_), _) => true,
    }
}

/// `YYYY-MM-DD[T| ]HH:MM:SS[.f]` or `YYYY-MM-DD`.
pub fn is_datetime(s: &str) -> bool {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Vec<SchemaColumn> {
        vec![
            SchemaColumn::scalar("invoice_id", ColumnType::String),
            SchemaColumn::scalar("total_amount", ColumnType::Numeric),
            SchemaColumn::scalar("invoice_date", ColumnType::Datetime),
            SchemaColumn::repeated(
                "line_item",
                vec![
                    SchemaColumn::scalar("description", ColumnType::String),
                    SchemaColumn::scalar("quantity", ColumnType::Integer),
                ],
            ),
        ]
    }

    fn row(v: Value) -> TableRow {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn accepts_well_typed_row() {
        let r = row(json!({
            "invoice_id": "INV-1",
            "total_amount": 12.5,
            "invoice_date": "2024-02-03",
            "line_item": [{"description": "pen", "quantity": 3}, {"quantity": "4"}]
        }));
        assert!(validate_row(&r, &schema()).is_empty());
    }

    #[test]
    fn reports_unknown_columns() {
        let errors = validate_row(&row(json!({"vendor": "Acme"})), &schema());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].location, "vendor");
        assert_eq!(errors[0].reason, "invalid");
        assert!(errors[0].message.contains("no such field"));
    }

    #[test]
    fn nested_errors_carry_element_paths() {
        let r = row(json!({"line_item": [{"quantity": 1}, {"quantity": "lots"}]}));
        let errors = validate_row(&r, &schema());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].location, "line_item[1].quantity");
    }

    #[test]
    fn type_mismatches_and_nulls() {
        let r = row(json!({
            "invoice_id": null,
            "total_amount": "twelve",
            "invoice_date": "03/02/2024"
        }));
        let mut locations: Vec<_> = validate_row(&r, &schema())
            .into_iter()
            .map(|e| e.location)
            .collect();
        locations.sort();
        assert_eq!(locations, ["invoice_date", "total_amount"]);
    }

    #[test]
    fn datetime_formats() {
        assert!(is_datetime("2024-01-02T03:04:05"));
        assert!(is_datetime("2024-01-02 03:04:05.123"));
        assert!(is_datetime("2024-01-02"));
        assert!(!is_datetime("Jan 2, 2024"));
    }
}
