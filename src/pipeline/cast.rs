//! Schema-directed casting of one field to one destination column type.
//!
//! The caster is a table of pure functions keyed by
//! `(ParsingMethodology, ColumnType)`. [`dispatch`] picks the entry once per
//! column; [`cast_field`] applies it.
//!
//! | Type | Raw mention | Normalized |
//! |------|-------------|------------|
//! | STRING | trimmed text | `text` |
//! | BOOLEAN | `true/false/yes/no/1/0` | `booleanValue` |
//! | DATETIME | ISO-8601 if already a datetime, else text as-is | `datetimeValue` / `dateValue` |
//! | NUMERIC, FLOAT, DECIMAL | cleaned, parsed as float | float, integer or money |
//! | INTEGER | cleaned, parsed as integer, truncating | integer, truncated float or money units |
//! | RECORD, other | trimmed text | `text` |

use crate::config::ParsingMethodology;
use crate::schema::ColumnType;
use crate::tree::{Field, FieldValue};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use thiserror::Error;

/// ISO-8601 rendering used for datetime values (fraction only when non-zero).
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Currency symbols, thousands separators and whitespace.
static RE_NUMBER_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{Sc},\s]").unwrap());

/// Why a value could not be cast.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CastError {
    #[error("could not convert string to float: '{0}'")]
    InvalidNumber(String),

    #[error("invalid literal for integer: '{0}'")]
    InvalidInteger(String),

    #[error("not a boolean token: '{0}'")]
    InvalidBoolean(String),

    #[error("value {0} is not finite")]
    NonFinite(f64),

    #[error("normalized value has no {0} reading")]
    MissingNormalized(&'static str),
}

/// One entry of the dispatch table.
pub type CastFn = fn(&Field) -> Result<Option<Value>, CastError>;

/// Select the cast function for a methodology and column type.
pub fn dispatch(methodology: ParsingMethodology, column_type: &ColumnType) -> CastFn {
    use ColumnType as T;
    use ParsingMethodology as M;
    match (methodology, column_type) {
        (M::RawMention, T::String) => raw_string,
        (M::RawMention, T::Boolean) => raw_boolean,
        (M::RawMention, T::Datetime) => raw_datetime,
        (M::RawMention, T::Numeric | T::Float | T::Decimal) => raw_float,
        (M::RawMention, T::Integer) => raw_integer,
        (M::RawMention, T::Record | T::Other(_)) => raw_string,
        (M::Normalized, T::String) => normalized_string,
        (M::Normalized, T::Boolean) => normalized_boolean,
        (M::Normalized, T::Datetime) => normalized_datetime,
        (M::Normalized, T::Numeric | T::Float | T::Decimal) => normalized_float,
        (M::Normalized, T::Integer) => normalized_integer,
        (M::Normalized, T::Record | T::Other(_)) => normalized_string,
    }
}

/// Cast a field for a column. `Ok(None)` means there is nothing to write.
pub fn cast_field(
    field: &Field,
    column_type: &ColumnType,
    methodology: ParsingMethodology,
) -> Result<Option<Value>, CastError> {
    dispatch(methodology, column_type)(field)
}

/// Strip currency symbols, thousands separators and whitespace.
pub fn clean_number(raw: &str) -> String {
    RE_NUMBER_NOISE.replace_all(raw, "").into_owned()
}

/// Parse a common truthy/falsy token, case-insensitively.
pub fn parse_bool_token(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn float_value(f: f64) -> Result<Value, CastError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or(CastError::NonFinite(f))
}

fn parse_float(raw: &str) -> Result<f64, CastError> {
    let cleaned = clean_number(raw);
    cleaned
        .parse::<f64>()
        .map_err(|_| CastError::InvalidNumber(raw.to_string()))
        .and_then(|f| if f.is_finite() { Ok(f) } else { Err(CastError::NonFinite(f)) })
}

fn parse_integer(raw: &str) -> Result<i64, CastError> {
    let cleaned = clean_number(raw);
    if let Ok(i) = cleaned.parse::<i64>() {
        return Ok(i);
    }
    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Ok(f.trunc() as i64),
        _ => Err(CastError::InvalidInteger(raw.to_string())),
    }
}

// ── Raw mention ──────────────────────────────────────────────────────────

fn raw_string(field: &Field) -> Result<Option<Value>, CastError> {
    Ok(field
        .value
        .as_ref()
        .map(|v| Value::String(v.to_text().trim().to_string())))
}

fn raw_boolean(field: &Field) -> Result<Option<Value>, CastError> {
    let Some(value) = &field.value else {
        return Ok(None);
    };
    let b = match value {
        FieldValue::Boolean(b) => *b,
        other => {
            let text = other.to_text();
            parse_bool_token(&text).ok_or(CastError::InvalidBoolean(text))?
        }
    };
    Ok(Some(Value::Bool(b)))
}

fn raw_datetime(field: &Field) -> Result<Option<Value>, CastError> {
    Ok(field.value.as_ref().map(|v| match v {
        FieldValue::DateTime(dt) => Value::String(dt.format(DATETIME_FORMAT).to_string()),
        other => Value::String(other.to_text().trim().to_string()),
    }))
}

fn raw_float(field: &Field) -> Result<Option<Value>, CastError> {
    let Some(value) = &field.value else {
        return Ok(None);
    };
    let f = match value {
        FieldValue::Float(f) => *f,
        FieldValue::Integer(i) => *i as f64,
        other => parse_float(&other.to_text())?,
    };
    float_value(f).map(Some)
}

fn raw_integer(field: &Field) -> Result<Option<Value>, CastError> {
    let Some(value) = &field.value else {
        return Ok(None);
    };
    let i = match value {
        FieldValue::Integer(i) => *i,
        other => parse_integer(&other.to_text())?,
    };
    Ok(Some(Value::from(i)))
}

// ── Normalized ───────────────────────────────────────────────────────────

fn normalized_string(field: &Field) -> Result<Option<Value>, CastError> {
    let Some(nv) = &field.normalized_value else {
        return Ok(None);
    };
    nv.text
        .clone()
        .map(|t| Some(Value::String(t)))
        .ok_or(CastError::MissingNormalized("text"))
}

fn normalized_boolean(field: &Field) -> Result<Option<Value>, CastError> {
    let Some(nv) = &field.normalized_value else {
        return Ok(None);
    };
    nv.as_bool()
        .map(|b| Some(Value::Bool(b)))
        .ok_or(CastError::MissingNormalized("boolean"))
}

fn normalized_datetime(field: &Field) -> Result<Option<Value>, CastError> {
    let Some(nv) = &field.normalized_value else {
        return Ok(None);
    };
    nv.as_datetime()
        .map(|dt| Some(Value::String(dt.format(DATETIME_FORMAT).to_string())))
        .ok_or(CastError::MissingNormalized("datetime"))
}

fn normalized_float(field: &Field) -> Result<Option<Value>, CastError> {
    let Some(nv) = &field.normalized_value else {
        return Ok(None);
    };
    let f = nv.as_float().ok_or(CastError::MissingNormalized("numeric"))?;
    float_value(f).map(Some)
}

fn normalized_integer(field: &Field) -> Result<Option<Value>, CastError> {
    let Some(nv) = &field.normalized_value else {
        return Ok(None);
    };
    nv.as_integer()
        .map(|i| Some(Value::from(i)))
        .ok_or(CastError::MissingNormalized("integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Money, NormalizedValue};
    use chrono::NaiveDate;
    use serde_json::json;

    fn raw(text: &str) -> Field {
        Field::new("f", Some(FieldValue::Text(text.to_string())))
    }

    fn raw_cast(text: &str, ty: ColumnType) -> Result<Option<Value>, CastError> {
        cast_field(&raw(text), &ty, ParsingMethodology::RawMention)
    }

    #[test]
    fn string_is_trimmed() {
        assert_eq!(
            raw_cast(" Acme Corp ", ColumnType::String).unwrap(),
            Some(json!("Acme Corp"))
        );
    }

    #[test]
    fn integer_strips_currency_and_separators() {
        assert_eq!(raw_cast("$1,234", ColumnType::Integer).unwrap(), Some(json!(1234)));
        assert_eq!(raw_cast("€ 12,5", ColumnType::Integer).unwrap(), Some(json!(125)));
    }

    #[test]
    fn integer_truncates_fractions() {
        assert_eq!(raw_cast("1,234.99", ColumnType::Integer).unwrap(), Some(json!(1234)));
        assert_eq!(raw_cast("-7.9", ColumnType::Integer).unwrap(), Some(json!(-7)));
    }

    #[test]
    fn integer_rejects_text() {
        let err = raw_cast("abc", ColumnType::Integer).unwrap_err();
        assert_eq!(err, CastError::InvalidInteger("abc".into()));
    }

    #[test]
    fn numeric_parses_float() {
        assert_eq!(raw_cast("$1,234.50", ColumnType::Numeric).unwrap(), Some(json!(1234.5)));
        assert!(matches!(
            raw_cast("n/a", ColumnType::Float),
            Err(CastError::InvalidNumber(_))
        ));
        assert!(matches!(
            raw_cast("inf", ColumnType::Decimal),
            Err(CastError::NonFinite(_))
        ));
    }

    #[test]
    fn boolean_tokens() {
        for (token, expected) in [("Yes", true), ("0", false), ("TRUE", true), ("no", false)] {
            assert_eq!(
                raw_cast(token, ColumnType::Boolean).unwrap(),
                Some(json!(expected)),
                "token {token}"
            );
        }
        assert!(raw_cast("maybe", ColumnType::Boolean).is_err());
    }

    #[test]
    fn datetime_text_passes_through() {
        assert_eq!(
            raw_cast("March 3rd", ColumnType::Datetime).unwrap(),
            Some(json!("March 3rd"))
        );
    }

    #[test]
    fn datetime_instance_becomes_iso() {
        let dt = NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_milli_opt(3, 4, 5, 600)
            .unwrap();
        let f = Field::new("created_at", Some(FieldValue::DateTime(dt)));
        let v = cast_field(&f, &ColumnType::Datetime, ParsingMethodology::RawMention).unwrap();
        assert_eq!(v, Some(json!("2023-01-02T03:04:05.600")));
    }

    #[test]
    fn missing_value_is_not_an_error() {
        let f = Field::new("f", None);
        for ty in [ColumnType::Integer, ColumnType::Boolean, ColumnType::String] {
            assert_eq!(cast_field(&f, &ty, ParsingMethodology::RawMention).unwrap(), None);
            assert_eq!(cast_field(&f, &ty, ParsingMethodology::Normalized).unwrap(), None);
        }
    }

    #[test]
    fn normalized_money_reads_as_number() {
        let mut f = raw("$10.25");
        f.normalized_value = Some(NormalizedValue {
            text: Some("10.25 USD".into()),
            money_value: Some(Money {
                currency_code: "USD".into(),
                units: 10,
                nanos: 250_000_000,
            }),
            ..Default::default()
        });
        let m = ParsingMethodology::Normalized;
        assert_eq!(cast_field(&f, &ColumnType::Numeric, m).unwrap(), Some(json!(10.25)));
        assert_eq!(cast_field(&f, &ColumnType::Integer, m).unwrap(), Some(json!(10)));
        assert_eq!(cast_field(&f, &ColumnType::String, m).unwrap(), Some(json!("10.25 USD")));
        assert_eq!(
            cast_field(&f, &ColumnType::Boolean, m).unwrap_err(),
            CastError::MissingNormalized("boolean")
        );
    }

    #[test]
    fn unknown_types_pass_text() {
        assert_eq!(
            raw_cast(" POINT(1 2) ", ColumnType::Other("GEOGRAPHY".into())).unwrap(),
            Some(json!("POINT(1 2)"))
        );
    }
}
