//! Document-level metadata columns.
//!
//! [`MetadataMapper`] holds one [`MappingInfo`] per metadata key. Callers
//! override any subset of the known keys; the rest map to a column of the same
//! name. The pipeline then seeds defaults it knows (file name, review
//! operation id) without clobbering caller values.

use crate::tree::FieldValue;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Metadata keys every mapper carries.
pub const KNOWN_METADATA_KEYS: [&str; 8] = [
    "file_name",
    "doc_status",
    "doc_type",
    "doc_event_id",
    "doc_group_id",
    "hitl_operation_id",
    "created_at",
    "updated_at",
];

/// Keys that resolve to the current time when no value is set.
const TIMESTAMP_KEYS: [&str; 2] = ["created_at", "updated_at"];

/// How one metadata key lands in the destination table.
///
/// Deserialises from `{"destination_column", "value", "skip"}` and from the
/// connector-style `{"bq_column_name", "metadata_value", "skip_map"}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MappingInfo {
    #[serde(alias = "bq_column_name")]
    pub destination_column: Option<String>,
    #[serde(alias = "metadata_value", deserialize_with = "json_field_value")]
    pub value: Option<FieldValue>,
    #[serde(alias = "skip_map", deserialize_with = "lenient_bool")]
    pub skip: bool,
}

impl MappingInfo {
    pub fn to_column(column: impl Into<String>) -> Self {
        Self {
            destination_column: Some(column.into()),
            ..Default::default()
        }
    }

    pub fn skipped() -> Self {
        Self {
            skip: true,
            ..Default::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<FieldValue>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// The resolved `(destination_column, value)` pairs for one document.
#[derive(Debug, Clone, Default)]
pub struct MetadataMapper {
    mappings: BTreeMap<String, MappingInfo>,
}

impl MetadataMapper {
    /// Caller overrides plus a default entry for every omitted known key.
    pub fn new(overrides: &BTreeMap<String, MappingInfo>) -> Self {
        let mut mappings = overrides.clone();
        for key in KNOWN_METADATA_KEYS {
            mappings.entry(key.to_string()).or_insert_with(|| {
                debug!("default metadata mapping for '{}'", key);
                MappingInfo::to_column(key)
            });
        }
        Self { mappings }
    }

    /// Set a value for `key` unless one is already set. Unknown keys are ignored.
    pub fn set_default_if_unset(&mut self, key: &str, value: impl Into<FieldValue>) {
        if let Some(info) = self.mappings.get_mut(key) {
            if info.value.is_none() {
                info.value = Some(value.into());
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&MappingInfo> {
        self.mappings.get(key)
    }

    /// Resolve with timestamps defaulting to the current UTC time.
    pub fn resolve(&self) -> Vec<(String, Option<FieldValue>)> {
        self.resolve_at(Utc::now().naive_utc())
    }

    /// Every non-skipped key as `(column, value)`, even when the value is `None`.
    pub fn resolve_at(&self, now: NaiveDateTime) -> Vec<(String, Option<FieldValue>)> {
        self.mappings
            .iter()
            .filter(|(_, info)| !info.skip)
            .map(|(key, info)| {
                let column = info.destination_column.clone().unwrap_or_else(|| key.clone());
                let value = info.value.clone().or_else(|| {
                    TIMESTAMP_KEYS
                        .contains(&key.as_str())
                        .then_some(FieldValue::DateTime(now))
                });
                (column, value)
            })
            .collect()
    }
}

fn json_field_value<'de, D: Deserializer<'de>>(d: D) -> Result<Option<FieldValue>, D::Error> {
    let raw = Option::<Value>::deserialize(d)?;
    Ok(raw.as_ref().and_then(FieldValue::from_json))
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Text(String),
    }

    match Option::<BoolOrString>::deserialize(d)? {
        None => Ok(false),
        Some(BoolOrString::Bool(b)) => Ok(b),
        Some(BoolOrString::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean for skip flag, got '{other}'"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn resolved(mapper: &MetadataMapper) -> BTreeMap<String, Option<FieldValue>> {
        mapper.resolve_at(now()).into_iter().collect()
    }

    #[test]
    fn omitted_keys_map_to_their_own_name() {
        let mapper = MetadataMapper::new(&BTreeMap::new());
        let out = resolved(&mapper);
        assert_eq!(out.len(), KNOWN_METADATA_KEYS.len());
        assert_eq!(out["doc_type"], None);
        assert_eq!(out["created_at"], Some(FieldValue::DateTime(now())));
    }

    #[test]
    fn overrides_rename_and_skip() {
        let mut overrides = BTreeMap::new();
        overrides.insert("file_name".to_string(), MappingInfo::to_column("source_uri"));
        overrides.insert("doc_status".to_string(), MappingInfo::skipped());
        let out = resolved(&MetadataMapper::new(&overrides));
        assert!(out.contains_key("source_uri"));
        assert!(!out.contains_key("file_name"));
        assert!(!out.contains_key("doc_status"));
    }

    #[test]
    fn first_default_wins() {
        let mut mapper = MetadataMapper::new(&BTreeMap::new());
        mapper.set_default_if_unset("doc_type", "invoice");
        mapper.set_default_if_unset("doc_type", "receipt");
        mapper.set_default_if_unset("not_a_key", "x");
        let out = resolved(&mapper);
        assert_eq!(out["doc_type"], Some(FieldValue::from("invoice")));
        assert!(!out.contains_key("not_a_key"));
    }

    #[test]
    fn caller_value_beats_default() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "doc_group_id".to_string(),
            MappingInfo::to_column("batch").with_value("b-7"),
        );
        let mut mapper = MetadataMapper::new(&overrides);
        mapper.set_default_if_unset("doc_group_id", "other");
        assert_eq!(resolved(&mapper)["batch"], Some(FieldValue::from("b-7")));
    }

    #[test]
    fn deserialises_connector_field_names() {
        let json = r#"{
            "file_name": {"bq_column_name": "uri", "skip_map": "false"},
            "doc_status": {"skip_map": true},
            "doc_event_id": {"metadata_value": 42}
        }"#;
        let overrides: BTreeMap<String, MappingInfo> = serde_json::from_str(json).unwrap();
        assert_eq!(overrides["file_name"].destination_column.as_deref(), Some("uri"));
        assert!(!overrides["file_name"].skip);
        assert!(overrides["doc_status"].skip);
        assert_eq!(overrides["doc_event_id"].value, Some(FieldValue::Integer(42)));

        // no destination column: the key name is used
        let out = resolved(&MetadataMapper::new(&overrides));
        assert_eq!(out["doc_event_id"], Some(FieldValue::Integer(42)));
    }

    #[test]
    fn rejects_garbage_skip_flag() {
        let json = r#"{"skip_map": "perhaps"}"#;
        assert!(serde_json::from_str::<MappingInfo>(json).is_err());
    }
}
