//! Configuration types for document ingestion.
//!
//! All ingestion behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. The config is a plain value: it is cloned into
//! every concurrent ingestion of a stream and never mutated by the pipeline.

use crate::error::Doc2TableError;
use crate::pipeline::metadata::MappingInfo;
use crate::progress::ProgressCallback;
use crate::store::TableRow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Configuration for ingesting extracted documents into one table.
///
/// Built via [`IngestConfig::builder()`] or using [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use doc2table::{IngestConfig, ParsingMethodology};
///
/// let config = IngestConfig::builder()
///     .table_id("invoices")
///     .continue_on_error(true)
///     .retry_count(2)
///     .parsing_methodology(ParsingMethodology::Normalized)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Destination table identifier. Required.
    pub table_id: String,

    /// Static columns added to every row; they override derived values.
    pub custom_fields: TableRow,

    /// Per-key metadata overrides. Keys not listed map to a column of the
    /// same name.
    pub metadata_mapping: BTreeMap<String, MappingInfo>,

    /// Add a `raw_entities` column holding the parsed tree as JSON. Default: false.
    pub include_raw_entities: bool,

    /// Add `has_errors` and `errors` columns describing every diagnostic. Default: false.
    ///
    /// Also lifts the fail-fast rule: with error columns enabled, mapping
    /// diagnostics are persisted instead of aborting the document.
    pub include_error_fields: bool,

    /// Retry rejected inserts without the offending columns, then fall back
    /// to a minimal row. Default: false.
    pub continue_on_error: bool,

    /// Degraded retries after a rejected full insert. Default: 1.
    pub retry_count: u32,

    /// How field values are read when casting. Default: [`ParsingMethodology::RawMention`].
    pub parsing_methodology: ParsingMethodology,

    /// Which part of the extracted document becomes the tree. Default: [`TreeSource::Entities`].
    pub tree_source: TreeSource,

    /// Documents ingested at once by [`crate::ingest_stream`]. Default: 4.
    pub concurrency: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            table_id: String::new(),
            custom_fields: TableRow::new(),
            metadata_mapping: BTreeMap::new(),
            include_raw_entities: false,
            include_error_fields: false,
            continue_on_error: false,
            retry_count: 1,
            parsing_methodology: ParsingMethodology::default(),
            tree_source: TreeSource::default(),
            concurrency: 4,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("table_id", &self.table_id)
            .field("custom_fields", &self.custom_fields)
            .field("metadata_mapping", &self.metadata_mapping)
            .field("include_raw_entities", &self.include_raw_entities)
            .field("include_error_fields", &self.include_error_fields)
            .field("continue_on_error", &self.continue_on_error)
            .field("retry_count", &self.retry_count)
            .field("parsing_methodology", &self.parsing_methodology)
            .field("tree_source", &self.tree_source)
            .field("concurrency", &self.concurrency)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn IngestProgressCallback>"),
            )
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }

    /// True when mapping diagnostics must abort the document before any insert.
    pub fn fails_fast(&self) -> bool {
        !self.continue_on_error && !self.include_error_fields
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn table_id(mut self, table_id: impl Into<String>) -> Self {
        self.config.table_id = table_id.into();
        self
    }

    pub fn custom_fields(mut self, fields: TableRow) -> Self {
        self.config.custom_fields = fields;
        self
    }

    pub fn custom_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.custom_fields.insert(name.into(), value.into());
        self
    }

    pub fn metadata_mapping(mut self, mapping: BTreeMap<String, MappingInfo>) -> Self {
        self.config.metadata_mapping = mapping;
        self
    }

    pub fn map_metadata(mut self, key: impl Into<String>, info: MappingInfo) -> Self {
        self.config.metadata_mapping.insert(key.into(), info);
        self
    }

    pub fn include_raw_entities(mut self, v: bool) -> Self {
        self.config.include_raw_entities = v;
        self
    }

    pub fn include_error_fields(mut self, v: bool) -> Self {
        self.config.include_error_fields = v;
        self
    }

    pub fn continue_on_error(mut self, v: bool) -> Self {
        self.config.continue_on_error = v;
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.config.retry_count = n;
        self
    }

    pub fn parsing_methodology(mut self, m: ParsingMethodology) -> Self {
        self.config.parsing_methodology = m;
        self
    }

    pub fn tree_source(mut self, source: TreeSource) -> Self {
        self.config.tree_source = source;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, Doc2TableError> {
        let c = &self.config;
        if c.table_id.trim().is_empty() {
            return Err(Doc2TableError::InvalidConfig(
                "table id must not be empty".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Doc2TableError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.tree_source == TreeSource::FormFields
            && c.parsing_methodology == ParsingMethodology::Normalized
        {
            return Err(Doc2TableError::InvalidConfig(
                "form fields carry no normalized values; use the raw mention methodology".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which reading of a field the caster uses.
///
/// | Methodology | Source | Typical use |
/// |-------------|--------|-------------|
/// | `RawMention` | mention text, trimmed and cleaned per type | custom extractors without normalisation |
/// | `Normalized` | the extractor's typed normalized value | pretrained processors (invoices, receipts) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingMethodology {
    #[default]
    #[serde(alias = "entities")]
    RawMention,
    #[serde(alias = "normalized_values")]
    Normalized,
}

impl FromStr for ParsingMethodology {
    type Err = Doc2TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "raw_mention" | "entities" | "raw" => Ok(ParsingMethodology::RawMention),
            "normalized" | "normalized_values" => Ok(ParsingMethodology::Normalized),
            other => Err(Doc2TableError::InvalidConfig(format!(
                "unknown parsing methodology '{other}' (expected entities or normalized-values)"
            ))),
        }
    }
}

impl fmt::Display for ParsingMethodology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParsingMethodology::RawMention => "RAW_MENTION",
            ParsingMethodology::Normalized => "NORMALIZED",
        })
    }
}

/// Which part of the extracted document the tree is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeSource {
    /// Typed entities, possibly nested. (default)
    #[default]
    Entities,
    /// Page-level form key/value pairs.
    FormFields,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = IngestConfig::default();
        assert_eq!(c.retry_count, 1);
        assert_eq!(c.parsing_methodology, ParsingMethodology::RawMention);
        assert!(!c.continue_on_error);
        assert!(c.fails_fast());
    }

    #[test]
    fn builder_requires_table_id() {
        assert!(matches!(
            IngestConfig::builder().build(),
            Err(Doc2TableError::InvalidConfig(_))
        ));
        let c = IngestConfig::builder()
            .table_id("invoices")
            .custom_field("source", "batch-1")
            .include_error_fields(true)
            .build()
            .unwrap();
        assert_eq!(c.custom_fields["source"], "batch-1");
        assert!(!c.fails_fast());
    }

    #[test]
    fn builder_rejects_zero_concurrency() {
        let r = IngestConfig::builder().table_id("t").concurrency(0).build();
        assert!(r.is_err());
    }

    #[test]
    fn builder_rejects_normalized_form_fields() {
        let r = IngestConfig::builder()
            .table_id("t")
            .tree_source(TreeSource::FormFields)
            .parsing_methodology(ParsingMethodology::Normalized)
            .build();
        assert!(matches!(r, Err(Doc2TableError::InvalidConfig(_))));
        let c = IngestConfig::builder()
            .table_id("t")
            .tree_source(TreeSource::FormFields)
            .build()
            .unwrap();
        assert_eq!(c.parsing_methodology, ParsingMethodology::RawMention);
    }

    #[test]
    fn methodology_parses_cli_spellings() {
        assert_eq!(
            "entities".parse::<ParsingMethodology>().unwrap(),
            ParsingMethodology::RawMention
        );
        assert_eq!(
            "normalized-values".parse::<ParsingMethodology>().unwrap(),
            ParsingMethodology::Normalized
        );
        assert!("form".parse::<ParsingMethodology>().is_err());
    }

    #[test]
    fn methodology_deserialises_aliases() {
        let m: ParsingMethodology = serde_json::from_str(r#""normalized_values""#).unwrap();
        assert_eq!(m, ParsingMethodology::Normalized);
    }
}
