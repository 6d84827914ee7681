//! Error types for the doc2table library.
//!
//! Two distinct error shapes reflect two distinct failure modes:
//!
//! * [`Doc2TableError`] (**fatal**): the document cannot be ingested at all
//!   (input unreadable, destination table missing, schema malformed, the
//!   fail-fast precondition tripped). Returned as `Err(Doc2TableError)` from
//!   the top-level `ingest*` functions; no insert is attempted.
//!
//! * [`Diagnostic`] (**non-fatal**): one field could not be carried into the
//!   row (duplicate entity, failed cast, column rejected by the store). These
//!   accumulate for the whole document and travel inside
//!   [`crate::output::IngestOutput`] so callers can alert even when a
//!   (possibly degraded) row was persisted.
//!
//! [`StoreError`] is the failure type of the [`crate::store::TableStore`]
//! collaborator itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Exit status used when the fail-fast precondition rejects a document.
pub const PRECONDITION_EXIT_CODE: i32 = 100;

/// All fatal errors returned by the doc2table library.
///
/// Field-level failures use [`Diagnostic`] and are carried in
/// [`crate::output::IngestOutput`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Doc2TableError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The input was read but is not an extracted-document JSON payload.
    #[error("'{source_name}' is not a valid extracted document: {detail}")]
    InvalidDocument { source_name: String, detail: String },

    /// The extracted document carries no entities, pages or text.
    #[error("Extracted document '{source_name}' is empty")]
    EmptyDocument { source_name: String },

    // ── Destination errors ────────────────────────────────────────────────
    /// The destination table does not exist. Checked before any mapping.
    #[error("Destination table '{table_id}' not found")]
    TableNotFound { table_id: String },

    /// A destination schema column is structurally invalid.
    #[error("Malformed schema column '{column}': {detail}")]
    MalformedSchema { column: String, detail: String },

    /// Mapping produced diagnostics while neither `continue_on_error` nor
    /// `include_error_fields` is set, so no insert is attempted.
    #[error("{} mapping error(s) and continue_on_error is off; nothing was inserted", .diagnostics.len())]
    PreconditionFailed { diagnostics: Vec<Diagnostic> },

    /// The store itself failed while checking the table or reading its schema.
    #[error("Table store error: {0}")]
    Store(#[from] StoreError),

    /// A row was attempted but not persisted in full.
    ///
    /// Returned by [`crate::output::IngestOutput::into_result`] when the
    /// caller wants to treat any degradation as an error.
    #[error("Row for '{table_id}' was not fully inserted (outcome: {outcome})")]
    IncompleteInsert { table_id: String, outcome: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Doc2TableError {
    /// Process exit status a CLI should report for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Doc2TableError::PreconditionFailed { .. } => PRECONDITION_EXIT_CODE,
            _ => 1,
        }
    }
}

/// Failure of a [`crate::store::TableStore`] call.
///
/// Insert rejections are *not* errors: stores report them as a list of
/// [`crate::store::InsertError`] so the coordinator can degrade the row.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("table '{0}' does not exist")]
    UnknownTable(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Category of a non-fatal [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticKind {
    /// A second flat entity with an already-seen name at the same level.
    DuplicateField,
    /// A column dropped from the row before an insert attempt.
    ExcludedField,
    /// A field value could not be cast to its destination column type.
    ConversionFailure,
    /// The store rejected a column during an insert attempt.
    InsertRejected,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::DuplicateField => "DUPLICATE_FIELD",
            DiagnosticKind::ExcludedField => "EXCLUDED_FIELD",
            DiagnosticKind::ConversionFailure => "CONVERSION_FAILURE",
            DiagnosticKind::InsertRejected => "INSERT_REJECTED",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal problem with one field of one document.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind} on '{key}': {reason}")]
pub struct Diagnostic {
    /// Field or column name the diagnostic refers to.
    pub key: String,
    /// The offending value, when one exists.
    pub value: Option<Value>,
    /// Short machine-oriented reason.
    pub reason: String,
    /// Longer human-readable detail.
    pub message: Option<String>,
    pub kind: DiagnosticKind,
    /// Extractor entity id, for diagnostics raised while parsing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            reason: reason.into(),
            message: None,
            kind,
            entity_id: None,
        }
    }

    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_entity_id(mut self, id: Option<String>) -> Self {
        self.entity_id = id;
        self
    }

    /// The record written into the `errors` column of an output row.
    ///
    /// Values are flattened to strings so the column can be a plain
    /// `STRING` field regardless of the offending value's shape.
    pub fn to_record(&self) -> Value {
        let value = match &self.value {
            None | Some(Value::Null) => Value::Null,
            Some(Value::String(s)) => Value::String(s.clone()),
            Some(other) => Value::String(other.to_string()),
        };
        serde_json::json!({
            "type": self.kind.as_str(),
            "field": self.key,
            "value": value,
            "error": self.reason,
            "message": self.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn precondition_display_counts_diagnostics() {
        let e = Doc2TableError::PreconditionFailed {
            diagnostics: vec![
                Diagnostic::new(DiagnosticKind::ConversionFailure, "a", "bad"),
                Diagnostic::new(DiagnosticKind::DuplicateField, "b", "dup"),
            ],
        };
        assert!(e.to_string().starts_with("2 mapping error(s)"), "got: {e}");
        assert_eq!(e.exit_code(), PRECONDITION_EXIT_CODE);
    }

    #[test]
    fn table_not_found_display() {
        let e = Doc2TableError::TableNotFound {
            table_id: "invoices".into(),
        };
        assert!(e.to_string().contains("invoices"));
        assert_eq!(e.exit_code(), 1);
    }

    #[test]
    fn store_error_converts() {
        let e: Doc2TableError = StoreError::Unavailable("quota".into()).into();
        assert!(e.to_string().contains("quota"));
    }

    #[test]
    fn diagnostic_record_stringifies_structured_values() {
        let d = Diagnostic::new(DiagnosticKind::InsertRejected, "line_item", "invalid")
            .with_value(Some(json!([{"amount": 3}])))
            .with_message("no such field");
        let rec = d.to_record();
        assert_eq!(rec["type"], "INSERT_REJECTED");
        assert_eq!(rec["field"], "line_item");
        assert_eq!(rec["value"], r#"[{"amount":3}]"#);
        assert_eq!(rec["message"], "no such field");
    }

    #[test]
    fn diagnostic_display_names_kind_and_key() {
        let d = Diagnostic::new(DiagnosticKind::ConversionFailure, "total", "casting to INTEGER");
        assert_eq!(d.to_string(), "CONVERSION_FAILURE on 'total': casting to INTEGER");
    }
}
