//! Result types returned by the ingestion entry points.

use crate::error::{Diagnostic, DiagnosticKind, Doc2TableError};
use crate::store::{InsertError, TableRow};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which step of the insert protocol an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "stage")]
pub enum InsertStage {
    /// The row with every mapped column.
    Full,
    /// A retry without the columns rejected so far; `retry` is 1-based.
    Degraded { retry: u32 },
    /// Custom fields and diagnostic columns only.
    Fallback,
}

impl fmt::Display for InsertStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertStage::Full => f.write_str("full insert"),
            InsertStage::Degraded { retry } => write!(f, "degraded retry {retry}"),
            InsertStage::Fallback => f.write_str("fallback insert"),
        }
    }
}

/// Terminal state of one document's insert protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum IngestOutcome {
    /// The full row was stored.
    Success,
    /// A row without some rejected columns was stored.
    Degraded,
    /// The fallback row was attempted; `accepted` says whether it was stored.
    Minimal { accepted: bool },
    /// Retries ran out and the fallback row would have been empty.
    NothingToInsert,
    /// The full row was rejected and `continue_on_error` is off.
    Rejected,
}

impl IngestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, IngestOutcome::Success)
    }

    /// True when some row reached the table.
    pub fn persisted(&self) -> bool {
        matches!(
            self,
            IngestOutcome::Success
                | IngestOutcome::Degraded
                | IngestOutcome::Minimal { accepted: true }
        )
    }
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestOutcome::Success => f.write_str("success"),
            IngestOutcome::Degraded => f.write_str("degraded"),
            IngestOutcome::Minimal { accepted: true } => f.write_str("minimal"),
            IngestOutcome::Minimal { accepted: false } => f.write_str("minimal (rejected)"),
            IngestOutcome::NothingToInsert => f.write_str("nothing to insert"),
            IngestOutcome::Rejected => f.write_str("rejected"),
        }
    }
}

/// One call to [`crate::store::TableStore::insert_row`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub stage: InsertStage,
    pub row: TableRow,
    /// Columns the store refused.
    pub rejected: Vec<InsertError>,
    /// Set when the store itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

impl AttemptRecord {
    pub fn accepted(&self) -> bool {
        self.store_error.is_none() && self.rejected.is_empty()
    }
}

/// Counters for one ingested document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Columns produced by mapping the tree and metadata.
    pub mapped_columns: usize,
    /// Calls made to the store's `insert_row`.
    pub insert_attempts: usize,
    /// Distinct columns dropped from the row before or during inserts.
    pub excluded_columns: usize,
    pub duration_ms: u64,
}

/// Everything known about one ingested document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutput {
    /// Input name of the document (file name or URL).
    pub source: String,
    pub table_id: String,
    /// The last row sent to the store; empty when nothing was attempted.
    pub row: TableRow,
    pub outcome: IngestOutcome,
    pub attempts: Vec<AttemptRecord>,
    /// All diagnostics for the document, in the order they were raised.
    pub diagnostics: Vec<Diagnostic>,
    pub stats: IngestStats,
}

impl IngestOutput {
    /// Diagnostics of one kind.
    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    /// Treat anything but a full success as an error.
    pub fn into_result(self) -> Result<Self, Doc2TableError> {
        if self.outcome.is_success() {
            Ok(self)
        } else {
            Err(Doc2TableError::IncompleteInsert {
                table_id: self.table_id,
                outcome: self.outcome.to_string(),
            })
        }
    }
}

/// A mapped row that was never sent to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewOutput {
    pub source: String,
    pub table_id: String,
    /// The row a full insert would send.
    pub row: TableRow,
    /// Diagnostics raised while parsing and mapping.
    pub diagnostics: Vec<Diagnostic>,
}
