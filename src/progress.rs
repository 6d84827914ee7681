//! Progress-callback trait for per-document ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to receive events
//! as each document moves through its insert attempts.
//!
//! # Example
//!
//! ```rust
//! use doc2table::{IngestConfig, IngestOutcome, IngestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     rejected: AtomicUsize,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_ingest_complete(&self, source: &str, outcome: &IngestOutcome) {
//!         if !outcome.is_success() {
//!             self.rejected.fetch_add(1, Ordering::SeqCst);
//!             eprintln!("{source}: {outcome}");
//!         }
//!     }
//! }
//!
//! let config = IngestConfig::builder()
//!     .table_id("invoices")
//!     .progress_callback(Arc::new(CountingCallback { rejected: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{IngestOutcome, InsertStage};
use std::sync::Arc;

/// Called by the pipeline as it ingests each document.
///
/// Implementations must be `Send + Sync`: [`crate::ingest_stream`] ingests
/// several documents concurrently, so events for different documents may
/// interleave. All methods have default no-op implementations.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once the document is parsed and mapped, before any insert.
    ///
    /// # Arguments
    /// * `source` : input name of the document
    /// * `columns`: number of mapped columns
    fn on_ingest_start(&self, source: &str, columns: usize) {
        let _ = (source, columns);
    }

    /// Called just before a row is sent to the store.
    ///
    /// # Arguments
    /// * `source` : input name of the document
    /// * `stage`  : full, degraded or fallback insert
    /// * `attempt`: 1-based attempt number for this document
    fn on_attempt_start(&self, source: &str, stage: InsertStage, attempt: u32) {
        let _ = (source, stage, attempt);
    }

    /// Called when the store answered an insert.
    ///
    /// # Arguments
    /// * `rejected`: number of columns the store refused (0 = accepted)
    fn on_attempt_complete(&self, source: &str, stage: InsertStage, rejected: usize) {
        let _ = (source, stage, rejected);
    }

    /// Called when the store itself failed during an insert.
    fn on_attempt_error(&self, source: &str, stage: InsertStage, error: &str) {
        let _ = (source, stage, error);
    }

    /// Called once with the final outcome of the document.
    fn on_ingest_complete(&self, source: &str, outcome: &IngestOutcome) {
        let _ = (source, outcome);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
