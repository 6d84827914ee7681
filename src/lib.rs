//! # doc2table
//!
//! Map the entities of an extracted document onto a destination table schema
//! and insert the resulting row, degrading gracefully when the store rejects
//! columns.
//!
//! ## Pipeline Overview
//!
//! ```text
//! extracted document (JSON)
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Parse     entities (or form fields) → DocumentTree + diagnostics
//!  ├─ 3. Metadata  operational keys → (column, value) pairs
//!  ├─ 4. Map       tree + metadata → row, cast per column type
//!  ├─ 5. Insert    full → degraded retries → fallback
//!  └─ 6. Output    outcome, attempts, diagnostics, stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc2table::{ingest, IngestConfig, JsonlTableStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = JsonlTableStore::new("tables");
//!     let config = IngestConfig::builder()
//!         .table_id("invoices")
//!         .continue_on_error(true)
//!         .build()?;
//!     let output = ingest("invoice.json", &store, &config).await?;
//!     println!("{}: {} attempt(s)", output.outcome, output.stats.insert_attempts);
//!     for d in &output.diagnostics {
//!         eprintln!("{}: {} ({})", d.kind.as_str(), d.key, d.reason);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2table` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! doc2table = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod schema;
pub mod store;
pub mod stream;
pub mod tree;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder, ParsingMethodology, TreeSource};
pub use document::ExtractedDocument;
pub use error::{Diagnostic, DiagnosticKind, Doc2TableError, StoreError, PRECONDITION_EXIT_CODE};
pub use ingest::{ingest, ingest_document, ingest_from_bytes, ingest_sync, preview};
pub use output::{AttemptRecord, IngestOutcome, IngestOutput, IngestStats, InsertStage, PreviewOutput};
pub use pipeline::metadata::{MappingInfo, MetadataMapper};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schema::{ColumnMode, ColumnType, SchemaColumn};
pub use store::{InsertError, JsonlTableStore, MemoryTableStore, TableRow, TableStore};
pub use stream::{ingest_stream, IngestStream, StreamItem};
pub use tree::{DocumentTree, Field, FieldValue, Row};
