//! Per-document ingestion entry points.
//!
//! [`ingest`] resolves one input, maps it against the destination schema and
//! drives the insert protocol to a terminal outcome. Use
//! [`crate::stream::ingest_stream`] to ingest many inputs concurrently.

use crate::config::{IngestConfig, TreeSource};
use crate::document::ExtractedDocument;
use crate::error::{DiagnosticKind, Doc2TableError};
use crate::output::{IngestOutput, IngestStats, PreviewOutput};
use crate::pipeline::insert::InsertCoordinator;
use crate::pipeline::map::DocumentMapper;
use crate::pipeline::metadata::MetadataMapper;
use crate::pipeline::{input, parse};
use crate::schema::validate_schema;
use crate::store::TableStore;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Ingest one extracted document (path or URL) into the configured table.
///
/// # Returns
/// `Ok(IngestOutput)` whenever the insert protocol ran, even if the row was
/// degraded or rejected (check `output.outcome`, or call
/// [`IngestOutput::into_result`]).
///
/// # Errors
/// Returns `Err(Doc2TableError)` only for fatal errors:
/// - input not found, unreadable or not a valid document
/// - empty document
/// - table not found, malformed schema, store failure while reading it
/// - mapping diagnostics under the fail-fast rule (`PreconditionFailed`)
pub async fn ingest<S: TableStore + ?Sized>(
    input_str: impl AsRef<str>,
    store: &S,
    config: &IngestConfig,
) -> Result<IngestOutput, Doc2TableError> {
    let input_str = input_str.as_ref();
    info!("Starting ingestion: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let document = parse_document(&resolved.bytes, &resolved.source)?;
    run(&document, &resolved.source, &resolved.file_name, store, config).await
}

/// Ingest a document held in memory as JSON bytes.
///
/// `file_name` names the document in logs and seeds the `file_name` metadata column.
pub async fn ingest_from_bytes<S: TableStore + ?Sized>(
    bytes: &[u8],
    file_name: &str,
    store: &S,
    config: &IngestConfig,
) -> Result<IngestOutput, Doc2TableError> {
    let document = parse_document(bytes, file_name)?;
    run(&document, file_name, file_name, store, config).await
}

/// Ingest an already-parsed document.
pub async fn ingest_document<S: TableStore + ?Sized>(
    document: &ExtractedDocument,
    file_name: &str,
    store: &S,
    config: &IngestConfig,
) -> Result<IngestOutput, Doc2TableError> {
    run(document, file_name, file_name, store, config).await
}

/// Synchronous wrapper around [`ingest`].
///
/// Creates a temporary tokio runtime internally.
pub fn ingest_sync<S: TableStore + ?Sized>(
    input_str: impl AsRef<str>,
    store: &S,
    config: &IngestConfig,
) -> Result<IngestOutput, Doc2TableError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Doc2TableError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(ingest(input_str, store, config))
}

/// Map a document and return the row a full insert would send, without
/// inserting anything.
///
/// The fail-fast rule is not applied; mapping diagnostics are returned
/// alongside the row.
pub async fn preview<S: TableStore + ?Sized>(
    input_str: impl AsRef<str>,
    store: &S,
    config: &IngestConfig,
) -> Result<PreviewOutput, Doc2TableError> {
    let input_str = input_str.as_ref();
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let document = parse_document(&resolved.bytes, &resolved.source)?;
    let mut mapper = prepare(&document, &resolved.source, &resolved.file_name, store, config).await?;

    let row = mapper.to_output_row(&BTreeSet::new());
    Ok(PreviewOutput {
        source: resolved.source,
        table_id: config.table_id.clone(),
        row,
        diagnostics: mapper.into_diagnostics(),
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn parse_document(bytes: &[u8], source: &str) -> Result<ExtractedDocument, Doc2TableError> {
    ExtractedDocument::from_json(bytes).map_err(|e| Doc2TableError::InvalidDocument {
        source_name: source.to_string(),
        detail: e.to_string(),
    })
}

/// Validate the destination and map the document into a [`DocumentMapper`].
async fn prepare<S: TableStore + ?Sized>(
    document: &ExtractedDocument,
    source: &str,
    file_name: &str,
    store: &S,
    config: &IngestConfig,
) -> Result<DocumentMapper, Doc2TableError> {
    // ── Step 1: Reject empty documents ───────────────────────────────────
    if document.is_empty() {
        return Err(Doc2TableError::EmptyDocument {
            source_name: source.to_string(),
        });
    }

    // ── Step 2: Check the destination table ──────────────────────────────
    if !store.table_exists(&config.table_id).await? {
        return Err(Doc2TableError::TableNotFound {
            table_id: config.table_id.clone(),
        });
    }
    let schema = store.get_schema(&config.table_id).await?;
    validate_schema(&schema)?;
    debug!("Table '{}' has {} top-level columns", config.table_id, schema.len());

    // ── Step 3: Build the tree ───────────────────────────────────────────
    let (tree, parse_diagnostics) = match config.tree_source {
        TreeSource::Entities => parse::parse_entities(&document.entities),
        TreeSource::FormFields => parse::parse_form_fields(document),
    };

    // ── Step 4: Resolve metadata ─────────────────────────────────────────
    let mut metadata = MetadataMapper::new(&config.metadata_mapping);
    if let Some(operation_id) = &document.operation_id {
        metadata.set_default_if_unset("hitl_operation_id", operation_id.as_str());
    }
    metadata.set_default_if_unset("file_name", file_name);

    // ── Step 5: Map the row ──────────────────────────────────────────────
    Ok(DocumentMapper::new(
        tree,
        parse_diagnostics,
        &schema,
        &metadata,
        config,
    ))
}

async fn run<S: TableStore + ?Sized>(
    document: &ExtractedDocument,
    source: &str,
    file_name: &str,
    store: &S,
    config: &IngestConfig,
) -> Result<IngestOutput, Doc2TableError> {
    let start = Instant::now();
    let mut mapper = prepare(document, source, file_name, store, config).await?;

    // ── Fail-fast precondition ───────────────────────────────────────────
    if config.fails_fast() && !mapper.mapping_diagnostics().is_empty() {
        warn!(
            "{}: {} mapping diagnostic(s) with continue_on_error and error fields disabled",
            source,
            mapper.mapping_diagnostics().len()
        );
        return Err(Doc2TableError::PreconditionFailed {
            diagnostics: mapper.into_diagnostics(),
        });
    }

    let mapped_columns = mapper.mapped().len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_ingest_start(source, mapped_columns);
    }

    // ── Insert protocol ──────────────────────────────────────────────────
    let report = InsertCoordinator::new(store, &config.table_id)
        .source(source)
        .continue_on_error(config.continue_on_error)
        .retry_count(config.retry_count)
        .progress(config.progress_callback.as_ref())
        .run(&mut mapper)
        .await;

    let diagnostics = mapper.into_diagnostics();
    let excluded_columns = diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::ExcludedField)
        .map(|d| d.key.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    let stats = IngestStats {
        mapped_columns,
        insert_attempts: report.attempts.len(),
        excluded_columns,
        duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "Ingestion complete: {} -> {} ({}, {} attempt(s), {}ms)",
        source, config.table_id, report.outcome, stats.insert_attempts, stats.duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_ingest_complete(source, &report.outcome);
    }

    Ok(IngestOutput {
        source: source.to_string(),
        table_id: config.table_id.clone(),
        row: report.row,
        outcome: report.outcome,
        attempts: report.attempts,
        diagnostics,
        stats,
    })
}
