//! CLI binary for doc2table.
//!
//! A thin shim over the library crate that maps CLI flags to `IngestConfig`,
//! ingests every input into a `JsonlTableStore` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use doc2table::{
    ingest_stream, preview, Doc2TableError, IngestConfig, IngestOutcome, IngestProgressCallback,
    InsertStage, JsonlTableStore, MappingInfo, ParsingMethodology, ProgressCallback, TableRow,
    TableStore, TreeSource,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders one bar over all inputs plus a log line per finished document.
/// Documents complete out of order when ingested concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    degraded: AtomicUsize,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Ingesting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            degraded: AtomicUsize::new(0),
        })
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_attempt_start(&self, source: &str, stage: InsertStage, _attempt: u32) {
        self.bar.set_message(format!("{source}: {stage}"));
    }

    fn on_attempt_complete(&self, source: &str, stage: InsertStage, rejected: usize) {
        if rejected > 0 {
            self.bar.println(format!(
                "  {} {}  {} rejected {} column(s)",
                yellow("!"),
                source,
                stage,
                rejected
            ));
        }
    }

    fn on_attempt_error(&self, source: &str, stage: InsertStage, error: &str) {
        self.bar
            .println(format!("  {} {}  {} failed: {}", red("✗"), source, stage, red(error)));
    }

    fn on_ingest_complete(&self, source: &str, outcome: &IngestOutcome) {
        let mark = match outcome {
            IngestOutcome::Success => green("✓"),
            IngestOutcome::Degraded | IngestOutcome::Minimal { accepted: true } => {
                self.degraded.fetch_add(1, Ordering::SeqCst);
                yellow("⚠")
            }
            _ => red("✗"),
        };
        self.bar
            .println(format!("  {} {:<40}  {}", mark, source, dim(&outcome.to_string())));
        self.bar.inc(1);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Ingest one extracted document into tables/invoices.jsonl
  doc2table --table invoices --store-dir tables invoice.json

  # Many documents, keep going on rejected columns, persist diagnostics
  doc2table --table invoices --continue-on-error --include-error-fields out/*.json

  # Read typed normalized values instead of raw mention text
  doc2table --table invoices --parsing-methodology normalized-values invoice.json

  # Show the mapped row without inserting
  doc2table --table invoices --dry-run invoice.json

  # Static columns and metadata overrides
  doc2table --table invoices \
    --custom-fields '{"batch": "2024-05"}' \
    --metadata-mapping '{"doc_type": {"value": "invoice"}, "doc_status": {"skip": true}}' \
    invoice.json

STORE LAYOUT:
  <store-dir>/<table>.schema.json   BigQuery-style schema (array of fields)
  <store-dir>/<table>.jsonl         accepted rows, one JSON object per line

EXIT STATUS:
  0    every document reached a terminal outcome
  1    a document failed with a fatal error
  100  mapping diagnostics with --continue-on-error and --include-error-fields off
"#;

/// Map extracted documents onto a table schema and insert them.
#[derive(Parser, Debug)]
#[command(
    name = "doc2table",
    version,
    about = "Map extracted document entities onto a table schema and insert them",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Extracted-document JSON files or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Destination table id.
    #[arg(short, long, env = "DOC2TABLE_TABLE")]
    table: String,

    /// Directory holding `<table>.schema.json` and `<table>.jsonl`.
    #[arg(long, env = "DOC2TABLE_STORE_DIR", default_value = ".")]
    store_dir: PathBuf,

    /// JSON object of static columns added to every row.
    #[arg(long, env = "DOC2TABLE_CUSTOM_FIELDS")]
    custom_fields: Option<String>,

    /// JSON object of metadata overrides, keyed by metadata key.
    #[arg(long, env = "DOC2TABLE_METADATA_MAPPING")]
    metadata_mapping: Option<String>,

    /// Add a `raw_entities` column holding the parsed tree.
    #[arg(long, env = "DOC2TABLE_INCLUDE_RAW_ENTITIES")]
    include_raw_entities: bool,

    /// Add `has_errors` and `errors` columns.
    #[arg(long, env = "DOC2TABLE_INCLUDE_ERROR_FIELDS")]
    include_error_fields: bool,

    /// Retry without rejected columns, then fall back to a minimal row.
    #[arg(long, env = "DOC2TABLE_CONTINUE_ON_ERROR")]
    continue_on_error: bool,

    /// Degraded retries after a rejected full insert.
    #[arg(long, env = "DOC2TABLE_RETRY_COUNT", default_value_t = 1)]
    retry_count: u32,

    /// Value source: entities (raw mention text) or normalized-values.
    #[arg(long, env = "DOC2TABLE_PARSING_METHODOLOGY", default_value = "entities")]
    parsing_methodology: String,

    /// Build the tree from page form fields instead of entities.
    #[arg(long, env = "DOC2TABLE_FORM_FIELDS")]
    form_fields: bool,

    /// Documents ingested at once.
    #[arg(short, long, env = "DOC2TABLE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOC2TABLE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Map and print rows without inserting.
    #[arg(long)]
    dry_run: bool,

    /// Print one JSON result per document on stdout.
    #[arg(long, env = "DOC2TABLE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2TABLE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2TABLE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2TABLE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {e:#}", red("error:"));
            ExitCode::from(exit_code_of(&e))
        }
    }
}

fn exit_code_of(e: &anyhow::Error) -> u8 {
    e.downcast_ref::<Doc2TableError>()
        .map(|e| e.exit_code())
        .unwrap_or(1)
        .clamp(0, 255) as u8
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.dry_run;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(|| CliProgressCallback::new(cli.inputs.len()));
    let config = build_config(
        &cli,
        progress.clone().map(|cb| cb as Arc<dyn IngestProgressCallback>),
    )?;
    let store = Arc::new(JsonlTableStore::new(&cli.store_dir));

    // ── Dry run ──────────────────────────────────────────────────────────
    if cli.dry_run {
        for input in &cli.inputs {
            let out = preview(input, store.as_ref(), &config)
                .await
                .with_context(|| format!("Failed to map {input}"))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&out).context("Failed to serialise preview")?
            );
        }
        return Ok(0);
    }

    // ── Ingest ───────────────────────────────────────────────────────────
    let dyn_store: Arc<dyn TableStore> = store;
    let mut results = ingest_stream(cli.inputs.clone(), dyn_store, &config);

    let mut first_failure: Option<u8> = None;
    let mut succeeded = 0usize;
    let mut total = 0usize;

    while let Some((source, result)) = results.next().await {
        total += 1;
        match result {
            Ok(output) => {
                if output.outcome.is_success() {
                    succeeded += 1;
                }
                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&output).context("Failed to serialise output")?
                    );
                } else if !cli.quiet && !show_progress {
                    eprintln!(
                        "{}: {} ({} attempt(s), {} diagnostic(s), {}ms)",
                        source,
                        output.outcome,
                        output.stats.insert_attempts,
                        output.diagnostics.len(),
                        output.stats.duration_ms
                    );
                }
            }
            Err(e) => {
                let code = e.exit_code().clamp(0, 255) as u8;
                first_failure.get_or_insert(code);
                if let Some(ref cb) = progress {
                    cb.bar.inc(1);
                    cb.bar.println(format!("  {} {}  {}", red("✗"), source, red(&e.to_string())));
                } else {
                    eprintln!("{} {}: {}", red("error:"), source, e);
                }
                if let Doc2TableError::PreconditionFailed { diagnostics } = &e {
                    for d in diagnostics {
                        eprintln!(
                            "    {} {} {}",
                            dim(d.kind.as_str()),
                            bold(&d.key),
                            d.message.as_deref().unwrap_or(&d.reason)
                        );
                    }
                }
            }
        }
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if let Some(ref cb) = progress {
        cb.bar.finish_and_clear();
        let degraded = cb.degraded.load(Ordering::SeqCst);
        let failed = total - succeeded - degraded;
        eprintln!(
            "{} {}/{} documents inserted in full  ({} degraded, {} failed)",
            if failed == 0 && degraded == 0 {
                green("✔")
            } else {
                yellow("⚠")
            },
            bold(&succeeded.to_string()),
            total,
            degraded,
            red(&failed.to_string()),
        );
    }

    Ok(first_failure.unwrap_or(0))
}

/// Map CLI args to `IngestConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<IngestConfig> {
    let methodology: ParsingMethodology = cli
        .parsing_methodology
        .parse()
        .context("Invalid --parsing-methodology")?;

    let mut builder = IngestConfig::builder()
        .table_id(&cli.table)
        .include_raw_entities(cli.include_raw_entities)
        .include_error_fields(cli.include_error_fields)
        .continue_on_error(cli.continue_on_error)
        .retry_count(cli.retry_count)
        .parsing_methodology(methodology)
        .tree_source(if cli.form_fields {
            TreeSource::FormFields
        } else {
            TreeSource::Entities
        })
        .concurrency(cli.concurrency)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref raw) = cli.custom_fields {
        let fields: TableRow =
            serde_json::from_str(raw).context("--custom-fields must be a JSON object")?;
        builder = builder.custom_fields(fields);
    }
    if let Some(ref raw) = cli.metadata_mapping {
        let mapping: BTreeMap<String, MappingInfo> = serde_json::from_str(raw)
            .context("--metadata-mapping must be a JSON object of mapping entries")?;
        builder = builder.metadata_mapping(mapping);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
