//! Streaming ingestion API: ingest many documents, emit outcomes as they complete.
//!
//! Each document still runs its insert protocol strictly in order; only
//! independent documents overlap. At most `config.concurrency` documents are
//! in flight at once, and outcomes arrive in completion order, not input
//! order.

use crate::config::IngestConfig;
use crate::error::Doc2TableError;
use crate::ingest::ingest;
use crate::output::IngestOutput;
use crate::store::TableStore;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// One finished document: the input it came from and its result.
pub type StreamItem = (String, Result<IngestOutput, Doc2TableError>);

/// A boxed stream of per-document results.
pub type IngestStream = Pin<Box<dyn Stream<Item = StreamItem> + Send>>;

/// Ingest every input into the configured table, yielding results as each
/// document completes.
///
/// A fatal error for one document does not stop the others.
///
/// # Example
/// ```rust,no_run
/// use doc2table::{ingest_stream, IngestConfig, JsonlTableStore, TableStore};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store: Arc<dyn TableStore> = Arc::new(JsonlTableStore::new("tables"));
/// let config = IngestConfig::builder().table_id("invoices").build()?;
/// let mut results = ingest_stream(vec!["a.json", "b.json"], store, &config);
/// while let Some((source, result)) = results.next().await {
///     match result {
///         Ok(out) => println!("{source}: {}", out.outcome),
///         Err(e) => eprintln!("{source}: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn ingest_stream<I, T>(inputs: I, store: Arc<dyn TableStore>, config: &IngestConfig) -> IngestStream
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let inputs: Vec<String> = inputs.into_iter().map(Into::into).collect();
    info!(
        "Starting streaming ingestion of {} document(s) into '{}' (concurrency {})",
        inputs.len(),
        config.table_id,
        config.concurrency
    );

    let concurrency = config.concurrency.max(1);
    let config = config.clone();

    let s = stream::iter(inputs.into_iter().map(move |input| {
        let store = Arc::clone(&store);
        let cfg = config.clone();
        async move {
            let result = ingest(&input, store.as_ref(), &cfg).await;
            (input, result)
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, SchemaColumn};
    use crate::store::MemoryTableStore;

    #[tokio::test]
    async fn yields_one_item_per_input() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        std::fs::write(
            &good,
            r#"{"entities": [{"type": "invoice_id", "mentionText": "INV-9", "pageAnchor": {"pageRefs": [{}]}}]}"#,
        )
        .unwrap();

        let store = Arc::new(MemoryTableStore::with_table(
            "invoices",
            vec![SchemaColumn::scalar("invoice_id", ColumnType::String)],
        ));
        let config = IngestConfig::builder()
            .table_id("invoices")
            .concurrency(2)
            .build()
            .unwrap();

        let inputs = vec![
            good.to_string_lossy().into_owned(),
            dir.path().join("missing.json").to_string_lossy().into_owned(),
        ];
        let dyn_store: Arc<dyn TableStore> = store.clone();
        let mut results: Vec<StreamItem> = ingest_stream(inputs, dyn_store, &config).collect().await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|(_, r)| r.is_ok()));
        assert!(results
            .iter()
            .any(|(_, r)| matches!(r, Err(Doc2TableError::InputNotFound { .. }))));
        assert_eq!(store.rows("invoices").len(), 1);
    }
}
