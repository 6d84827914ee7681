//! The insert protocol: full insert, degraded retries, fallback.
//!
//! ```text
//!   Full ──accepted──────────────────────────────▶ Done(Success)
//!    │ rejected, continue_on_error off ──────────▶ Done(Rejected)
//!    ▼ rejected
//!   Degraded{1..=retry_count} ──accepted─────────▶ Done(Degraded)
//!    ▼ retries exhausted
//!   Fallback ──row empty─────────────────────────▶ Done(NothingToInsert)
//!            ──attempted─────────────────────────▶ Done(Minimal)
//! ```
//!
//! Each step depends on the columns excluded by the previous one, so attempts
//! for one document are strictly sequential.

use crate::output::{AttemptRecord, IngestOutcome, InsertStage};
use crate::pipeline::map::DocumentMapper;
use crate::progress::ProgressCallback;
use crate::store::{TableRow, TableStore};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Drives one document's row through the insert protocol.
pub struct InsertCoordinator<'a, S: TableStore + ?Sized> {
    store: &'a S,
    table_id: &'a str,
    source: &'a str,
    continue_on_error: bool,
    retry_count: u32,
    progress: Option<&'a ProgressCallback>,
}

/// What the coordinator did.
#[derive(Debug, Clone)]
pub struct InsertReport {
    pub outcome: IngestOutcome,
    /// Last row sent to the store.
    pub row: TableRow,
    pub attempts: Vec<AttemptRecord>,
    /// Columns excluded when the protocol ended.
    pub excluded: BTreeSet<String>,
}

enum State {
    Attempt(InsertStage),
    Done(IngestOutcome),
}

impl<'a, S: TableStore + ?Sized> InsertCoordinator<'a, S> {
    pub fn new(store: &'a S, table_id: &'a str) -> Self {
        Self {
            store,
            table_id,
            source: table_id,
            continue_on_error: false,
            retry_count: 1,
            progress: None,
        }
    }

    /// Name used for the document in logs and progress events.
    pub fn source(mut self, source: &'a str) -> Self {
        self.source = source;
        self
    }

    pub fn continue_on_error(mut self, v: bool) -> Self {
        self.continue_on_error = v;
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n;
        self
    }

    pub fn progress(mut self, cb: Option<&'a ProgressCallback>) -> Self {
        self.progress = cb;
        self
    }

    /// Run the protocol to a terminal state.
    pub async fn run(&self, mapper: &mut DocumentMapper) -> InsertReport {
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut exclude: BTreeSet<String> = BTreeSet::new();
        let mut state = State::Attempt(InsertStage::Full);

        let outcome = loop {
            let stage = match state {
                State::Done(outcome) => break outcome,
                State::Attempt(stage) => stage,
            };

            let row = match stage {
                InsertStage::Full => mapper.to_output_row(&BTreeSet::new()),
                InsertStage::Degraded { .. } => mapper.to_output_row(&exclude),
                InsertStage::Fallback => mapper.to_fallback_row(&exclude),
            };
            if stage == InsertStage::Fallback && row.is_empty() {
                warn!("{}: there are no fields to insert", self.source);
                state = State::Done(IngestOutcome::NothingToInsert);
                continue;
            }

            let record = self.attempt(stage, attempts.len() as u32 + 1, row).await;
            let newly_rejected = mapper.record_rejections(&record.rejected);
            exclude = exclude.union(&newly_rejected).cloned().collect();
            let accepted = record.accepted();
            attempts.push(record);

            state = self.next_state(stage, accepted);
        };

        InsertReport {
            outcome,
            row: attempts.last().map(|a| a.row.clone()).unwrap_or_default(),
            attempts,
            excluded: exclude,
        }
    }

    fn next_state(&self, stage: InsertStage, accepted: bool) -> State {
        match (stage, accepted) {
            (InsertStage::Full, true) => State::Done(IngestOutcome::Success),
            (InsertStage::Full, false) if !self.continue_on_error => {
                State::Done(IngestOutcome::Rejected)
            }
            (InsertStage::Full, false) if self.retry_count > 0 => {
                State::Attempt(InsertStage::Degraded { retry: 1 })
            }
            (InsertStage::Full, false) => State::Attempt(InsertStage::Fallback),
            (InsertStage::Degraded { .. }, true) => State::Done(IngestOutcome::Degraded),
            (InsertStage::Degraded { retry }, false) if retry < self.retry_count => {
                State::Attempt(InsertStage::Degraded { retry: retry + 1 })
            }
            (InsertStage::Degraded { .. }, false) => State::Attempt(InsertStage::Fallback),
            (InsertStage::Fallback, accepted) => State::Done(IngestOutcome::Minimal { accepted }),
        }
    }

    async fn attempt(&self, stage: InsertStage, number: u32, row: TableRow) -> AttemptRecord {
        if let Some(cb) = self.progress {
            cb.on_attempt_start(self.source, stage, number);
        }

        let mut record = AttemptRecord {
            stage,
            row,
            rejected: Vec::new(),
            store_error: None,
        };
        match self.store.insert_row(self.table_id, &record.row).await {
            Ok(errors) if errors.is_empty() => {
                info!(
                    "{}: insert attempt {} ({}) succeeded",
                    self.source, number, stage
                );
            }
            Ok(errors) => {
                warn!(
                    "{}: insert errors from attempt {} ({}): {:?}",
                    self.source, number, stage, errors
                );
                record.rejected = errors;
            }
            Err(e) => {
                warn!(
                    "{}: insert attempt {} ({}) failed: {}",
                    self.source, number, stage, e
                );
                record.store_error = Some(e.to_string());
            }
        }

        if let Some(cb) = self.progress {
            match &record.store_error {
                Some(e) => cb.on_attempt_error(self.source, stage, e),
                None => cb.on_attempt_complete(self.source, stage, record.rejected.len()),
            }
        }
        record
    }
}
