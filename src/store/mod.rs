//! Destination table stores.
//!
//! The pipeline talks to its destination only through [`TableStore`]. Two
//! implementations ship with the crate:
//!
//! * [`MemoryTableStore`]: in-process tables, used by tests and dry runs.
//! * [`JsonlTableStore`]: a directory of `<table>.schema.json` +
//!   `<table>.jsonl` files, used by the CLI.
//!
//! Both validate rows the way a BigQuery streaming insert does (see
//! [`validate_row`]) and report rejected columns as [`InsertError`]s.

use crate::error::StoreError;
use crate::schema::SchemaColumn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod jsonl;
pub mod memory;
pub mod validate;

pub use jsonl::JsonlTableStore;
pub use memory::MemoryTableStore;
pub use validate::validate_row;

/// One row as sent to a store.
pub type TableRow = Map<String, Value>;

/// A column the store refused in an insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertError {
    /// Column path, e.g. `total_amount` or `line_item[0].amount`.
    pub location: String,
    pub reason: String,
    pub message: String,
}

impl InsertError {
    pub fn new(
        location: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// A destination of rows.
///
/// `insert_row` returns the rejected columns; an empty list means the row was
/// stored. `Err` is reserved for the store itself failing.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn table_exists(&self, table_id: &str) -> Result<bool, StoreError>;

    async fn get_schema(&self, table_id: &str) -> Result<Vec<SchemaColumn>, StoreError>;

    async fn insert_row(
        &self,
        table_id: &str,
        row: &TableRow,
    ) -> Result<Vec<InsertError>, StoreError>;
}
