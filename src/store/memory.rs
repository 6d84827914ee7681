//! In-process table store.

use super::{validate_row, InsertError, TableRow, TableStore};
use crate::error::StoreError;
use crate::schema::SchemaColumn;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Table {
    schema: Vec<SchemaColumn>,
    rows: Vec<TableRow>,
    attempts: Vec<TableRow>,
}

/// Tables held in memory.
///
/// Every insert attempt is recorded, accepted or not, so callers can inspect
/// exactly what the coordinator sent.
#[derive(Debug, Default)]
pub struct MemoryTableStore {
    tables: Mutex<HashMap<String, Table>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding one empty table.
    pub fn with_table(table_id: impl Into<String>, schema: Vec<SchemaColumn>) -> Self {
        let store = Self::new();
        store.create_table(table_id, schema);
        store
    }

    /// Create or replace a table.
    pub fn create_table(&self, table_id: impl Into<String>, schema: Vec<SchemaColumn>) {
        if let Ok(mut tables) = self.lock() {
            tables.insert(
                table_id.into(),
                Table {
                    schema,
                    ..Table::default()
                },
            );
        }
    }

    /// Accepted rows of a table.
    pub fn rows(&self, table_id: &str) -> Vec<TableRow> {
        self.lock()
            .ok()
            .and_then(|t| t.get(table_id).map(|t| t.rows.clone()))
            .unwrap_or_default()
    }

    /// Every row passed to `insert_row`, in call order.
    pub fn attempts(&self, table_id: &str) -> Vec<TableRow> {
        self.lock()
            .ok()
            .and_then(|t| t.get(table_id).map(|t| t.attempts.clone()))
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Table>>, StoreError> {
        self.tables
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {e}")))
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn table_exists(&self, table_id: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.contains_key(table_id))
    }

    async fn get_schema(&self, table_id: &str) -> Result<Vec<SchemaColumn>, StoreError> {
        self.lock()?
            .get(table_id)
            .map(|t| t.schema.clone())
            .ok_or_else(|| StoreError::UnknownTable(table_id.to_string()))
    }

    async fn insert_row(
        &self,
        table_id: &str,
        row: &TableRow,
    ) -> Result<Vec<InsertError>, StoreError> {
        let mut tables = self.lock()?;
        let table = tables
            .get_mut(table_id)
            .ok_or_else(|| StoreError::UnknownTable(table_id.to_string()))?;
        table.attempts.push(row.clone());
        let errors = validate_row(row, &table.schema);
        if errors.is_empty() {
            table.rows.push(row.clone());
        }
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use serde_json::json;

    fn store() -> MemoryTableStore {
        MemoryTableStore::with_table(
            "invoices",
            vec![SchemaColumn::scalar("invoice_id", ColumnType::String)],
        )
    }

    #[tokio::test]
    async fn records_attempts_and_accepted_rows() {
        let store = store();
        let mut good = TableRow::new();
        good.insert("invoice_id".into(), json!("INV-1"));
        let mut bad = TableRow::new();
        bad.insert("vendor".into(), json!("Acme"));

        assert!(store.insert_row("invoices", &good).await.unwrap().is_empty());
        assert_eq!(store.insert_row("invoices", &bad).await.unwrap().len(), 1);

        assert_eq!(store.rows("invoices"), vec![good]);
        assert_eq!(store.attempts("invoices").len(), 2);
    }

    #[tokio::test]
    async fn unknown_table() {
        let store = store();
        assert!(!store.table_exists("receipts").await.unwrap());
        assert!(matches!(
            store.get_schema("receipts").await,
            Err(StoreError::UnknownTable(_))
        ));
    }
}
