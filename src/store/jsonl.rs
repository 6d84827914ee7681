//! File-backed table store.
//!
//! ```text
//! <dir>/
//!   invoices.schema.json   BigQuery schema JSON
//!   invoices.jsonl         one accepted row per line
//! ```

use super::{validate_row, InsertError, TableRow, TableStore};
use crate::error::StoreError;
use crate::schema::{schema_from_json, SchemaColumn};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Tables stored as JSON Lines files in one directory.
#[derive(Debug)]
pub struct JsonlTableStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn schema_path(&self, table_id: &str) -> PathBuf {
        self.dir.join(format!("{table_id}.schema.json"))
    }

    pub fn rows_path(&self, table_id: &str) -> PathBuf {
        self.dir.join(format!("{table_id}.jsonl"))
    }

    /// Write a table's schema file, creating the directory if needed.
    pub async fn create_table(
        &self,
        table_id: &str,
        schema: &[SchemaColumn],
    ) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;
        let path = self.schema_path(table_id);
        let json = serde_json::to_vec_pretty(schema)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| io_error(&path, e))
    }

    /// Read back the accepted rows of a table.
    pub async fn read_rows(&self, table_id: &str) -> Result<Vec<TableRow>, StoreError> {
        let path = self.rows_path(table_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&path, e)),
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(StoreError::from))
            .collect()
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl TableStore for JsonlTableStore {
    async fn table_exists(&self, table_id: &str) -> Result<bool, StoreError> {
        let path = self.schema_path(table_id);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_error(&path, e))
    }

    async fn get_schema(&self, table_id: &str) -> Result<Vec<SchemaColumn>, StoreError> {
        let path = self.schema_path(table_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::UnknownTable(table_id.to_string()))
            }
            Err(e) => return Err(io_error(&path, e)),
        };
        Ok(schema_from_json(&bytes)?)
    }

    async fn insert_row(
        &self,
        table_id: &str,
        row: &TableRow,
    ) -> Result<Vec<InsertError>, StoreError> {
        let schema = self.get_schema(table_id).await?;
        let errors = validate_row(row, &schema);
        if !errors.is_empty() {
            return Ok(errors);
        }

        let mut line = serde_json::to_vec(row)?;
        line.push(b'\n');

        let path = self.rows_path(table_id);
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        file.write_all(&line).await.map_err(|e| io_error(&path, e))?;
        file.flush().await.map_err(|e| io_error(&path, e))?;
        debug!("appended row to {}", path.display());
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use serde_json::json;

    #[tokio::test]
    async fn appends_valid_rows_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlTableStore::new(dir.path());
        store
            .create_table(
                "invoices",
                &[SchemaColumn::scalar("total", ColumnType::Integer)],
            )
            .await
            .unwrap();
        assert!(store.table_exists("invoices").await.unwrap());
        assert!(!store.table_exists("receipts").await.unwrap());

        let mut good = TableRow::new();
        good.insert("total".into(), json!(7));
        let mut bad = TableRow::new();
        bad.insert("total".into(), json!("seven"));

        assert!(store.insert_row("invoices", &good).await.unwrap().is_empty());
        let rejected = store.insert_row("invoices", &bad).await.unwrap();
        assert_eq!(rejected[0].location, "total");

        assert_eq!(store.read_rows("invoices").await.unwrap(), vec![good]);
    }

    #[tokio::test]
    async fn missing_schema_is_unknown_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlTableStore::new(dir.path());
        assert!(matches!(
            store.get_schema("nope").await,
            Err(StoreError::UnknownTable(_))
        ));
        assert!(store.read_rows("nope").await.unwrap().is_empty());
    }
}
