use async_trait::async_trait;
use bytes::Bytes;
use tabula_core::{
    row::Row,
    schema::{IdentifierQuoting, TableRef},
    upload::NewUpload,
    ColumnType, Result, Statement, TransactionId, Upload, UploadId,
};
use tracing::warn;

/// Committed contents of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    pub columns: Vec<(String, ColumnType)>,
    pub rows: Vec<Row>,
}

/// Connection to the storage engine that holds uploaded tables and the
/// upload catalog.
///
/// Every mutation goes through a [`StorageTransaction`]; the connection
/// itself only offers identifier quoting and committed reads.
#[async_trait]
pub trait StorageConnection: IdentifierQuoting {
    fn quoting(&self) -> &dyn IdentifierQuoting;

    /// Open a transaction spanning DDL, bulk loads and catalog writes.
    async fn begin(&self) -> Result<Box<dyn StorageTransaction>>;

    /// Read a committed table, at most `limit` rows.
    async fn read_table(&self, table: &TableRef, limit: Option<usize>) -> Result<TableSnapshot>;

    async fn table_exists(&self, table: &TableRef) -> Result<bool>;

    async fn get_upload(&self, id: UploadId) -> Result<Upload>;

    /// All committed uploads ordered by table name.
    async fn list_uploads(&self) -> Result<Vec<Upload>>;
}

/// One atomic unit of work against the storage engine.
///
/// Dropping a transaction without committing rolls it back and releases
/// every lock it holds.
#[async_trait]
pub trait StorageTransaction: Send {
    fn id(&self) -> TransactionId;

    /// Run CREATE / DROP / RENAME TABLE.
    async fn execute(&mut self, statement: &Statement) -> Result<()>;

    /// Bulk-load header-bearing CSV text into an existing table, returning
    /// the number of rows loaded.
    async fn copy_in(&mut self, table: &TableRef, csv: Bytes) -> Result<u64>;

    async fn get_upload(&mut self, id: UploadId) -> Result<Upload>;

    /// Insert a catalog row; table names are unique across uploads.
    async fn insert_upload(&mut self, upload: NewUpload) -> Result<Upload>;

    async fn update_upload(&mut self, upload: Upload) -> Result<Upload>;

    async fn delete_upload(&mut self, id: UploadId) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Commit on success, roll back on failure, and hand back the outcome.
pub async fn complete<T>(txn: Box<dyn StorageTransaction>, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(e) => {
            let id = txn.id();
            if let Err(rollback) = txn.rollback().await {
                warn!("{}: rollback failed: {}", id, rollback);
            }
            Err(e)
        }
    }
}
