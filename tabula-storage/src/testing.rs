// Failure injection for storage tests

use crate::memory::InMemoryStore;
use crate::store::{StorageConnection, StorageTransaction, TableSnapshot};
use async_trait::async_trait;
use bytes::Bytes;
use tabula_core::{
    schema::{IdentifierQuoting, QuotedIdent, TableRef},
    upload::NewUpload,
    Error, Result, Statement, TransactionId, Upload, UploadId,
};

/// Delegates to an [`InMemoryStore`] but fails every bulk load.
#[derive(Clone, Default)]
pub(crate) struct FailingCopyStore {
    pub inner: InMemoryStore,
}

impl IdentifierQuoting for FailingCopyStore {
    fn quote_identifier(&self, name: &str) -> Result<QuotedIdent> {
        self.inner.quote_identifier(name)
    }
}

#[async_trait]
impl StorageConnection for FailingCopyStore {
    fn quoting(&self) -> &dyn IdentifierQuoting {
        self
    }

    async fn begin(&self) -> Result<Box<dyn StorageTransaction>> {
        Ok(Box::new(FailingCopyTransaction {
            inner: self.inner.begin().await?,
        }))
    }

    async fn read_table(&self, table: &TableRef, limit: Option<usize>) -> Result<TableSnapshot> {
        self.inner.read_table(table, limit).await
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        self.inner.table_exists(table).await
    }

    async fn get_upload(&self, id: UploadId) -> Result<Upload> {
        self.inner.get_upload(id).await
    }

    async fn list_uploads(&self) -> Result<Vec<Upload>> {
        self.inner.list_uploads().await
    }
}

struct FailingCopyTransaction {
    inner: Box<dyn StorageTransaction>,
}

#[async_trait]
impl StorageTransaction for FailingCopyTransaction {
    fn id(&self) -> TransactionId {
        self.inner.id()
    }

    async fn execute(&mut self, statement: &Statement) -> Result<()> {
        self.inner.execute(statement).await
    }

    async fn copy_in(&mut self, table: &TableRef, _csv: Bytes) -> Result<u64> {
        Err(Error::Storage(format!("COPY {}: disk full", table)))
    }

    async fn get_upload(&mut self, id: UploadId) -> Result<Upload> {
        self.inner.get_upload(id).await
    }

    async fn insert_upload(&mut self, upload: NewUpload) -> Result<Upload> {
        self.inner.insert_upload(upload).await
    }

    async fn update_upload(&mut self, upload: Upload) -> Result<Upload> {
        self.inner.update_upload(upload).await
    }

    async fn delete_upload(&mut self, id: UploadId) -> Result<()> {
        self.inner.delete_upload(id).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.inner.rollback().await
    }
}
