// Upload lifecycle: create, re-upload/rename, destroy

use crate::ingest::{IngestionManager, PreparedIngest};
use crate::store::{complete, StorageConnection, StorageTransaction};
use bytes::Bytes;
use std::sync::Arc;
use tabula_core::{upload::NewUpload, Error, Result, Statement, Upload, UploadId};
use tracing::info;

/// An uploaded file as received from a client.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub content_type: Option<String>,
    pub contents: Bytes,
}

impl UploadFile {
    pub fn csv(contents: impl Into<Bytes>) -> Self {
        Self {
            content_type: Some("text/csv".to_string()),
            contents: contents.into(),
        }
    }
}

/// Owns the Upload catalog rows and the tables behind them.
///
/// Every operation validates its input first and then runs catalog and
/// table changes in one storage transaction, so metadata and data always
/// move together.
pub struct UploadService {
    storage: Arc<dyn StorageConnection>,
    ingestion: IngestionManager,
    max_file_bytes: usize,
}

impl UploadService {
    pub fn new(storage: Arc<dyn StorageConnection>, schema_name: impl Into<String>) -> Self {
        Self {
            ingestion: IngestionManager::new(storage.clone(), schema_name),
            storage,
            max_file_bytes: usize::MAX,
        }
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: usize) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn storage(&self) -> &Arc<dyn StorageConnection> {
        &self.storage
    }

    pub fn ingestion(&self) -> &IngestionManager {
        &self.ingestion
    }

    pub async fn show(&self, id: UploadId) -> Result<Upload> {
        self.storage.get_upload(id).await
    }

    pub async fn list(&self) -> Result<Vec<Upload>> {
        self.storage.list_uploads().await
    }

    /// Create an upload and its table from a file.
    pub async fn create(
        &self,
        table_name: &str,
        file: Option<UploadFile>,
        creator: Option<String>,
    ) -> Result<Upload> {
        let file = file.ok_or_else(|| Error::MalformedInput("File can't be blank".to_string()))?;
        let prepared = self.prepare(table_name, file)?;

        let mut txn = self.storage.begin().await?;
        let outcome = self.create_in(txn.as_mut(), prepared, creator).await;
        let upload = complete(txn, outcome).await?;
        info!("Created upload {} ({} columns)", upload.table_name, upload.columns.len());
        Ok(upload)
    }

    async fn create_in(
        &self,
        txn: &mut dyn StorageTransaction,
        prepared: PreparedIngest,
        creator: Option<String>,
    ) -> Result<Upload> {
        let upload = txn
            .insert_upload(NewUpload {
                table_name: prepared.schema.table.name.raw().to_string(),
                columns: prepared.columns.clone(),
                creator,
            })
            .await?;
        self.ingestion.ingest_in(txn, &prepared, None).await?;
        Ok(upload)
    }

    /// Re-upload and/or rename.
    ///
    /// With a file the old table is dropped and the new one loaded under the
    /// (possibly new) name. Without a file but with a new name the existing
    /// table is renamed in place. The catalog row is locked before anything
    /// is derived from it, so a concurrent rename or destroy is never undone.
    pub async fn update(
        &self,
        id: UploadId,
        table_name: Option<&str>,
        file: Option<UploadFile>,
    ) -> Result<Upload> {
        let tentative = match table_name {
            Some(name) => name.to_string(),
            None => self.storage.get_upload(id).await?.table_name,
        };
        self.ingestion.table_ref(&tentative)?;
        let prepared = file.map(|f| self.prepare(&tentative, f)).transpose()?;

        let mut txn = self.storage.begin().await?;
        let outcome = self.update_in(txn.as_mut(), id, table_name, prepared).await;
        let upload = complete(txn, outcome).await?;
        info!("Updated upload {} ({})", upload.id, upload.table_name);
        Ok(upload)
    }

    async fn update_in(
        &self,
        txn: &mut dyn StorageTransaction,
        id: UploadId,
        table_name: Option<&str>,
        prepared: Option<PreparedIngest>,
    ) -> Result<Upload> {
        let mut upload = txn.get_upload(id).await?;
        let source = self.ingestion.table_ref(&upload.table_name)?;
        let target_name = table_name.unwrap_or(&upload.table_name).to_string();
        let target = self.ingestion.table_ref(&target_name)?;
        let renamed = upload.table_name != target_name;

        upload.table_name = target_name;
        if let Some(prepared) = &prepared {
            upload.columns = prepared.columns.clone();
        }
        let upload = txn.update_upload(upload).await?;

        match prepared {
            Some(prepared) => {
                let prepared = prepared.retarget(target);
                self.ingestion.ingest_in(txn, &prepared, Some(&source)).await?;
            }
            None if renamed => {
                self.ingestion.rename_in(txn, &source, &target.name).await?;
            }
            None => {}
        }
        Ok(upload)
    }

    /// Drop the table and delete the catalog row together.
    pub async fn destroy(&self, id: UploadId) -> Result<Upload> {
        let mut txn = self.storage.begin().await?;
        let outcome = self.destroy_in(txn.as_mut(), id).await;
        let upload = complete(txn, outcome).await?;
        info!("Destroyed upload {} ({})", upload.id, upload.table_name);
        Ok(upload)
    }

    async fn destroy_in(&self, txn: &mut dyn StorageTransaction, id: UploadId) -> Result<Upload> {
        let upload = txn.get_upload(id).await?;
        let table = self.ingestion.table_ref(&upload.table_name)?;
        txn.delete_upload(id).await?;
        txn.execute(&Statement::DropTableIfExists(table))
            .await
            .map_err(|e| Error::storage_rejected(e.to_string()))?;
        Ok(upload)
    }

    fn prepare(&self, table_name: &str, file: UploadFile) -> Result<PreparedIngest> {
        if file.contents.len() > self.max_file_bytes {
            return Err(Error::MalformedInput(format!(
                "File is larger than {} bytes",
                self.max_file_bytes
            )));
        }
        self.ingestion
            .prepare(table_name, file.content_type.as_deref(), file.contents)
    }
}
