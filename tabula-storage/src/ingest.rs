use crate::inference::infer_columns;
use crate::reader::read_csv;
use crate::store::{complete, StorageConnection, StorageTransaction};
use bytes::Bytes;
use std::sync::Arc;
use tabula_core::{
    schema::{QuotedIdent, TableRef},
    ColumnType, Error, Result, SchemaBuilder, Statement, TableSchema,
};
use tracing::{debug, info};

/// A file that has been parsed, typed and given a validated schema, but has
/// not touched storage yet.
#[derive(Debug, Clone)]
pub struct PreparedIngest {
    pub schema: TableSchema,
    pub columns: Vec<(String, ColumnType)>,
    /// Header-bearing CSV text handed whole to the bulk loader.
    pub contents: Bytes,
    pub row_count: usize,
}

impl PreparedIngest {
    /// The same load aimed at another, already validated, table.
    pub fn retarget(mut self, table: TableRef) -> Self {
        self.schema.table = table;
        self
    }
}

/// `text/csv`, optionally followed by parameters such as a charset.
pub fn is_csv_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|mime| mime.trim().eq_ignore_ascii_case("text/csv"))
        .unwrap_or(false)
}

/// Loads parsed files into storage as whole tables.
///
/// Work is split in two phases. [`IngestionManager::prepare`] does every
/// check that can fail on bad input (content type, CSV shape, inference,
/// identifiers) without a transaction. [`IngestionManager::ingest_in`] then
/// runs drop/create/load inside a caller-owned transaction, so it can only
/// fail on genuine storage errors.
pub struct IngestionManager {
    storage: Arc<dyn StorageConnection>,
    schema_name: String,
}

impl IngestionManager {
    pub fn new(storage: Arc<dyn StorageConnection>, schema_name: impl Into<String>) -> Self {
        Self {
            storage,
            schema_name: schema_name.into(),
        }
    }

    pub fn schema_builder(&self) -> SchemaBuilder<'_> {
        SchemaBuilder::new(self.storage.quoting(), self.schema_name.clone())
    }

    /// Validate a logical table name and qualify it.
    pub fn table_ref(&self, table_name: &str) -> Result<TableRef> {
        self.schema_builder().table_ref(table_name)
    }

    pub fn prepare(
        &self,
        table_name: &str,
        content_type: Option<&str>,
        contents: Bytes,
    ) -> Result<PreparedIngest> {
        match content_type {
            Some(ct) if is_csv_content_type(ct) => {}
            _ => return Err(Error::not_tabular("File is not a CSV")),
        }

        let doc = read_csv(&contents)?;
        let columns = infer_columns(&doc);
        let schema = self.schema_builder().build(table_name, &columns)?;
        debug!(
            "Prepared {} with {} columns and {} rows",
            schema.table,
            columns.len(),
            doc.row_count()
        );

        Ok(PreparedIngest {
            schema,
            columns,
            contents,
            row_count: doc.row_count(),
        })
    }

    /// Drop `replace_target` if given, create the prepared table and bulk
    /// load it, all inside `txn`.
    pub async fn ingest_in(
        &self,
        txn: &mut dyn StorageTransaction,
        prepared: &PreparedIngest,
        replace_target: Option<&TableRef>,
    ) -> Result<u64> {
        if let Some(target) = replace_target {
            txn.execute(&Statement::DropTableIfExists(target.clone()))
                .await
                .map_err(rejected)?;
        }
        txn.execute(&prepared.schema.create_statement())
            .await
            .map_err(rejected)?;
        let loaded = txn
            .copy_in(&prepared.schema.table, prepared.contents.clone())
            .await
            .map_err(rejected)?;

        info!("{}: loaded {} rows into {}", txn.id(), loaded, prepared.schema.table);
        Ok(loaded)
    }

    /// Rename a table in place without reloading it.
    pub async fn rename_in(
        &self,
        txn: &mut dyn StorageTransaction,
        from: &TableRef,
        to: &QuotedIdent,
    ) -> Result<()> {
        txn.execute(&Statement::RenameTable {
            from: from.clone(),
            to: to.clone(),
        })
        .await
        .map_err(rejected)?;
        info!("{}: renamed {} to {}", txn.id(), from, to);
        Ok(())
    }

    /// [`IngestionManager::ingest_in`] in a transaction of its own.
    pub async fn ingest(
        &self,
        prepared: &PreparedIngest,
        replace_target: Option<&TableRef>,
    ) -> Result<u64> {
        let mut txn = self.storage.begin().await?;
        let outcome = self.ingest_in(txn.as_mut(), prepared, replace_target).await;
        complete(txn, outcome).await.map_err(rejected)
    }
}

fn rejected(err: Error) -> Error {
    match err {
        Error::Storage(message) => Error::storage_rejected(message),
        other => other,
    }
}
