use crate::engine::{QueryEngine, QueryResult};
use crate::request::QueryRequest;
use async_trait::async_trait;
use std::sync::Arc;
use tabula_core::{Error, Result, SchemaBuilder};
use tabula_storage::StorageConnection;
use tracing::debug;

pub const UPLOADS_DATA_SOURCE: &str = "uploads";

/// Previews uploaded tables. The statement is a logical table name and
/// `options.limit` caps the rows returned.
pub struct UploadsEngine {
    storage: Arc<dyn StorageConnection>,
    schema_name: String,
}

impl UploadsEngine {
    pub fn new(storage: Arc<dyn StorageConnection>, schema_name: impl Into<String>) -> Self {
        Self {
            storage,
            schema_name: schema_name.into(),
        }
    }
}

#[async_trait]
impl QueryEngine for UploadsEngine {
    fn name(&self) -> &str {
        UPLOADS_DATA_SOURCE
    }

    async fn run(&self, request: QueryRequest) -> Result<QueryResult> {
        let table_name = request.statement.trim();
        let table = SchemaBuilder::new(self.storage.quoting(), self.schema_name.clone())
            .table_ref(table_name)
            .map_err(|e| Error::Execution(e.to_string()))?;
        let limit = request.option_usize("limit");
        debug!("Previewing {} (limit {:?})", table, limit);

        let snapshot = self
            .storage
            .read_table(&table, limit)
            .await
            .map_err(|e| match e {
                Error::Storage(message) => Error::Execution(message),
                other => other,
            })?;

        Ok(QueryResult {
            columns: snapshot.columns.into_iter().map(|(name, _)| name).collect(),
            rows: snapshot.rows.into_iter().map(|row| row.values).collect(),
        })
    }
}
