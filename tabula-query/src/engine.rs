use crate::request::QueryRequest;
use async_trait::async_trait;
use tabula_core::{CellValue, Result};

/// Tabular output of a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<CellValue>>>,
}

/// A data source that can run statements.
///
/// Runs are spawned onto the runtime by the dispatcher and may take far
/// longer than a single request is allowed to wait.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Data source id this engine answers to.
    fn name(&self) -> &str;

    async fn run(&self, request: QueryRequest) -> Result<QueryResult>;
}
