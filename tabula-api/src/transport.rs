use crate::rest::RunResponse;
use async_trait::async_trait;
use tabula_core::Result;
use tabula_query::QueryParams;
use uuid::Uuid;

/// How the poll loop reaches the execution endpoint.
///
/// Network failures, non-success statuses and undecodable bodies are all
/// reported as `Error::Transport`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn run(&self, params: &QueryParams) -> Result<RunResponse>;

    async fn cancel(&self, run_id: Uuid) -> Result<()>;
}
