use crate::engine::{QueryEngine, QueryResult};
use crate::registry::{RunHandle, RunRegistry};
use crate::render::{OutputFormat, Renderer};
use crate::request::{QueryParams, QueryRequest};
use crate::token::ContinuationToken;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{config::QueryConfig, Error, Result};
use tokio::task::JoinError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What one `execute` call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Rendered output of a finished run.
    Done(String),
    /// The run is still going; resume with this token.
    Pending(ContinuationToken),
    /// The engine failed, or the run can no longer be resumed.
    Failed(String),
}

/// Starts and resumes runs, never waiting longer than the time budget.
pub struct Dispatcher {
    engines: HashMap<String, Arc<dyn QueryEngine>>,
    registry: Arc<RunRegistry>,
    renderer: Renderer,
    time_budget: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<RunRegistry>, time_budget: Duration, renderer: Renderer) -> Self {
        Self {
            engines: HashMap::new(),
            registry,
            renderer,
            time_budget,
        }
    }

    pub fn from_config(config: &QueryConfig) -> Self {
        Self::new(
            Arc::new(RunRegistry::new(config.run_ttl())),
            config.time_budget(),
            Renderer::new(config.render_row_limit),
        )
    }

    pub fn register(&mut self, engine: Arc<dyn QueryEngine>) {
        info!("Registered data source: {}", engine.name());
        self.engines.insert(engine.name().to_string(), engine);
    }

    pub fn data_sources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    /// Start a run, or resume the one `token` refers to.
    ///
    /// Request errors (missing statement, unknown data source, bad options)
    /// are returned as `Err`; everything about the run itself is reported
    /// through [`DispatchOutcome`].
    pub async fn execute(
        &self,
        params: &QueryParams,
        token: Option<&ContinuationToken>,
    ) -> Result<DispatchOutcome> {
        let request = QueryRequest::from_params(params)?;
        let format = OutputFormat::parse(request.option_str("format"))?;

        if let Some(token) = token {
            if token.data_source != request.data_source {
                return Err(data_source_mismatch(token, &request.data_source));
            }
        }

        let mut inflight = match token {
            Some(token) => match self.registry.claim(&token.run_id) {
                Some(run) if run.data_source != token.data_source => {
                    // Forged or stale token; leave the run to its owner
                    self.registry.park(token.run_id, &run.data_source, run.handle);
                    return Err(data_source_mismatch(token, &run.data_source));
                }
                Some(run) => {
                    debug!("Resuming run {}", token.run_id);
                    InFlight::new(token.run_id, run.data_source, run.handle)
                }
                None => {
                    return Ok(DispatchOutcome::Failed(format!(
                        "Unknown or expired continuation token for run {}",
                        token.run_id
                    )))
                }
            },
            None => self.start(request)?,
        };

        match inflight.wait(self.time_budget).await {
            Some(joined) => Ok(self.finish(inflight.run_id, joined, format)),
            None => match inflight.park(&self.registry) {
                Some(token) => Ok(DispatchOutcome::Pending(token)),
                None => Ok(DispatchOutcome::Failed("run is no longer available".to_string())),
            },
        }
    }

    /// Abort a parked run.
    pub fn cancel(&self, run_id: &Uuid) -> bool {
        self.registry.cancel(run_id)
    }

    fn start(&self, request: QueryRequest) -> Result<InFlight> {
        let engine = self.engines.get(&request.data_source).cloned().ok_or_else(|| {
            Error::MalformedInput(format!("unknown data source \"{}\"", request.data_source))
        })?;

        let run_id = Uuid::new_v4();
        let data_source = request.data_source.clone();
        info!("Starting run {} on {}", run_id, data_source);
        let handle = tokio::spawn(async move { engine.run(request).await });
        Ok(InFlight::new(run_id, data_source, handle))
    }

    fn finish(
        &self,
        run_id: Uuid,
        joined: std::result::Result<Result<QueryResult>, JoinError>,
        format: OutputFormat,
    ) -> DispatchOutcome {
        match joined {
            Ok(Ok(result)) => match self.renderer.render(&result, format) {
                Ok(payload) => {
                    info!("Run {} finished with {} rows", run_id, result.rows.len());
                    DispatchOutcome::Done(payload)
                }
                Err(e) => DispatchOutcome::Failed(e.to_string()),
            },
            Ok(Err(Error::Execution(message))) => {
                warn!("Run {} failed: {}", run_id, message);
                DispatchOutcome::Failed(message)
            }
            Ok(Err(e)) => {
                warn!("Run {} failed: {}", run_id, e);
                DispatchOutcome::Failed(e.to_string())
            }
            Err(e) if e.is_cancelled() => DispatchOutcome::Failed("query was cancelled".to_string()),
            Err(e) => {
                warn!("Run {} panicked: {}", run_id, e);
                DispatchOutcome::Failed(format!("query panicked: {}", e))
            }
        }
    }
}

fn data_source_mismatch(token: &ContinuationToken, expected: &str) -> Error {
    Error::MalformedInput(format!(
        "continuation token for run {} belongs to data source \"{}\", not \"{}\"",
        token.run_id, token.data_source, expected
    ))
}

/// A run owned by the current request. Aborted if the request goes away
/// before finishing or parking it.
struct InFlight {
    run_id: Uuid,
    data_source: String,
    handle: Option<RunHandle>,
}

impl InFlight {
    fn new(run_id: Uuid, data_source: String, handle: RunHandle) -> Self {
        Self {
            run_id,
            data_source,
            handle: Some(handle),
        }
    }

    /// `None` when the budget ran out first.
    async fn wait(
        &mut self,
        budget: Duration,
    ) -> Option<std::result::Result<Result<QueryResult>, JoinError>> {
        let handle = self.handle.as_mut()?;
        tokio::time::timeout(budget, handle).await.ok()
    }

    fn park(mut self, registry: &RunRegistry) -> Option<ContinuationToken> {
        let handle = self.handle.take()?;
        Some(registry.park(self.run_id, &self.data_source, handle))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                debug!("Request for run {} went away, aborting", self.run_id);
            }
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use tabula_core::CellValue;

    /// Sleeps for `options.sleep_ms`, then returns one row echoing the
    /// statement; fails when the statement is "fail".
    struct SleepyEngine;

    #[async_trait]
    impl QueryEngine for SleepyEngine {
        fn name(&self) -> &str {
            "sleepy"
        }

        async fn run(&self, request: QueryRequest) -> Result<QueryResult> {
            let sleep_ms = request.option_usize("sleep_ms").unwrap_or(0) as u64;
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            if request.statement == "fail" {
                return Err(Error::Execution("relation \"nope\" does not exist".to_string()));
            }
            Ok(QueryResult {
                columns: vec!["statement".to_string()],
                rows: vec![vec![Some(CellValue::Text(request.statement))]],
            })
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut dispatcher = Dispatcher::new(
            Arc::new(RunRegistry::new(Duration::from_secs(600))),
            Duration::from_secs(3),
            Renderer::new(100),
        );
        dispatcher.register(Arc::new(SleepyEngine));
        dispatcher
    }

    fn params(statement: &str, sleep_ms: u64) -> QueryParams {
        match json!({
            "statement": statement,
            "data_source": "sleepy",
            "options": {"sleep_ms": sleep_ms, "format": "csv"}
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_run_completes_in_one_call() {
        let outcome = dispatcher().execute(&params("SELECT 1", 10), None).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Done("statement\nSELECT 1\n".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_run_resumes_with_token() {
        let dispatcher = dispatcher();
        let params = params("SELECT 2", 5_000);

        let token = match dispatcher.execute(&params, None).await.unwrap() {
            DispatchOutcome::Pending(token) => token,
            other => panic!("expected pending, got {:?}", other),
        };
        assert_eq!(token.data_source, "sleepy");
        assert_eq!(dispatcher.registry().len(), 1);

        let outcome = dispatcher.execute(&params, Some(&token)).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Done("statement\nSELECT 2\n".to_string()));
        assert!(dispatcher.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_blocks_past_budget() {
        let dispatcher = dispatcher();
        let started = tokio::time::Instant::now();
        let outcome = dispatcher.execute(&params("x", 60_000), None).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Pending(_)));
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_failure_is_verbatim() {
        let outcome = dispatcher().execute(&params("fail", 0), None).await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Failed("relation \"nope\" does not exist".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_cannot_resume() {
        let dispatcher = dispatcher();
        let params = params("x", 60_000);
        let token = match dispatcher.execute(&params, None).await.unwrap() {
            DispatchOutcome::Pending(token) => token,
            other => panic!("expected pending, got {:?}", other),
        };

        assert!(dispatcher.cancel(&token.run_id));
        let outcome = dispatcher.execute(&params, Some(&token)).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Failed(msg) if msg.contains("Unknown or expired")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_for_other_data_source_is_rejected() {
        let dispatcher = dispatcher();
        let params = params("x", 60_000);
        let token = match dispatcher.execute(&params, None).await.unwrap() {
            DispatchOutcome::Pending(token) => token,
            other => panic!("expected pending, got {:?}", other),
        };

        // Token and request disagree
        let mut elsewhere = params.clone();
        elsewhere.insert("data_source".to_string(), json!("warehouse"));
        let err = dispatcher.execute(&elsewhere, Some(&token)).await.unwrap_err();
        assert!(matches!(err, Error::MalformedInput(ref msg) if msg.contains("belongs to data source")));

        // Token rewritten to match the request but not the run
        let mut forged = token.clone();
        forged.data_source = "other".to_string();
        let mut other = params.clone();
        other.insert("data_source".to_string(), json!("other"));
        let err = dispatcher.execute(&other, Some(&forged)).await.unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));

        // The run is still there for its rightful poller
        assert!(dispatcher.registry().contains(&token.run_id));
    }

    #[tokio::test]
    async fn test_unknown_data_source() {
        let mut params = params("x", 0);
        params.insert("data_source".to_string(), json!("warehouse"));
        let err = dispatcher().execute(&params, None).await.unwrap_err();
        assert!(matches!(err, Error::MalformedInput(msg) if msg.contains("warehouse")));
    }
}
