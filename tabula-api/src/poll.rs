use crate::rest::RunResponse;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{Error, Result};
use tabula_query::request::CONTINUATION_KEY;
use tabula_query::QueryParams;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Where a poll loop currently is. `attempt` counts submissions, from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Requesting { attempt: u32 },
    Retrying { attempt: u32 },
    Completed,
    Failed(String),
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Completed | PollState::Failed(_))
    }
}

/// Drives one query to completion by re-submitting it with the latest
/// continuation token until the server returns a final result.
///
/// Use one correlator per query. Dropping the `run_query` future stops the
/// loop and asks the server to cancel the pending run.
pub struct PollCorrelator {
    transport: Arc<dyn Transport>,
    interval: Duration,
    state: watch::Sender<PollState>,
}

impl PollCorrelator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (state, _) = watch::channel(PollState::Idle);
        Self {
            transport,
            interval: DEFAULT_POLL_INTERVAL,
            state,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    /// Resolve `params` to rendered output, or fail with the transport's or
    /// engine's message.
    pub async fn run_query(&self, params: QueryParams) -> Result<String> {
        let mut request = params;
        let mut pending = PendingRun {
            transport: self.transport.clone(),
            run_id: None,
        };
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.set(PollState::Requesting { attempt });

            let response = match self.transport.run(&request).await {
                Ok(response) => response,
                Err(e) => {
                    let message = match e {
                        Error::Transport(message) => message,
                        other => other.to_string(),
                    };
                    // A run with a token outstanding is still cancelled on drop
                    warn!("Query transport failed: {}", message);
                    self.set(PollState::Failed(message.clone()));
                    return Err(Error::Transport(message));
                }
            };

            match response {
                RunResponse::Done { payload } => {
                    info!("Query completed after {} request(s)", attempt);
                    pending.settle();
                    self.set(PollState::Completed);
                    return Ok(payload);
                }
                RunResponse::Error { message } => {
                    warn!("Query failed: {}", message);
                    pending.settle();
                    self.set(PollState::Failed(message.clone()));
                    return Err(Error::Execution(message));
                }
                RunResponse::Pending { token } => {
                    debug!("Run {} still pending", token.run_id);
                    pending.run_id = Some(token.run_id);
                    request.insert(CONTINUATION_KEY.to_string(), token.to_value()?);
                    self.set(PollState::Retrying { attempt });
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
    }

    fn set(&self, state: PollState) {
        self.state.send_replace(state);
    }
}

/// Cancels the server-side run if the loop is abandoned while a token is
/// outstanding.
struct PendingRun {
    transport: Arc<dyn Transport>,
    run_id: Option<Uuid>,
}

impl PendingRun {
    fn settle(&mut self) {
        self.run_id = None;
    }
}

impl Drop for PendingRun {
    fn drop(&mut self) {
        let Some(run_id) = self.run_id.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let transport = self.transport.clone();
        runtime.spawn(async move {
            if let Err(e) = transport.cancel(run_id).await {
                debug!("Cancel of run {} failed: {}", run_id, e);
            }
        });
    }
}
