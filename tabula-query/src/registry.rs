use crate::engine::QueryResult;
use crate::token::ContinuationToken;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tabula_core::Result;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

pub type RunHandle = JoinHandle<Result<QueryResult>>;

struct RunEntry {
    handle: RunHandle,
    data_source: String,
    last_polled: Instant,
}

/// A run taken out of the registry by the request currently resuming it.
pub struct ClaimedRun {
    pub handle: RunHandle,
    pub data_source: String,
}

/// In-flight runs that exceeded a request's time budget, keyed by run id.
///
/// Entries not polled within the TTL are aborted by [`RunRegistry::sweep`].
/// Dropping the registry aborts everything still parked.
pub struct RunRegistry {
    runs: DashMap<Uuid, RunEntry>,
    ttl: Duration,
}

impl RunRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            runs: DashMap::new(),
            ttl,
        }
    }

    /// Park a run and issue a token for it.
    pub fn park(&self, run_id: Uuid, data_source: &str, handle: RunHandle) -> ContinuationToken {
        self.runs.insert(
            run_id,
            RunEntry {
                handle,
                data_source: data_source.to_string(),
                last_polled: Instant::now(),
            },
        );
        debug!("Parked run {} ({} in flight)", run_id, self.runs.len());
        ContinuationToken::new(run_id, data_source)
    }

    /// Remove a run so the caller can wait on it. Unknown, expired and
    /// cancelled runs return `None`, as does a run another request has
    /// already claimed.
    pub fn claim(&self, run_id: &Uuid) -> Option<ClaimedRun> {
        self.runs.remove(run_id).map(|(_, entry)| ClaimedRun {
            handle: entry.handle,
            data_source: entry.data_source,
        })
    }

    /// Abort a parked run. Returns whether it was found.
    pub fn cancel(&self, run_id: &Uuid) -> bool {
        match self.runs.remove(run_id) {
            Some((_, entry)) => {
                entry.handle.abort();
                info!("Cancelled run {}", run_id);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, run_id: &Uuid) -> bool {
        self.runs.contains_key(run_id)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Abort and forget runs idle for longer than the TTL.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Uuid> = self
            .runs
            .iter()
            .filter(|entry| now.duration_since(entry.last_polled) >= self.ttl)
            .map(|entry| *entry.key())
            .collect();

        let mut removed = 0;
        for run_id in expired {
            if let Some((_, entry)) = self.runs.remove(&run_id) {
                entry.handle.abort();
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Expired {} abandoned runs", removed);
        }
        removed
    }

    /// Sweep on a fixed interval until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match registry.upgrade() {
                    Some(registry) => {
                        registry.sweep();
                    }
                    None => break,
                }
            }
        })
    }
}

impl Drop for RunRegistry {
    fn drop(&mut self) {
        for entry in self.runs.iter() {
            entry.handle.abort();
        }
    }
}
