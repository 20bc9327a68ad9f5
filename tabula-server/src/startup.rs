// Application wiring: storage, upload service, dispatcher

use crate::http::ApiState;
use std::sync::Arc;
use tabula_core::TabulaConfig;
use tabula_query::{Dispatcher, QueryEngine, RunRegistry, UploadsEngine};
use tabula_storage::{InMemoryStore, StorageConnection, UploadService};
use tokio::task::JoinHandle;
use tracing::info;

/// Everything the HTTP layer needs, built from configuration.
pub struct Application {
    pub state: ApiState,
    pub registry: Arc<RunRegistry>,
}

impl Application {
    /// Wire the in-process store, the upload service and a dispatcher with
    /// the built-in `uploads` data source plus any `engines` given.
    pub fn build(config: &TabulaConfig, engines: Vec<Arc<dyn QueryEngine>>) -> Self {
        let storage: Arc<dyn StorageConnection> = Arc::new(InMemoryStore::new());
        let schema = config.uploads.schema.clone();

        let uploads = Arc::new(
            UploadService::new(storage.clone(), schema.clone())
                .with_max_file_bytes(config.uploads.max_file_bytes),
        );

        let mut dispatcher = Dispatcher::from_config(&config.query);
        dispatcher.register(Arc::new(UploadsEngine::new(storage, schema)));
        for engine in engines {
            dispatcher.register(engine);
        }
        let registry = dispatcher.registry().clone();
        info!("Data sources: {}", dispatcher.data_sources().join(", "));

        Self {
            state: ApiState {
                uploads,
                dispatcher: Arc::new(dispatcher),
                max_file_bytes: config.uploads.max_file_bytes,
            },
            registry,
        }
    }

    /// Start expiring abandoned runs in the background.
    pub fn spawn_sweeper(&self, config: &TabulaConfig) -> JoinHandle<()> {
        info!(
            "Expiring runs idle for {:?}, checking every {:?}",
            config.query.run_ttl(),
            config.query.sweep_interval()
        );
        self.registry.spawn_sweeper(config.query.sweep_interval())
    }
}
