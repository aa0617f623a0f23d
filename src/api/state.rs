use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::fetcher::MediaFetcher;
use crate::history::HistoryStore;
use crate::media::MediaProber;
use crate::observability::Metrics;
use crate::pipeline::VideoProcessor;
use crate::storage::ObjectStorage;
use crate::tasks::{ProgressRegistry, TaskRunner};
use crate::transcription::Transcriber;

/// External collaborators the server is wired with
pub struct Services {
    pub fetcher: Arc<dyn MediaFetcher>,
    pub prober: Arc<dyn MediaProber>,
    pub storage: Arc<dyn ObjectStorage>,
    pub transcriber: Arc<dyn Transcriber>,
    pub history: Arc<dyn HistoryStore>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ProgressRegistry>,
    pub runner: Arc<TaskRunner>,
    pub processor: Arc<VideoProcessor>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub storage: Arc<dyn ObjectStorage>,
    pub history: Arc<dyn HistoryStore>,
    pub metrics: Arc<Metrics>,
    /// Tripped once the server starts shutting down
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Starts the worker pool, so this must run inside a tokio runtime.
    pub fn new(config: Config, services: Services) -> Self {
        let metrics = Arc::new(Metrics::new());
        let registry = Arc::new(ProgressRegistry::new());
        let runner = TaskRunner::start(registry.clone(), &config.worker, metrics.clone());

        let processor = VideoProcessor::new(
            &config,
            services.prober,
            services.storage.clone(),
            services.transcriber,
            services.history.clone(),
            metrics.clone(),
        );

        Self {
            config: Arc::new(config),
            registry,
            runner: Arc::new(runner),
            processor: Arc::new(processor),
            fetcher: services.fetcher,
            storage: services.storage,
            history: services.history,
            metrics,
            shutdown: CancellationToken::new(),
        }
    }
}
