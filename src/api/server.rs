use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tower_http::{
    decompression::RequestDecompressionLayer, limit::RequestBodyLimitLayer, services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use super::{
    progress::stream_progress,
    services::{
        cancel_task, delete_history, get_history, health, list_history, recent_history,
        submit_download, transcribe_async, transcribe_video, upload_video,
    },
    state::{AppState, Services},
};
use crate::config::Config;
use crate::fetcher::YtDlpFetcher;
use crate::history::FjallHistoryStore;
use crate::media::FfprobeProber;
use crate::storage::StorageClient;
use crate::transcription::{DashScopeClient, DisabledTranscriber, Transcriber, TranscriptionError};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Builds the HTTP surface on top of an already wired [`AppState`].
pub fn router(state: AppState) -> Router {
    let max_upload = usize::try_from(state.config.server.max_upload_bytes.as_u64())
        .unwrap_or(usize::MAX);
    let videos = ServeDir::new(&state.config.server.records_dir);

    Router::new()
        .route(
            "/upload",
            post(upload_video)
                .layer::<_, std::convert::Infallible>(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_upload)),
        )
        .route("/download", post(submit_download))
        .route("/progress/{task_id}", get(stream_progress))
        .route("/tasks/{task_id}", delete(cancel_task))
        .route("/transcribe", post(transcribe_video))
        .route("/transcribe/async", post(transcribe_async))
        .route("/api/history", get(list_history))
        .route("/api/history/recent", get(recent_history))
        .route("/api/history/{id}", get(get_history).delete(delete_history))
        .route("/health", get(health))
        .nest_service("/video", videos)
        .with_state(state)
        // gzip request bodies are decoded before the handlers see them
        .layer(RequestDecompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Wires the production collaborators from `config` and serves until
/// Ctrl+C or SIGTERM. In-flight tasks are abandoned on shutdown.
pub async fn run(config: Config) -> Result<(), AnyError> {
    tokio::fs::create_dir_all(&config.server.records_dir).await?;

    info!(path = %config.server.history_path.display(), "Opening history store");
    let history = Arc::new(
        FjallHistoryStore::open(&config.server.history_path)
            .map_err(|e| format!("Failed to open history store: {e}"))?,
    );

    info!(provider = ?config.storage.provider, bucket = %config.storage.bucket, "Initializing object storage");
    let storage = StorageClient::from_config(&config.storage)
        .map_err(|e| format!("Failed to initialize storage: {e}"))?;

    let transcriber: Arc<dyn Transcriber> = match DashScopeClient::new(&config.transcription) {
        Ok(client) => Arc::new(client),
        Err(TranscriptionError::MissingApiKey) => {
            warn!("No transcription API key configured, transcription requests will fail");
            Arc::new(DisabledTranscriber)
        }
        Err(e) => return Err(e.into()),
    };

    let services = Services {
        fetcher: Arc::new(YtDlpFetcher::new(&config.fetcher)),
        prober: Arc::new(FfprobeProber::new(&config.probe)),
        storage: Arc::new(storage),
        transcriber,
        history: history.clone(),
    };

    let address = config.server.bind_addr;
    let state = AppState::new(config, services);
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "vidscribe API listening");

    // open progress streams hold their connections, so they are told to end
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    if let Err(e) = history.persist() {
        error!(error = %e, "Failed to persist history store on shutdown");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
