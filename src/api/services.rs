use std::collections::HashMap;

use axum::{
    Json,
    extract::{Multipart, Path as UrlPath, Query, State, multipart::Field},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{
    models::{
        Ack, DownloadRequest, HealthResponse, HistoryPage, HistoryQuery, RECENT_LIMIT,
        RecentHistory, TaskAccepted, TranscribeRequest, TranscribeResponse, TranscriptionBody,
        UploadResponse,
    },
    state::AppState,
    utils::{check_upload_size, require_json},
    validation::{validate_download, validate_history_query, validate_transcribe},
};
use crate::api::error::ApiError;
use crate::history::{HistoryRecord, VideoSource};
use crate::media::{create_unique_file, secure_filename};
use crate::pipeline::{DownloadJob, ProcessJob, ProcessRequest};
use crate::tasks::{ProcessStage, TaskId};

/// Stores a multipart `file` field in the records directory (POST /upload)
///
/// The client file name is made safe first and gets a `_N` suffix when the
/// name is already taken. A history record with source `upload` is created;
/// failing to write it does not fail the upload.
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let max_size = state.config.server.max_upload_bytes.as_u64();
    let mut field = loop {
        match multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, max_size))?
        {
            Some(field) if field.name() == Some("file") => break field,
            Some(_) => continue,
            None => return Err(ApiError::InvalidPayload("no file part in request".into())),
        }
    };

    let original = field.file_name().unwrap_or_default().to_string();
    if original.is_empty() {
        return Err(ApiError::InvalidPayload("no file selected".into()));
    }
    if !state.config.limits.is_allowed(&original) {
        return Err(ApiError::InvalidPayload(format!(
            "unsupported file type: {original}"
        )));
    }
    let safe = secure_filename(&original)
        .filter(|name| state.config.limits.is_allowed(name))
        .ok_or_else(|| ApiError::InvalidPayload(format!("invalid file name: {original}")))?;

    let records_dir = &state.config.server.records_dir;
    tokio::fs::create_dir_all(records_dir)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let (filename, file) = create_unique_file(records_dir, &safe)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let path = records_dir.join(&filename);

    let written = match save_field(&mut field, file, max_size).await {
        Ok(written) => written,
        Err(e) => {
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %remove_err, "Failed to remove incomplete upload");
            }
            return Err(e);
        }
    };

    info!(filename = %filename, bytes = written, "Video uploaded");

    let record = HistoryRecord::builder()
        .title(filename.as_str())
        .source(VideoSource::Upload)
        .video_path(filename.as_str())
        .build();
    let history_id = match state.history.insert(record) {
        Ok(record) => Some(record.id),
        Err(e) => {
            warn!(filename = %filename, error = %e, "Failed to record upload in history");
            None
        }
    };

    Ok(Json(UploadResponse {
        success: true,
        message: "file uploaded".to_string(),
        title: filename,
        history_id,
    }))
}

async fn save_field(
    field: &mut Field<'_>,
    mut file: tokio::fs::File,
    max_size: u64,
) -> Result<u64, ApiError> {
    let mut written = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, max_size))?
    {
        written += chunk.len() as u64;
        check_upload_size(written, max_size)?;
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
    }
    file.flush()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(written)
}

fn multipart_error(err: axum::extract::multipart::MultipartError, limit: u64) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge(limit);
    }
    ApiError::InvalidPayload(err.body_text())
}

/// Queues a remote download (POST /download)
///
/// Responds 202 with the task id; progress is read from
/// `GET /progress/{task_id}`.
pub async fn submit_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    require_json(&headers)?;
    let request: DownloadRequest = serde_json::from_slice(&body)?;
    let url = validate_download(&request)?;

    let job = DownloadJob::new(
        url.clone(),
        state.config.server.records_dir.clone(),
        state.config.fetcher.title_max_chars,
        state.fetcher.clone(),
        state.history.clone(),
    );
    let task_id = state.runner.submit(Box::new(job))?;

    info!(%task_id, url = %url, "Download accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAccepted {
            success: true,
            message: "download started".to_string(),
            task_id,
        }),
    ))
}

/// DELETE /tasks/{task_id}
pub async fn cancel_task(
    State(state): State<AppState>,
    UrlPath(task_id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let task_id = TaskId::from(task_id);
    if !state.registry.cancel(&task_id) {
        return Err(ApiError::NotFound(format!("task {task_id}")));
    }

    Ok(Json(Ack {
        success: true,
        message: "cancellation requested".to_string(),
    }))
}

fn parse_transcribe(headers: &HeaderMap, body: &[u8]) -> Result<ProcessRequest, ApiError> {
    require_json(headers)?;
    let request: TranscribeRequest = serde_json::from_slice(body)?;
    validate_transcribe(&request)?;

    Ok(ProcessRequest {
        filename: request.filename.trim().to_string(),
        source: request.source,
        force: request.force,
    })
}

/// Transcribes a local video and waits for the result (POST /transcribe)
pub async fn transcribe_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request = parse_transcribe(&headers, &body)?;

    // a client disconnect drops this future instead of tripping the token
    let cancel = CancellationToken::new();
    let outcome = state
        .processor
        .process(&request, &|_: ProcessStage| {}, &cancel)
        .await?;

    let message = if outcome.cached {
        "transcription loaded from history"
    } else {
        "transcription completed"
    };

    Ok(Json(TranscribeResponse {
        success: true,
        message: message.to_string(),
        transcription: TranscriptionBody {
            sentences: outcome.sentences,
        },
        video_url: outcome.record.video_url,
        history_id: outcome.record.id,
        cached: outcome.cached,
    }))
}

/// Queues a transcription with `processing` progress events (POST /transcribe/async)
pub async fn transcribe_async(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request = parse_transcribe(&headers, &body)?;
    let filename = request.filename.clone();

    let job = ProcessJob::new(state.processor.clone(), request);
    let task_id = state.runner.submit(Box::new(job))?;

    info!(%task_id, filename = %filename, "Transcription accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAccepted {
            success: true,
            message: "transcription started".to_string(),
            task_id,
        }),
    ))
}

/// GET /api/history?page&per_page, newest first
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = validate_history_query(&query)?;

    let items = state.history.page(page, per_page)?;
    let total = state.history.count()?;

    Ok(Json(HistoryPage {
        items,
        page,
        per_page,
        total,
    }))
}

/// GET /api/history/recent
pub async fn recent_history(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let history = state.history.list_recent(RECENT_LIMIT)?;
    Ok(Json(RecentHistory {
        success: true,
        history,
    }))
}

/// GET /api/history/{id}
pub async fn get_history(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .history
        .get(&id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("history record {id}")))
}

/// DELETE /api/history/{id}
///
/// Removes the record and, best effort, its uploaded copy. The local file
/// in the records directory is kept.
pub async fn delete_history(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .history
        .delete(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("history record {id}")))?;

    if let Some(key) = record.object_key.as_deref() {
        if let Err(e) = state.storage.delete(key).await {
            warn!(id = %id, key, error = %e, "Failed to delete stored object for history record");
        }
    }

    info!(id = %id, title = %record.title, "History record deleted");
    Ok(Json(Ack {
        success: true,
        message: "history record deleted".to_string(),
    }))
}

/// Health check endpoint (GET /health)
///
/// Reports component status, the number of live progress channels and the
/// task counters; 503 when any component is down.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();

    let workers_ok = state.runner.health_check();
    components.insert("workers", if workers_ok { "healthy" } else { "unhealthy" });

    let history_ok = state.history.count().is_ok();
    components.insert("history", if history_ok { "healthy" } else { "unhealthy" });

    let all_healthy = workers_ok && history_ok;
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "unhealthy" },
        components,
        version: env!("CARGO_PKG_VERSION"),
        workers: state.runner.num_workers(),
        active_tasks: state.registry.len(),
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}
