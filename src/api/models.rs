//! Request and response bodies of the HTTP API.
//!
//! Successful responses carry a `success` flag and a human readable
//! `message`; failures are always an [`ErrorResponse`] `{code, message}`.
//!
//! ```json
//! POST /download
//! {"url": "check this out https://www.youtube.com/watch?v=abc"}
//!
//! 202 Accepted
//! {"success": true, "message": "download started", "task_id": "0192..."}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::history::{HistoryRecord, VideoSource};
use crate::observability::MetricsSnapshot;
use crate::tasks::TaskId;
use crate::transcription::Sentence;

pub const DEFAULT_PER_PAGE: usize = 10;
pub const MAX_PER_PAGE: usize = 100;
pub const RECENT_LIMIT: usize = 10;

/// `POST /download`; the URL may be embedded in arbitrary text
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
}

/// `POST /transcribe` and `POST /transcribe/async`
#[derive(Debug, Clone, Deserialize)]
pub struct TranscribeRequest {
    #[serde(default)]
    pub filename: String,
    #[serde(default = "default_source")]
    pub source: VideoSource,
    #[serde(default)]
    pub force: bool,
}

fn default_source() -> VideoSource {
    VideoSource::Upload
}

/// Response for any request that queued a background task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAccepted {
    pub success: bool,
    pub message: String,
    pub task_id: TaskId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionBody {
    pub sentences: Vec<Sentence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub success: bool,
    pub message: String,
    pub transcription: TranscriptionBody,
    pub video_url: Option<String>,
    pub history_id: String,
    /// Served from an earlier transcription
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    /// Stored file name inside the records directory
    pub title: String,
    pub history_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryRecord>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentHistory {
    pub success: bool,
    pub history: Vec<HistoryRecord>,
}

/// Plain acknowledgement for deletes and cancellations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: HashMap<&'static str, &'static str>,
    pub version: &'static str,
    pub workers: usize,
    pub active_tasks: usize,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}
