//! Remote media fetching
//!
//! [`MediaFetcher`] is the seam between the download job and the external
//! downloader. The production implementation drives the `yt-dlp` binary;
//! tests substitute an in-process fake.

pub mod progress;
pub mod ytdlp;

pub use progress::parse_progress_line;
pub use ytdlp::YtDlpFetcher;

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("downloader binary not found: {0}")]
    NotInstalled(String),

    #[error("failed to read media info: {0}")]
    ProbeFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("download cancelled")]
    Cancelled,

    #[error("invalid media info: {0}")]
    InvalidInfo(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Metadata of a remote video, read before downloading it
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaInfo {
    #[serde(default = "default_title")]
    pub title: String,
    /// Seconds, when the site reports it
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub webpage_url: Option<String>,
}

fn default_title() -> String {
    "video".to_string()
}

/// Raw counters reported by the downloader for one progress tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Bytes per second
    pub speed: Option<f64>,
    pub eta_secs: Option<u64>,
}

/// Callback receiving every progress tick, in order
pub type ProgressFn<'a> = &'a (dyn Fn(DownloadProgress) + Send + Sync);

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Reads title and duration without downloading.
    async fn probe(&self, url: &str) -> Result<MediaInfo>;

    /// Downloads `url` to exactly `output`.
    ///
    /// Must stop promptly with [`FetchError::Cancelled`] once `cancel` fires.
    async fn fetch(
        &self,
        url: &str,
        output: &Path,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<()>;
}
