use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::fetcher::{DownloadProgress, FetchError, MediaFetcher};
use crate::history::{HistoryRecord, HistoryStore, VideoSource};
use crate::media::{create_unique_file, sanitize_filename};
use crate::tasks::{ProgressEvent, TaskContext, TaskError, TaskJob};

/// Downloads one remote video into the records directory
pub struct DownloadJob {
    url: String,
    records_dir: PathBuf,
    title_max_chars: usize,
    fetcher: Arc<dyn MediaFetcher>,
    history: Arc<dyn HistoryStore>,
}

impl DownloadJob {
    /// `url` must already be extracted and validated.
    pub fn new(
        url: String,
        records_dir: PathBuf,
        title_max_chars: usize,
        fetcher: Arc<dyn MediaFetcher>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            url,
            records_dir,
            title_max_chars,
            fetcher,
            history,
        }
    }

    fn record_history(&self, title: &str, filename: &str, duration: Option<f64>) {
        let record = HistoryRecord::builder()
            .title(title)
            .source(VideoSource::Youtube)
            .video_path(filename)
            .maybe_duration_secs(duration)
            .build();

        match self.history.insert(record) {
            Ok(record) => debug!(history_id = %record.id, "Download recorded in history"),
            Err(e) => warn!(error = %e, filename, "Failed to record download in history"),
        }
    }
}

#[async_trait]
impl TaskJob for DownloadJob {
    fn kind(&self) -> &'static str {
        "download"
    }

    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<String, TaskError> {
        let info = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(FetchError::Cancelled.into()),
            info = self.fetcher.probe(&self.url) => info?,
        };

        let wanted = sanitize_filename(&info.title, self.title_max_chars, Local::now().naive_local());
        tokio::fs::create_dir_all(&self.records_dir).await?;
        // reserve the name; a same-titled download in the same second gets `_N`
        let (filename, _) = create_unique_file(&self.records_dir, &wanted).await?;
        let output = self.records_dir.join(&filename);

        info!(url = %self.url, filename = %filename, "Downloading video");

        let progress = ctx.progress.clone();
        let on_progress = move |tick: DownloadProgress| {
            progress.send(ProgressEvent::downloading(
                tick.downloaded_bytes,
                tick.total_bytes,
                tick.speed,
                tick.eta_secs,
            ));
        };

        if let Err(e) = self
            .fetcher
            .fetch(&self.url, &output, &on_progress, &ctx.cancel)
            .await
        {
            remove_partial(&output).await;
            return Err(e.into());
        }

        let written = tokio::fs::metadata(&output)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        if written == 0 {
            remove_partial(&output).await;
            return Err("downloaded file not found".into());
        }

        self.record_history(&info.title, &filename, info.duration);
        Ok(filename)
    }
}

/// Best-effort removal of a failed download and its `.part` sibling
async fn remove_partial(output: &Path) {
    let mut part = output.as_os_str().to_owned();
    part.push(".part");

    for path in [output.to_path_buf(), PathBuf::from(part)] {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "Removed partial download"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial download"),
        }
    }
}
