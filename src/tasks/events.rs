//! Progress events and the per-task channel endpoints

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::humanize::format_bytes;

/// One update published by a worker, serialized as a single JSON object
///
/// ```json
/// {"status":"downloading","downloaded":"12.3MB","total":"50.0MB","speed":"1.2MB/s","eta":"30","progress":24.6}
/// {"status":"completed","video_path":"my_video_20240101_120000.mp4"}
/// {"status":"error","message":"..."}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressEvent {
    Downloading {
        downloaded: String,
        total: String,
        speed: String,
        eta: String,
        progress: f64,
    },
    Processing {
        stage: ProcessStage,
    },
    Completed {
        video_path: String,
    },
    Error {
        message: String,
    },
}

/// Stages reported by a background transcription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStage {
    Validating,
    Uploading,
    Transcribing,
    Saving,
}

impl ProgressEvent {
    /// Builds a `downloading` event from raw downloader counters.
    pub fn downloading(
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        speed: Option<f64>,
        eta_secs: Option<u64>,
    ) -> Self {
        ProgressEvent::Downloading {
            downloaded: format_bytes(downloaded_bytes as f64),
            total: format_bytes(total_bytes.unwrap_or(0) as f64),
            speed: format!("{}/s", format_bytes(speed.unwrap_or(0.0))),
            eta: eta_secs
                .map(|secs| secs.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            progress: percent(downloaded_bytes, total_bytes),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. } | ProgressEvent::Error { .. }
        )
    }
}

/// Percentage in [0, 100], one decimal; 0 when the total is unknown or zero.
pub fn percent(downloaded: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => {
            let ratio = (downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
            (ratio * 10.0).round() / 10.0
        }
        _ => 0.0,
    }
}

/// Item travelling through a progress channel
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    Event(ProgressEvent),
    /// End-of-stream sentinel, always the last message of a channel
    End,
}

/// Write half of a progress channel, held by exactly one worker
///
/// Clones share the last non-terminal event, which [`heartbeat`] repeats
/// while a job is quiet.
///
/// [`heartbeat`]: ProgressSender::heartbeat
#[derive(Debug, Clone)]
pub struct ProgressSender {
    inner: UnboundedSender<ProgressMessage>,
    last: Arc<Mutex<Option<ProgressEvent>>>,
}

impl ProgressSender {
    pub(crate) fn new(inner: UnboundedSender<ProgressMessage>) -> Self {
        Self {
            inner,
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Publishes an event; returns false once the reader is gone.
    pub fn send(&self, event: ProgressEvent) -> bool {
        if !event.is_terminal() {
            *self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
                Some(event.clone());
        }
        self.publish(event)
    }

    /// Repeats the last published event so an idle stream stays alive.
    ///
    /// Does nothing before the job has published anything.
    pub(crate) fn heartbeat(&self) {
        let last = self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(event) = last {
            self.publish(event);
        }
    }

    fn publish(&self, event: ProgressEvent) -> bool {
        match self.inner.send(ProgressMessage::Event(event)) {
            Ok(()) => true,
            Err(_) => {
                debug!("Progress reader dropped, event discarded");
                false
            }
        }
    }

    /// Enqueues the sentinel. Nothing sent afterwards is ever observed.
    pub(crate) fn finish(&self) {
        let _ = self.inner.send(ProgressMessage::End);
    }
}

/// Read half of a progress channel, taken by exactly one stream consumer
#[derive(Debug)]
pub struct ProgressReceiver {
    inner: UnboundedReceiver<ProgressMessage>,
}

impl ProgressReceiver {
    pub(crate) fn new(inner: UnboundedReceiver<ProgressMessage>) -> Self {
        Self { inner }
    }

    /// Waits for the next event; `None` once the sentinel is read.
    ///
    /// A channel whose writer disappeared without a sentinel also ends.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        match self.inner.recv().await {
            Some(ProgressMessage::Event(event)) => Some(event),
            Some(ProgressMessage::End) | None => None,
        }
    }
}
