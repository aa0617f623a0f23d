use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, VideoLimits};
use crate::history::{HistoryError, HistoryRecord, HistoryStore, HistoryUpdate, VideoSource};
use crate::media::{MediaProber, ProbeError, is_plain_filename, object_key};
use crate::observability::Metrics;
use crate::storage::{ObjectStorage, StorageError};
use crate::tasks::{ProcessStage, ProgressEvent, TaskContext, TaskError, TaskJob};
use crate::transcription::{
    Sentence, Transcriber, TranscriptionError, clean_sentences, render_plain, render_timestamped,
    transcribe,
};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{0}")]
    Invalid(String),

    #[error("video file not found: {0}")]
    NotFound(String),

    #[error("video file too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("video too long: {secs}s exceeds the {limit}s limit")]
    TooLong { secs: u64, limit: u64 },

    #[error("video file check failed: {0}")]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// True for failures caused by the request rather than a collaborator
    ///
    /// A probe that ran but could not read the file counts as a bad video;
    /// a missing ffprobe or an I/O failure is the server's problem.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ProcessError::Invalid(_)
                | ProcessError::NotFound(_)
                | ProcessError::TooLarge { .. }
                | ProcessError::TooLong { .. }
                | ProcessError::Probe(ProbeError::Failed(_) | ProbeError::InvalidOutput(_))
        )
    }
}

/// Which local video to transcribe
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub filename: String,
    pub source: VideoSource,
    /// Transcribe again even when a transcript exists
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub record: HistoryRecord,
    pub sentences: Vec<Sentence>,
    /// Served from an earlier transcription
    pub cached: bool,
}

/// Validate, upload, transcribe and persist one local video
///
/// All checks on the local file run before any network call, and the
/// history record is written only after the transcript is complete.
pub struct VideoProcessor {
    records_dir: PathBuf,
    limits: VideoLimits,
    key_prefix: String,
    sign_ttl: Duration,
    prober: Arc<dyn MediaProber>,
    storage: Arc<dyn ObjectStorage>,
    transcriber: Arc<dyn Transcriber>,
    history: Arc<dyn HistoryStore>,
    metrics: Arc<Metrics>,
}

impl VideoProcessor {
    pub fn new(
        config: &Config,
        prober: Arc<dyn MediaProber>,
        storage: Arc<dyn ObjectStorage>,
        transcriber: Arc<dyn Transcriber>,
        history: Arc<dyn HistoryStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            records_dir: config.server.records_dir.clone(),
            limits: config.limits.clone(),
            key_prefix: config.storage.key_prefix.clone(),
            sign_ttl: config.storage.sign_ttl(),
            prober,
            storage,
            transcriber,
            history,
            metrics,
        }
    }

    pub async fn process(
        &self,
        request: &ProcessRequest,
        on_stage: &(dyn Fn(ProcessStage) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome, ProcessError> {
        let filename = request.filename.as_str();
        on_stage(ProcessStage::Validating);
        let metadata = self.validate(filename).await?;

        let existing = match self.history.find_by_path(filename, request.source)? {
            Some(record) => Some(record),
            None => self.history.find(filename, request.source)?,
        };

        if let Some(record) = existing.filter(|r| r.transcribed && !request.force) {
            info!(filename, history_id = %record.id, "Returning stored transcript");
            return Ok(ProcessOutcome {
                sentences: record.sentences.clone(),
                record,
                cached: true,
            });
        }

        on_stage(ProcessStage::Uploading);
        let key = object_key(&self.key_prefix, filename);
        let local = self.records_dir.join(filename);
        self.storage.put_file(&key, &local).await?;

        let transcribed = async {
            let video_url = self.storage.sign_url(&key, self.sign_ttl).await?;
            on_stage(ProcessStage::Transcribing);
            let sentences = transcribe(self.transcriber.as_ref(), &video_url, cancel).await?;
            Ok::<_, ProcessError>((video_url, clean_sentences(sentences)))
        }
        .await;

        let (video_url, sentences) = match transcribed {
            Ok(done) => done,
            Err(e) => {
                self.discard_upload(&key).await;
                return Err(e);
            }
        };

        on_stage(ProcessStage::Saving);
        let update = HistoryUpdate {
            object_key: Some(key),
            video_url: Some(video_url),
            duration_secs: Some(round2(metadata.duration.as_secs_f64())),
            resolution: metadata.resolution(),
            fps: metadata.fps,
            transcription: Some(render_plain(&sentences)),
            timestamped_transcription: Some(render_timestamped(&sentences)),
            sentences: Some(sentences.clone()),
            transcribed: Some(true),
        };

        let candidate = HistoryRecord::builder()
            .title(filename)
            .source(request.source)
            .video_path(filename)
            .build();
        let record = self.history.upsert(candidate, update)?;

        self.metrics.transcription_completed();
        info!(filename, history_id = %record.id, sentences = sentences.len(), "Video transcribed");

        Ok(ProcessOutcome {
            record,
            sentences,
            cached: false,
        })
    }

    async fn validate(&self, filename: &str) -> Result<crate::media::VideoMetadata, ProcessError> {
        if !is_plain_filename(filename) {
            return Err(ProcessError::Invalid(format!("invalid file name: {filename}")));
        }
        if !self.limits.is_allowed(filename) {
            return Err(ProcessError::Invalid(format!(
                "unsupported file type, allowed: {}",
                self.limits.allowed_extensions.join(", ")
            )));
        }

        let path = self.records_dir.join(filename);
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(ProcessError::NotFound(filename.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProcessError::NotFound(filename.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let limit = self.limits.max_video_size.as_u64();
        if meta.len() > limit {
            return Err(ProcessError::TooLarge {
                size: meta.len(),
                limit,
            });
        }

        let metadata = self.prober.probe(&path).await?;
        let max = self.limits.max_video_duration();
        if metadata.duration > max {
            return Err(ProcessError::TooLong {
                secs: metadata.duration.as_secs(),
                limit: max.as_secs(),
            });
        }

        Ok(metadata)
    }

    async fn discard_upload(&self, key: &str) {
        if let Err(e) = self.storage.delete(key).await {
            warn!(key, error = %e, "Failed to delete uploaded copy after failure");
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Background transcription reporting `processing` stages
pub struct ProcessJob {
    processor: Arc<VideoProcessor>,
    request: ProcessRequest,
}

impl ProcessJob {
    pub fn new(processor: Arc<VideoProcessor>, request: ProcessRequest) -> Self {
        Self { processor, request }
    }
}

#[async_trait]
impl TaskJob for ProcessJob {
    fn kind(&self) -> &'static str {
        "transcribe"
    }

    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<String, TaskError> {
        let progress = ctx.progress.clone();
        let on_stage = move |stage: ProcessStage| {
            progress.send(ProgressEvent::Processing { stage });
        };

        let outcome = self
            .processor
            .process(&self.request, &on_stage, &ctx.cancel)
            .await?;
        Ok(outcome.record.video_path)
    }
}
