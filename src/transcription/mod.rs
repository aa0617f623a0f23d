//! Speech transcription
//!
//! [`Transcriber`] hides the remote ASR service behind three steps:
//! submit a publicly readable file URL, wait for the job, fetch the
//! transcript document. [`transcript`] turns the sentences into the plain
//! and timestamped text stored in history.

pub mod dashscope;
pub mod transcript;

pub use dashscope::DashScopeClient;
pub use transcript::{Sentence, clean_sentences, render_plain, render_timestamped, strip_markup};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription API key is not configured")]
    MissingApiKey,

    #[error("transcription request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("transcription service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transcription failed: {0}")]
    Failed(String),

    #[error("transcription result missing: {0}")]
    MissingResult(&'static str),

    #[error("transcription did not finish in time")]
    Timeout,

    #[error("transcription cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, TranscriptionError>;

/// Handle of a submitted remote job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionJob {
    pub task_id: String,
}

/// Successful job outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionOutput {
    /// Where the transcript document can be downloaded
    pub transcription_url: String,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn submit(&self, file_url: &str) -> Result<TranscriptionJob>;

    /// Polls until the job finishes, fails, times out or `cancel` fires.
    async fn wait(
        &self,
        job: &TranscriptionJob,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionOutput>;

    async fn fetch_transcript(&self, transcription_url: &str) -> Result<Vec<Sentence>>;
}

/// Stand-in used when no API key is configured; every call fails.
#[derive(Debug, Default)]
pub struct DisabledTranscriber;

#[async_trait]
impl Transcriber for DisabledTranscriber {
    async fn submit(&self, _file_url: &str) -> Result<TranscriptionJob> {
        Err(TranscriptionError::MissingApiKey)
    }

    async fn wait(
        &self,
        _job: &TranscriptionJob,
        _cancel: &CancellationToken,
    ) -> Result<TranscriptionOutput> {
        Err(TranscriptionError::MissingApiKey)
    }

    async fn fetch_transcript(&self, _transcription_url: &str) -> Result<Vec<Sentence>> {
        Err(TranscriptionError::MissingApiKey)
    }
}

/// Runs the whole submit, wait, fetch sequence.
pub async fn transcribe(
    transcriber: &dyn Transcriber,
    file_url: &str,
    cancel: &CancellationToken,
) -> Result<Vec<Sentence>> {
    let job = transcriber.submit(file_url).await?;
    let output = transcriber.wait(&job, cancel).await?;
    transcriber.fetch_transcript(&output.transcription_url).await
}
