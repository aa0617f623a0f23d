//! DashScope (Aliyun Model Studio) file transcription client
//!
//! REST flow:
//! 1. `POST /api/v1/services/audio/asr/transcription` with
//!    `X-DashScope-Async: enable` returns `output.task_id`
//! 2. `GET /api/v1/tasks/{task_id}` until `output.task_status` is
//!    `SUCCEEDED` or `FAILED`
//! 3. `GET results[0].transcription_url` returns the transcript document

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::transcript::Sentence;
use super::{Result, Transcriber, TranscriptionError, TranscriptionJob, TranscriptionOutput};
use crate::config::TranscriptionConfig;

const SUBMIT_PATH: &str = "/api/v1/services/audio/asr/transcription";
const TASKS_PATH: &str = "/api/v1/tasks";

/// [`Transcriber`] talking to the DashScope REST API
#[derive(Debug, Clone)]
pub struct DashScopeClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    language_hints: Vec<String>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl DashScopeClient {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(TranscriptionError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("vidscribe/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            language_hints: config.language_hints.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            max_wait: Duration::from_secs(config.max_wait_secs),
        })
    }

    async fn poll_once(&self, task_id: &str) -> Result<TaskOutput> {
        let url = format!("{}{TASKS_PATH}/{task_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let body: TaskEnvelope = check_status(response).await?.json().await?;
        Ok(body.output)
    }
}

#[async_trait]
impl Transcriber for DashScopeClient {
    async fn submit(&self, file_url: &str) -> Result<TranscriptionJob> {
        let body = json!({
            "model": self.model,
            "input": { "file_urls": [file_url] },
            "parameters": { "language_hints": self.language_hints },
        });

        let response = self
            .client
            .post(format!("{}{SUBMIT_PATH}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-DashScope-Async", "enable")
            .json(&body)
            .send()
            .await?;

        let envelope: TaskEnvelope = check_status(response).await?.json().await?;
        let task_id = envelope
            .output
            .task_id
            .ok_or(TranscriptionError::MissingResult("task_id"))?;

        info!(task_id = %task_id, model = %self.model, "Transcription task submitted");
        Ok(TranscriptionJob { task_id })
    }

    async fn wait(
        &self,
        job: &TranscriptionJob,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionOutput> {
        let deadline = Instant::now() + self.max_wait;

        loop {
            let output = self.poll_once(&job.task_id).await?;
            let status = output.task_status.as_deref().unwrap_or("UNKNOWN");
            debug!(task_id = %job.task_id, status, "Polled transcription task");

            match status {
                "SUCCEEDED" => {
                    let result = output
                        .results
                        .into_iter()
                        .next()
                        .ok_or(TranscriptionError::MissingResult("results"))?;

                    if result.subtask_status.as_deref() == Some("FAILED") {
                        return Err(TranscriptionError::Failed(
                            result.message.unwrap_or_else(|| "subtask failed".to_string()),
                        ));
                    }

                    let transcription_url = result
                        .transcription_url
                        .ok_or(TranscriptionError::MissingResult("transcription_url"))?;
                    info!(task_id = %job.task_id, "Transcription finished");
                    return Ok(TranscriptionOutput { transcription_url });
                }
                "FAILED" | "CANCELED" | "UNKNOWN" => {
                    let message = output
                        .message
                        .or(output.code)
                        .unwrap_or_else(|| format!("task ended with status {status}"));
                    warn!(task_id = %job.task_id, status, %message, "Transcription task failed");
                    return Err(TranscriptionError::Failed(message));
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(TranscriptionError::Timeout);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(TranscriptionError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn fetch_transcript(&self, transcription_url: &str) -> Result<Vec<Sentence>> {
        let response = self.client.get(transcription_url).send().await?;
        let document: TranscriptDocument = check_status(response).await?.json().await?;

        let sentences = document
            .transcripts
            .into_iter()
            .next()
            .map(|t| t.sentences)
            .ok_or(TranscriptionError::MissingResult("transcripts"))?;

        debug!(count = sentences.len(), "Fetched transcript");
        Ok(sentences)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiFailure>(&text)
        .ok()
        .and_then(|f| f.message)
        .unwrap_or(text);

    Err(TranscriptionError::Api {
        status: status.as_u16(),
        message,
    })
}

#[derive(Debug, Deserialize)]
struct TaskEnvelope {
    output: TaskOutput,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    task_id: Option<String>,
    task_status: Option<String>,
    #[serde(default)]
    results: Vec<TaskResult>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskResult {
    transcription_url: Option<String>,
    subtask_status: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiFailure {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptDocument {
    #[serde(default)]
    transcripts: Vec<TranscriptChannel>,
}

#[derive(Debug, Deserialize)]
struct TranscriptChannel {
    #[serde(default)]
    sentences: Vec<Sentence>,
}
