use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::transcription::Sentence;

/// Where a video came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoSource {
    Upload,
    /// Any remote site fetched by the downloader
    #[serde(alias = "download")]
    Youtube,
    Other,
}

impl VideoSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoSource::Upload => "upload",
            VideoSource::Youtube => "youtube",
            VideoSource::Other => "other",
        }
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upload" => Ok(VideoSource::Upload),
            "youtube" | "download" => Ok(VideoSource::Youtube),
            "other" => Ok(VideoSource::Other),
            other => Err(format!("unknown video source: {other}")),
        }
    }
}

/// Persistent metadata of one video and its transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct HistoryRecord {
    #[builder(default = Uuid::now_v7().to_string())]
    pub id: String,
    #[builder(into)]
    pub title: String,
    pub source: VideoSource,
    /// File name inside the records directory
    #[builder(into)]
    pub video_path: String,
    pub object_key: Option<String>,
    pub video_url: Option<String>,
    pub duration_secs: Option<f64>,
    /// `"WxH"`
    pub resolution: Option<String>,
    pub fps: Option<f64>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    pub transcription: Option<String>,
    pub timestamped_transcription: Option<String>,
    /// Cleaned sentences the transcripts were rendered from
    #[serde(default)]
    #[builder(default)]
    pub sentences: Vec<Sentence>,
    #[serde(default)]
    #[builder(default)]
    pub transcribed: bool,
}

/// Partial update; `None` fields keep their stored value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryUpdate {
    pub object_key: Option<String>,
    pub video_url: Option<String>,
    pub duration_secs: Option<f64>,
    pub resolution: Option<String>,
    pub fps: Option<f64>,
    pub transcription: Option<String>,
    pub timestamped_transcription: Option<String>,
    pub sentences: Option<Vec<Sentence>>,
    pub transcribed: Option<bool>,
}

impl HistoryUpdate {
    pub fn apply(self, record: &mut HistoryRecord) {
        if let Some(v) = self.object_key {
            record.object_key = Some(v);
        }
        if let Some(v) = self.video_url {
            record.video_url = Some(v);
        }
        if let Some(v) = self.duration_secs {
            record.duration_secs = Some(v);
        }
        if let Some(v) = self.resolution {
            record.resolution = Some(v);
        }
        if let Some(v) = self.fps {
            record.fps = Some(v);
        }
        if let Some(v) = self.transcription {
            record.transcription = Some(v);
        }
        if let Some(v) = self.timestamped_transcription {
            record.timestamped_transcription = Some(v);
        }
        if let Some(v) = self.sentences {
            record.sentences = v;
        }
        if let Some(v) = self.transcribed {
            record.transcribed = v;
        }
    }
}
