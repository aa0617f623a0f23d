use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::ProbeConfig;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe not found: {0}")]
    NotInstalled(String),

    #[error("ffprobe failed: {0}")]
    Failed(String),

    #[error("unreadable ffprobe output: {0}")]
    InvalidOutput(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Technical metadata of a local video file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VideoMetadata {
    pub duration: Duration,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
}

impl VideoMetadata {
    /// `"WxH"` when both dimensions are known
    pub fn resolution(&self) -> Option<String> {
        Some(format!("{}x{}", self.width?, self.height?))
    }
}

#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<VideoMetadata, ProbeError>;
}

/// [`MediaProber`] backed by the `ffprobe` binary
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary: PathBuf,
}

impl FfprobeProber {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            binary: config.ffprobe_path.clone(),
        }
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<VideoMetadata, ProbeError> {
        let output = Command::new(&self.binary)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProbeError::NotInstalled(self.binary.display().to_string())
                } else {
                    ProbeError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Failed(stderr.trim().to_string()));
        }

        let metadata = parse_ffprobe_json(&output.stdout)?;
        debug!(path = %path.display(), ?metadata, "Probed video");
        Ok(metadata)
    }
}

#[derive(Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

pub(crate) fn parse_ffprobe_json(raw: &[u8]) -> Result<VideoMetadata, ProbeError> {
    let parsed: FfprobeOutput = serde_json::from_slice(raw)?;

    let secs = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| ProbeError::Failed("duration not reported".to_string()))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    Ok(VideoMetadata {
        duration: Duration::from_secs_f64(secs),
        width: video.and_then(|s| s.width),
        height: video.and_then(|s| s.height),
        fps: video.and_then(|s| {
            s.avg_frame_rate
                .as_deref()
                .and_then(parse_frame_rate)
                .or_else(|| s.r_frame_rate.as_deref().and_then(parse_frame_rate))
        }),
    })
}

/// Parses `"30000/1001"` or `"25"`, rounded to two decimals
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.parse::<f64>().ok()? / den
        }
        None => raw.parse().ok()?,
    };
    (rate > 0.0).then(|| (rate * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ffprobe_json() {
        let raw = br#"{
            "streams": [
                {"codec_type": "audio", "r_frame_rate": "0/0"},
                {"codec_type": "video", "width": 1920, "height": 1080,
                 "r_frame_rate": "30000/1001", "avg_frame_rate": "30000/1001"}
            ],
            "format": {"duration": "62.500000"}
        }"#;

        let meta = parse_ffprobe_json(raw).unwrap();
        assert_eq!(meta.duration, Duration::from_millis(62_500));
        assert_eq!(meta.resolution().as_deref(), Some("1920x1080"));
        assert_eq!(meta.fps, Some(29.97));
    }

    #[test]
    fn test_missing_duration_is_an_error() {
        let err = parse_ffprobe_json(br#"{"streams": [], "format": {}}"#).unwrap_err();
        assert!(matches!(err, ProbeError::Failed(_)));
    }

    #[test]
    fn test_audio_only_file() {
        let meta = parse_ffprobe_json(br#"{"streams": [], "format": {"duration": "3.0"}}"#).unwrap();
        assert_eq!(meta.resolution(), None);
        assert_eq!(meta.fps, None);
    }

    #[test]
    fn test_frame_rate() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("24"), Some(24.0));
        assert_eq!(parse_frame_rate("0/0"), None);
    }
}
