use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: VideoLimits,
    #[serde(default)]
    pub worker: WorkerPoolConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Directory holding uploaded and downloaded videos
    #[serde(default = "default_records_dir")]
    pub records_dir: PathBuf,
    /// Fjall keyspace for the history store
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
    /// Request body limit for `POST /upload`
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            records_dir: default_records_dir(),
            history_path: default_history_path(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

fn default_records_dir() -> PathBuf {
    PathBuf::from("records")
}

fn default_history_path() -> PathBuf {
    PathBuf::from("data/history")
}

fn default_max_upload_bytes() -> ByteSize {
    ByteSize::mib(512)
}

/// Limits applied before a video is sent for transcription
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoLimits {
    #[serde(default = "default_max_video_size")]
    pub max_video_size: ByteSize,
    #[serde(default = "default_max_video_duration_secs")]
    pub max_video_duration_secs: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for VideoLimits {
    fn default() -> Self {
        Self {
            max_video_size: default_max_video_size(),
            max_video_duration_secs: default_max_video_duration_secs(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl VideoLimits {
    pub fn max_video_duration(&self) -> Duration {
        Duration::from_secs(self.max_video_duration_secs)
    }

    /// Case-insensitive extension check; `name` is a file name, not a path.
    pub fn is_allowed(&self, name: &str) -> bool {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }
}

fn default_max_video_size() -> ByteSize {
    ByteSize::mib(500)
}

fn default_max_video_duration_secs() -> u64 {
    30 * 60
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["mp4".to_string()]
}

/// Background worker pool
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerPoolConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Upper bound on the wait between two progress events on a stream
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
    /// Interval at which a quiet task repeats its last progress event
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    64
}

fn default_stream_idle_timeout_secs() -> u64 {
    15 * 60
}

fn default_heartbeat_secs() -> u64 {
    30
}

/// Remote media fetcher (yt-dlp)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    #[serde(default = "default_yt_dlp_path")]
    pub yt_dlp_path: PathBuf,
    /// Target container format
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retries")]
    pub fragment_retries: u32,
    /// Netscape cookie file, preferred over `cookies_from_browser`
    pub cookies_path: Option<PathBuf>,
    pub cookies_from_browser: Option<String>,
    /// Number of title characters kept in generated file names
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: default_yt_dlp_path(),
            format: default_format(),
            retries: default_retries(),
            fragment_retries: default_retries(),
            cookies_path: None,
            cookies_from_browser: None,
            title_max_chars: default_title_max_chars(),
        }
    }
}

fn default_yt_dlp_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_format() -> String {
    "mp4".to_string()
}

fn default_retries() -> u32 {
    10
}

fn default_title_max_chars() -> usize {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// Any S3-compatible endpoint, Aliyun OSS included
    S3,
    #[default]
    Memory,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// OSS requires `https://{bucket}.{endpoint}` style addressing
    #[serde(default)]
    pub virtual_hosted_style: bool,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_sign_ttl_secs")]
    pub sign_ttl_secs: u64,
    /// Loaded from environment, never from the config file
    #[serde(skip)]
    pub access_key: Option<String>,
    /// Loaded from environment, never from the config file
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Memory,
            bucket: default_bucket(),
            endpoint: None,
            region: None,
            virtual_hosted_style: false,
            key_prefix: default_key_prefix(),
            sign_ttl_secs: default_sign_ttl_secs(),
            access_key: None,
            secret_key: None,
        }
    }
}

impl StorageConfig {
    pub fn sign_ttl(&self) -> Duration {
        Duration::from_secs(self.sign_ttl_secs)
    }
}

fn default_bucket() -> String {
    "vidscribe".to_string()
}

fn default_key_prefix() -> String {
    "videos/".to_string()
}

fn default_sign_ttl_secs() -> u64 {
    24 * 60 * 60
}

/// DashScope transcription service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscriptionConfig {
    #[serde(default = "default_transcription_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_language_hints")]
    pub language_hints: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Loaded from `DASHSCOPE_API_KEY`
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: default_transcription_base_url(),
            model: default_model(),
            language_hints: default_language_hints(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: default_max_wait_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_transcription_base_url() -> String {
    "https://dashscope.aliyuncs.com".to_string()
}

fn default_model() -> String {
    "sensevoice-v1".to_string()
}

fn default_language_hints() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_max_wait_secs() -> u64 {
    60 * 60
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Local file retention for `vidscribe clean`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
        }
    }
}

fn default_max_age_days() -> u32 {
    7
}
