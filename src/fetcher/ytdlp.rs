use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::progress::{parse_progress_line, progress_template};
use super::{FetchError, MediaFetcher, MediaInfo, ProgressFn, Result};
use crate::config::FetcherConfig;

/// Longest stderr excerpt carried in an error message
const STDERR_LIMIT: usize = 1000;

/// [`MediaFetcher`] driving the `yt-dlp` command line tool
///
/// Arguments are passed with `.arg()`, never through a shell. The child is
/// killed when the download future is dropped or cancelled.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary: PathBuf,
    format: String,
    retries: u32,
    fragment_retries: u32,
    cookies_path: Option<PathBuf>,
    cookies_from_browser: Option<String>,
}

impl YtDlpFetcher {
    pub fn new(config: &FetcherConfig) -> Self {
        Self {
            binary: config.yt_dlp_path.clone(),
            format: config.format.clone(),
            retries: config.retries,
            fragment_retries: config.fragment_retries,
            cookies_path: config.cookies_path.clone(),
            cookies_from_browser: config.cookies_from_browser.clone(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--no-playlist").arg("--no-warnings");

        if let Some(path) = &self.cookies_path {
            cmd.arg("--cookies").arg(path);
        } else if let Some(browser) = &self.cookies_from_browser {
            cmd.arg("--cookies-from-browser").arg(browser);
        }

        cmd.kill_on_drop(true);
        cmd
    }

    fn download_args(&self, output: &Path) -> Vec<std::ffi::OsString> {
        let mut args: Vec<std::ffi::OsString> = vec![
            "--format".into(),
            self.format.clone().into(),
            "--retries".into(),
            self.retries.to_string().into(),
            "--fragment-retries".into(),
            self.fragment_retries.to_string().into(),
            "--newline".into(),
            // the output name is reserved as an empty file beforehand
            "--force-overwrites".into(),
            "--progress-template".into(),
            progress_template().into(),
            "--output".into(),
        ];
        args.push(output.as_os_str().to_owned());
        args
    }

    fn spawn_error(&self, err: std::io::Error) -> FetchError {
        if err.kind() == std::io::ErrorKind::NotFound {
            FetchError::NotInstalled(self.binary.display().to_string())
        } else {
            FetchError::Io(err)
        }
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn probe(&self, url: &str) -> Result<MediaInfo> {
        debug!(url, "Reading media info");

        let output = self
            .command()
            .args(["--dump-json", "--no-download"])
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(FetchError::ProbeFailed(truncate_stderr(&output.stderr)));
        }

        let info: MediaInfo = serde_json::from_slice(&output.stdout)?;
        info!(url, title = %info.title, duration = ?info.duration, "Media info read");
        Ok(info)
    }

    async fn fetch(
        &self,
        url: &str,
        output: &Path,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(url, output = %output.display(), "Starting download");

        let mut child = self
            .command()
            .args(self.download_args(output))
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::DownloadFailed("stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::DownloadFailed("stderr not captured".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(url, "Download cancelled, killing yt-dlp");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill yt-dlp");
                    }
                    stderr_task.abort();
                    return Err(FetchError::Cancelled);
                }
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if let Some(progress) = parse_progress_line(&line) {
                            on_progress(progress);
                        }
                    }
                    None => break,
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(FetchError::Cancelled);
            }
            status = child.wait() => status?,
        };
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(FetchError::DownloadFailed(truncate_stderr(&stderr)));
        }

        info!(url, output = %output.display(), "Download finished");
        Ok(())
    }
}

fn truncate_stderr(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return "yt-dlp exited with an error".to_string();
    }
    text.chars().take(STDERR_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(config: FetcherConfig) -> YtDlpFetcher {
        YtDlpFetcher::new(&config)
    }

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_cookie_file_wins_over_browser() {
        let fetcher = fetcher(FetcherConfig {
            cookies_path: Some(PathBuf::from("/etc/cookies.txt")),
            cookies_from_browser: Some("chrome".to_string()),
            ..FetcherConfig::default()
        });

        let args = args_of(&fetcher.command());
        assert!(args.contains(&"--cookies".to_string()));
        assert!(!args.contains(&"--cookies-from-browser".to_string()));
    }

    #[test]
    fn test_download_args() {
        let fetcher = fetcher(FetcherConfig::default());
        let args: Vec<String> = fetcher
            .download_args(Path::new("records/clip.mp4"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(args[0..2], ["--format", "mp4"]);
        assert!(args.contains(&"--newline".to_string()));
        assert!(args.contains(&"--force-overwrites".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("records/clip.mp4"));
    }

    #[test]
    fn test_truncate_stderr() {
        assert_eq!(truncate_stderr(b"  "), "yt-dlp exited with an error");
        assert_eq!(truncate_stderr(b"ERROR: unsupported URL\n"), "ERROR: unsupported URL");
        assert_eq!(truncate_stderr(&[b'x'; 4000]).len(), STDERR_LIMIT);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let fetcher = fetcher(FetcherConfig {
            yt_dlp_path: PathBuf::from("/nonexistent/yt-dlp"),
            ..FetcherConfig::default()
        });

        let err = fetcher.probe("https://example.com/v").await.unwrap_err();
        assert!(matches!(err, FetchError::NotInstalled(_)));
    }
}
