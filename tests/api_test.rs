use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt; // for `oneshot`

use vidscribe::api::models::{TaskAccepted, TranscribeResponse, UploadResponse};
use vidscribe::api::{AppState, Services, router};
use vidscribe::config::Config;
use vidscribe::fetcher::{DownloadProgress, FetchError, MediaFetcher, MediaInfo, ProgressFn};
use vidscribe::history::{FjallHistoryStore, HistoryRecord};
use vidscribe::media::{MediaProber, ProbeError, VideoMetadata};
use vidscribe::storage::StorageClient;
use vidscribe::transcription::{Sentence, Transcriber, TranscriptionJob, TranscriptionOutput};

const BOUNDARY: &str = "vidscribe-test-boundary";

fn demo_clip() -> MediaInfo {
    MediaInfo {
        title: "Demo Clip".to_string(),
        duration: Some(5.0),
        webpage_url: None,
    }
}

/// Pretends to download a short clip in two progress ticks and remembers
/// every URL it was handed
#[derive(Default)]
struct StubFetcher {
    urls: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaFetcher for StubFetcher {
    async fn probe(&self, url: &str) -> vidscribe::fetcher::Result<MediaInfo> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(demo_clip())
    }

    async fn fetch(
        &self,
        url: &str,
        output: &Path,
        on_progress: ProgressFn<'_>,
        _cancel: &CancellationToken,
    ) -> vidscribe::fetcher::Result<()> {
        self.urls.lock().unwrap().push(url.to_string());
        for downloaded in [512u64, 1024] {
            on_progress(DownloadProgress {
                downloaded_bytes: downloaded,
                total_bytes: Some(1024),
                speed: Some(1024.0),
                eta_secs: Some(0),
            });
        }
        tokio::fs::write(output, vec![0u8; 1024]).await?;
        Ok(())
    }
}

/// Resolves the video slowly, then downloads it at once without progress
struct SlowFetcher {
    resolve_delay: Duration,
}

#[async_trait]
impl MediaFetcher for SlowFetcher {
    async fn probe(&self, _url: &str) -> vidscribe::fetcher::Result<MediaInfo> {
        tokio::time::sleep(self.resolve_delay).await;
        Ok(demo_clip())
    }

    async fn fetch(
        &self,
        _url: &str,
        output: &Path,
        _on_progress: ProgressFn<'_>,
        _cancel: &CancellationToken,
    ) -> vidscribe::fetcher::Result<()> {
        tokio::fs::write(output, b"clip").await?;
        Ok(())
    }
}

/// Writes half a file, reports it once, then hangs until cancelled
struct StallingFetcher;

#[async_trait]
impl MediaFetcher for StallingFetcher {
    async fn probe(&self, _url: &str) -> vidscribe::fetcher::Result<MediaInfo> {
        Ok(demo_clip())
    }

    async fn fetch(
        &self,
        _url: &str,
        output: &Path,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> vidscribe::fetcher::Result<()> {
        tokio::fs::write(output, vec![0u8; 512]).await?;
        on_progress(DownloadProgress {
            downloaded_bytes: 512,
            total_bytes: Some(1024),
            speed: None,
            eta_secs: None,
        });
        cancel.cancelled().await;
        Err(FetchError::Cancelled)
    }
}

struct StubProber;

#[async_trait]
impl MediaProber for StubProber {
    async fn probe(&self, _path: &Path) -> Result<VideoMetadata, ProbeError> {
        Ok(VideoMetadata {
            duration: Duration::from_secs(5),
            width: Some(1280),
            height: Some(720),
            fps: Some(30.0),
        })
    }
}

/// Answers with one sentence after holding the job for `wait_for`
#[derive(Default)]
struct StubTranscriber {
    wait_for: Duration,
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn submit(&self, file_url: &str) -> vidscribe::transcription::Result<TranscriptionJob> {
        assert!(file_url.starts_with("memory://"));
        Ok(TranscriptionJob {
            task_id: "asr-1".to_string(),
        })
    }

    async fn wait(
        &self,
        _job: &TranscriptionJob,
        _cancel: &CancellationToken,
    ) -> vidscribe::transcription::Result<TranscriptionOutput> {
        tokio::time::sleep(self.wait_for).await;
        Ok(TranscriptionOutput {
            transcription_url: "https://asr.example/asr-1.json".to_string(),
        })
    }

    async fn fetch_transcript(
        &self,
        _url: &str,
    ) -> vidscribe::transcription::Result<Vec<Sentence>> {
        Ok(vec![Sentence {
            begin_time: 0,
            end_time: 5000,
            text: "<|en|><|NEUTRAL|>Hello world".to_string(),
        }])
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    records: TempDir,
    _data: TempDir,
}

/// Creates a minimal config for testing, pointing at temp directories
fn create_test_config(records: &Path) -> Config {
    let config_toml = r#"
[limits]
max_video_size = "1MB"
max_video_duration_secs = 60

[worker]
workers = 2
queue_capacity = 8
stream_idle_timeout_secs = 5
    "#;

    let mut config: Config = toml::from_str(config_toml).expect("Failed to parse test config");
    config.server.records_dir = records.to_path_buf();
    config
}

/// Builds a test app with isolated dependencies
fn build_test_app() -> TestApp {
    build_test_app_with(
        Arc::new(StubFetcher::default()),
        StubTranscriber::default(),
        |_| {},
    )
}

fn build_test_app_with(
    fetcher: Arc<dyn MediaFetcher>,
    transcriber: StubTranscriber,
    tweak: impl FnOnce(&mut Config),
) -> TestApp {
    let records = TempDir::new().expect("Failed to create records dir");
    let data = TempDir::new().expect("Failed to create data dir");

    let history = FjallHistoryStore::open(data.path().join("history"))
        .expect("Failed to open test history store");

    let services = Services {
        fetcher,
        prober: Arc::new(StubProber),
        storage: Arc::new(StorageClient::in_memory()),
        transcriber: Arc::new(transcriber),
        history: Arc::new(history),
    };

    let mut config = create_test_config(records.path());
    tweak(&mut config);
    let state = AppState::new(config, services);

    TestApp {
        router: router(state.clone()),
        state,
        records,
        _data: data,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn upload_request(filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: video/mp4\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn progress_uri(accepted: &TaskAccepted) -> String {
    format!("/progress/{}", accepted.task_id)
}

async fn submit_download(app: &TestApp, url: &str) -> TaskAccepted {
    let (status, body) = send(app, json_request("POST", "/download", json!({"url": url}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    serde_json::from_slice(&body).unwrap()
}

/// Reads an open SSE body up to its next event
async fn next_sse_event(body: &mut Body) -> Value {
    loop {
        let frame = body
            .frame()
            .await
            .expect("progress stream ended early")
            .unwrap();
        if let Ok(data) = frame.into_data() {
            if let Some(event) = sse_events(&data).into_iter().next() {
                return event;
            }
        }
    }
}

fn records_count(app: &TestApp) -> usize {
    std::fs::read_dir(app.records.path()).unwrap().count()
}

/// JSON payloads of every `data:` line in an SSE body
fn sse_events(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim_start()).unwrap())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let app = build_test_app();
    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["active_tasks"], 0);
    assert_eq!(health["components"]["workers"], "healthy");
}

#[tokio::test]
async fn test_download_without_url_is_rejected() {
    let app = build_test_app();
    let (status, body) = send(
        &app,
        json_request("POST", "/download", json!({"url": "nothing to see here"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["code"], "INVALID_PAYLOAD");
    assert!(error["message"].as_str().unwrap().contains("no valid URL found"));
}

#[tokio::test]
async fn test_download_requires_json_content_type() {
    let app = build_test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/download")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(r#"{"url":"https://example.com/v"}"#))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_streams_progress_until_completed() {
    let app = build_test_app();
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/download",
            json!({"url": "watch this https://www.youtube.com/watch?v=abc123."}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let accepted: TaskAccepted = serde_json::from_slice(&body).unwrap();
    assert!(accepted.success);

    let uri = format!("/progress/{}", accepted.task_id);
    let (status, body) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);

    let events = sse_events(&body);
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["status"], "downloading");
    assert_eq!(events[0]["progress"], 50.0);
    assert_eq!(events[1]["progress"], 100.0);
    assert_eq!(events[2]["status"], "completed");

    let video_path = events[2]["video_path"].as_str().unwrap();
    assert!(video_path.starts_with("Demo_Clip_"));
    assert!(video_path.ends_with(".mp4"));
    assert!(app.records.path().join(video_path).exists());

    // the channel is gone once the stream has ended
    let (_, body) = send(&app, get(&uri)).await;
    assert_eq!(
        sse_events(&body),
        vec![json!({"status": "error", "message": "task not found"})]
    );

    let (_, body) = send(&app, get("/api/history/recent")).await;
    let recent: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(recent["history"][0]["title"], "Demo Clip");
    assert_eq!(recent["history"][0]["source"], "youtube");
}

#[tokio::test]
async fn test_progress_for_unknown_task() {
    let app = build_test_app();
    let (status, body) = send(&app, get("/progress/does-not-exist")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        sse_events(&body),
        vec![json!({"status": "error", "message": "task not found"})]
    );
}

#[tokio::test]
async fn test_cancel_unknown_task() {
    let app = build_test_app();
    let request = Request::builder()
        .method("DELETE")
        .uri("/tasks/does-not-exist")
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_secures_name_and_avoids_collisions() {
    let app = build_test_app();

    let (status, body) = send(&app, upload_request("../My Clip.mp4", b"first")).await;
    assert_eq!(status, StatusCode::OK);
    let first: UploadResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(first.title, "My_Clip.mp4");
    assert!(first.history_id.is_some());

    let (_, body) = send(&app, upload_request("My Clip.mp4", b"second")).await;
    let second: UploadResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(second.title, "My_Clip_1.mp4");

    let (status, body) = send(&app, get("/video/My_Clip.mp4")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"first");
}

#[tokio::test]
async fn test_upload_rejects_other_extensions() {
    let app = build_test_app();
    let (status, _) = send(&app, upload_request("clip.avi", b"data")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(std::fs::read_dir(app.records.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_transcribe_uploaded_video() {
    let app = build_test_app();
    let (_, body) = send(&app, upload_request("talk.mp4", b"video bytes")).await;
    let uploaded: UploadResponse = serde_json::from_slice(&body).unwrap();

    let request = json!({"filename": "talk.mp4", "source": "upload"});
    let (status, body) = send(&app, json_request("POST", "/transcribe", request.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let response: TranscribeResponse = serde_json::from_slice(&body).unwrap();
    assert!(response.success);
    assert!(!response.cached);
    assert_eq!(response.transcription.sentences.len(), 1);
    assert_eq!(response.transcription.sentences[0].text, "Hello world");
    assert!(response.video_url.unwrap().starts_with("memory://"));
    assert_eq!(Some(response.history_id.clone()), uploaded.history_id);

    let (status, body) = send(&app, get(&format!("/api/history/{}", response.history_id))).await;
    assert_eq!(status, StatusCode::OK);
    let record: HistoryRecord = serde_json::from_slice(&body).unwrap();
    assert!(record.transcribed);
    assert_eq!(record.transcription.as_deref(), Some("Hello world"));
    assert_eq!(
        record.timestamped_transcription.as_deref(),
        Some("[00:00 - 00:05] Hello world")
    );
    assert_eq!(record.resolution.as_deref(), Some("1280x720"));

    let (_, body) = send(&app, json_request("POST", "/transcribe", request)).await;
    let again: TranscribeResponse = serde_json::from_slice(&body).unwrap();
    assert!(again.cached);
    assert_eq!(again.history_id, response.history_id);
}

#[tokio::test]
async fn test_transcribe_missing_file() {
    let app = build_test_app();
    let (status, body) = send(
        &app,
        json_request("POST", "/transcribe", json!({"filename": "ghost.mp4"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_transcribe_async_reports_stages() {
    let app = build_test_app();
    send(&app, upload_request("talk.mp4", b"video bytes")).await;

    let (status, body) = send(
        &app,
        json_request("POST", "/transcribe/async", json!({"filename": "talk.mp4"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let accepted: TaskAccepted = serde_json::from_slice(&body).unwrap();

    let (_, body) = send(&app, get(&format!("/progress/{}", accepted.task_id))).await;
    let events = sse_events(&body);

    assert!(events.len() > 1);
    assert!(events[..events.len() - 1]
        .iter()
        .all(|event| event["status"] == "processing"));
    assert_eq!(
        events.last().unwrap(),
        &json!({"status": "completed", "video_path": "talk.mp4"})
    );
}

#[tokio::test]
async fn test_history_paging_and_delete() {
    let app = build_test_app();
    for name in ["a.mp4", "b.mp4", "c.mp4"] {
        send(&app, upload_request(name, b"x")).await;
    }

    let (status, body) = send(&app, get("/api/history?page=1&per_page=2")).await;
    assert_eq!(status, StatusCode::OK);
    let page: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["items"][0]["title"], "c.mp4");
    assert_eq!(page["total"], 3);

    let (status, _) = send(&app, get("/api/history?per_page=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let id = page["items"][0]["id"].as_str().unwrap().to_string();
    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/history/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, get(&format!("/api/history/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_passes_extracted_url_to_fetcher() {
    let fetcher = Arc::new(StubFetcher::default());
    let app = build_test_app_with(fetcher.clone(), StubTranscriber::default(), |_| {});

    let accepted = submit_download(&app, "garbage text https://example.com/v?x=1 trailing").await;
    let (_, body) = send(&app, get(&progress_uri(&accepted))).await;
    assert_eq!(sse_events(&body).last().unwrap()["status"], "completed");

    // once to resolve the title, once to download
    assert_eq!(
        *fetcher.urls.lock().unwrap(),
        vec!["https://example.com/v?x=1", "https://example.com/v?x=1"]
    );
}

#[tokio::test]
async fn test_slow_transcription_outlives_stream_idle_timeout() {
    let app = build_test_app_with(
        Arc::new(StubFetcher::default()),
        StubTranscriber {
            wait_for: Duration::from_secs(3),
        },
        |config| {
            config.worker.stream_idle_timeout_secs = 2;
            config.worker.heartbeat_secs = 1;
        },
    );
    send(&app, upload_request("talk.mp4", b"video bytes")).await;

    let (status, body) = send(
        &app,
        json_request("POST", "/transcribe/async", json!({"filename": "talk.mp4"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let accepted: TaskAccepted = serde_json::from_slice(&body).unwrap();

    let (_, body) = send(&app, get(&progress_uri(&accepted))).await;
    let events = sse_events(&body);

    let transcribing = json!({"status": "processing", "stage": "transcribing"});
    assert!(events.iter().filter(|event| **event == transcribing).count() >= 2);
    assert_eq!(
        events.last().unwrap(),
        &json!({"status": "completed", "video_path": "talk.mp4"})
    );
}

#[tokio::test]
async fn test_idle_stream_closes_but_task_keeps_running() {
    let app = build_test_app_with(
        Arc::new(SlowFetcher {
            resolve_delay: Duration::from_secs(2),
        }),
        StubTranscriber::default(),
        |config| config.worker.stream_idle_timeout_secs = 1,
    );

    let accepted = submit_download(&app, "https://example.com/v").await;
    let (_, body) = send(&app, get(&progress_uri(&accepted))).await;
    assert_eq!(
        sse_events(&body),
        vec![json!({"status": "error", "message": "progress stream timed out"})]
    );
    assert!(app.state.registry.is_empty());

    for _ in 0..50 {
        let (_, body) = send(&app, get("/api/history/recent")).await;
        let recent: Value = serde_json::from_slice(&body).unwrap();
        if let Some(record) = recent["history"].as_array().and_then(|items| items.first()) {
            assert_eq!(record["title"], "Demo Clip");
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("download never finished after its stream timed out");
}

#[tokio::test]
async fn test_shutdown_ends_open_progress_streams() {
    let app = build_test_app_with(
        Arc::new(SlowFetcher {
            resolve_delay: Duration::from_secs(30),
        }),
        StubTranscriber::default(),
        |_| {},
    );
    let accepted = submit_download(&app, "https://example.com/v").await;

    let router = app.router.clone();
    let uri = progress_uri(&accepted);
    let stream = tokio::spawn(async move {
        let response = router.oneshot(get(&uri)).await.unwrap();
        response.into_body().collect().await.unwrap().to_bytes()
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    app.state.shutdown.cancel();

    let body = tokio::time::timeout(Duration::from_secs(5), stream)
        .await
        .expect("progress stream kept running after shutdown")
        .unwrap();
    assert_eq!(
        sse_events(&body),
        vec![json!({"status": "error", "message": "server shutting down"})]
    );
    assert!(app.state.registry.is_empty());
}

#[tokio::test]
async fn test_dropped_progress_stream_removes_channel() {
    let app = build_test_app_with(
        Arc::new(SlowFetcher {
            resolve_delay: Duration::from_secs(30),
        }),
        StubTranscriber::default(),
        |_| {},
    );
    let accepted = submit_download(&app, "https://example.com/v").await;

    let response = app
        .router
        .clone()
        .oneshot(get(&progress_uri(&accepted)))
        .await
        .unwrap();
    let mut body = response.into_body();

    // nothing to read yet, but polling claims the channel
    let pending = tokio::time::timeout(Duration::from_millis(200), body.frame()).await;
    assert!(pending.is_err());
    assert!(
        app.state
            .registry
            .get(&accepted.task_id)
            .is_some_and(|channel| channel.is_claimed())
    );

    // client goes away mid-task
    drop(body);
    assert!(app.state.registry.is_empty());
}

#[tokio::test]
async fn test_cancel_running_download_removes_partial_file() {
    let app = build_test_app_with(Arc::new(StallingFetcher), StubTranscriber::default(), |_| {});
    let accepted = submit_download(&app, "https://example.com/v").await;

    let response = app
        .router
        .clone()
        .oneshot(get(&progress_uri(&accepted)))
        .await
        .unwrap();
    let mut body = response.into_body();

    let first = next_sse_event(&mut body).await;
    assert_eq!(first["status"], "downloading");
    assert_eq!(first["progress"], 50.0);
    assert_eq!(records_count(&app), 1);

    let cancel = Request::builder()
        .method("DELETE")
        .uri(format!("/tasks/{}", accepted.task_id))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, cancel).await;
    assert_eq!(status, StatusCode::OK);

    let rest = body.collect().await.unwrap().to_bytes();
    assert_eq!(
        sse_events(&rest),
        vec![json!({"status": "error", "message": "task cancelled"})]
    );
    assert_eq!(records_count(&app), 0);
    assert!(app.state.registry.is_empty());

    let (_, body) = send(&app, get("/api/history/recent")).await;
    let recent: Value = serde_json::from_slice(&body).unwrap();
    assert!(recent["history"].as_array().unwrap().is_empty());
}
