//! End-to-end job runs against a local mock of the platform and a stand-in
//! ffmpeg.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use bili_dl::{
    BiliClient, Container, DownloadJob, DownloadMode, ErrorKind, Progress, ProgressReporter,
};
use serde_json::json;

const VIDEO_BYTES: usize = 10 * 1024 * 1024;
const AUDIO_BYTES: usize = 2 * 1024 * 1024;
const BVID: &str = "BV17x411w7KC";

#[derive(Default)]
struct Hits {
    video: AtomicUsize,
    audio: AtomicUsize,
    flaky: AtomicUsize,
}

/// Mock platform. `primary_video` is the path of the video stream's primary
/// URL; `/media/video.m4s` is always listed as its backup.
fn platform(base: String, primary_video: &'static str, hits: Arc<Hits>) -> Router {
    let view = get(|| async {
        axum::Json(json!({
            "code": 0,
            "data": {
                "bvid": BVID, "aid": 170001, "cid": 279786,
                "title": "Demo: video/1", "duration": 60,
                "owner": {"mid": 2, "name": "uploader"}, "stat": {"view": 1},
                "pages": [{"cid": 279786, "page": 1, "part": "P1", "duration": 60}]
            }
        }))
    });
    let play_url = get(move || {
        let base = base.clone();
        async move {
            axum::Json(json!({
                "code": 0,
                "data": {
                    "quality": 80,
                    "accept_quality": [80, 64],
                    "dash": {
                        "video": [
                            {
                                "id": 64,
                                "baseUrl": format!("{base}/media/video.m4s"),
                                "bandwidth": 1000000
                            },
                            {"id": 80, "baseUrl": format!("{base}{primary_video}"),
                             "backupUrl": [format!("{base}/media/video.m4s")], "bandwidth": 2000000}
                        ],
                        "audio": [
                            {
                                "id": 30216,
                                "baseUrl": format!("{base}/media/audio.m4s"),
                                "bandwidth": 128000
                            }
                        ]
                    }
                }
            }))
        }
    });

    Router::new()
        .route("/x/web-interface/view", view)
        .route("/x/player/playurl", play_url)
        .route(
            "/media/video.m4s",
            get(|State(hits): State<Arc<Hits>>| async move {
                hits.video.fetch_add(1, Ordering::SeqCst);
                vec![0x11u8; VIDEO_BYTES]
            }),
        )
        .route(
            "/media/audio.m4s",
            get(|State(hits): State<Arc<Hits>>| async move {
                hits.audio.fetch_add(1, Ordering::SeqCst);
                vec![0x22u8; AUDIO_BYTES]
            }),
        )
        .route(
            "/media/flaky.m4s",
            get(|State(hits): State<Arc<Hits>>| async move {
                hits.flaky.fetch_add(1, Ordering::SeqCst);
                StatusCode::SERVICE_UNAVAILABLE
            }),
        )
        .with_state(hits)
}

async fn start(primary_video: &'static str) -> (String, Arc<Hits>) {
    let hits = Arc::new(Hits::default());
    let state = hits.clone();
    let base = common::serve_with(move |base| platform(base, primary_video, state)).await;
    (base, hits)
}

fn recording() -> (ProgressReporter, Arc<Mutex<Vec<Progress>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    (
        ProgressReporter::new(move |p| sink.lock().unwrap().push(p)),
        events,
    )
}

async fn job(client: &BiliClient, out: &std::path::Path, mode: DownloadMode) -> DownloadJob {
    let descriptor = client
        .resolve(&format!("https://www.bilibili.com/video/{BVID}"))
        .await
        .unwrap();
    DownloadJob::new(&descriptor, out, mode)
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_merged_mp4_job_merges_and_removes_inputs() {
    let (base, hits) = start("/media/video.m4s").await;
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = common::fake_ffmpeg(dir.path());
    let client = common::client(&base, dir.path(), &ffmpeg);
    let out = dir.path().join("downloads");

    let job = job(&client, &out, DownloadMode::default()).await;
    let (reporter, events) = recording();
    let output = client.download_job(&job, &reporter).await.unwrap();

    assert_eq!(output.path, out.join("Demo_ video_1.mp4"));
    assert!(output.path.exists());
    assert_eq!(output.downloaded, (VIDEO_BYTES + AUDIO_BYTES) as u64);
    assert!(!out.join("Demo_ video_1_video.m4s").exists());
    assert!(!out.join("Demo_ video_1_audio.m4s").exists());
    assert_eq!(hits.video.load(Ordering::SeqCst), 1);
    assert_eq!(hits.audio.load(Ordering::SeqCst), 1);

    let calls = common::ffmpeg_calls(dir.path());
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains("_video.m4s"));
    assert!(calls[0].contains("_audio.m4s"));
    assert!(calls[0].contains("-c:v copy -c:a aac"));

    let events = events.lock().unwrap();
    for label in ["video", "audio"] {
        let percents: Vec<f64> = events
            .iter()
            .filter(|e| e.label == label)
            .map(|e| e.percent)
            .collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{label}: {percents:?}");
        assert_eq!(percents.last().copied(), Some(100.0));
    }
    assert_eq!(events.last().unwrap().percent, 100.0);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_flv_job_merges_then_remuxes() {
    let (base, _) = start("/media/video.m4s").await;
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = common::fake_ffmpeg(dir.path());
    let client = common::client(&base, dir.path(), &ffmpeg);

    let mode = DownloadMode::Merged {
        video_quality: 80,
        audio_quality: 30216,
        container: Container::Flv,
    };
    let job = job(&client, dir.path(), mode).await;
    let output = client.download_job(&job, &ProgressReporter::noop()).await.unwrap();

    assert!(output.path.to_string_lossy().ends_with(".flv"));
    assert!(output.path.exists());
    assert!(!dir.path().join("Demo_ video_1_temp.mp4").exists());

    let calls = common::ffmpeg_calls(dir.path());
    assert_eq!(calls.len(), 2);
    assert!(calls[0].ends_with("_temp.mp4"));
    assert!(calls[1].contains("_temp.mp4"));
    assert!(calls[1].ends_with(".flv"));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_audio_only_job_skips_video() {
    let (base, hits) = start("/media/video.m4s").await;
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = common::fake_ffmpeg(dir.path());
    let client = common::client(&base, dir.path(), &ffmpeg);

    let mode = DownloadMode::AudioOnly {
        audio_quality: 30280,
        format: "mp3".to_string(),
    };
    let job = job(&client, dir.path(), mode).await;
    let output = client.download_job(&job, &ProgressReporter::noop()).await.unwrap();

    assert_eq!(output.path, dir.path().join("Demo_ video_1.mp3"));
    assert_eq!(output.downloaded, AUDIO_BYTES as u64);
    assert_eq!(hits.video.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("Demo_ video_1_temp.m4s").exists());

    let calls = common::ffmpeg_calls(dir.path());
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains("-c:a libmp3lame -q:a 0"));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_failed_primary_url_falls_back_to_backup() {
    let (base, hits) = start("/media/flaky.m4s").await;
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = common::fake_ffmpeg(dir.path());
    let client = common::client(&base, dir.path(), &ffmpeg);

    let job = job(&client, dir.path(), DownloadMode::default()).await;
    let output = client.download_job(&job, &ProgressReporter::noop()).await.unwrap();

    assert!(output.path.exists());
    assert_eq!(hits.flaky.load(Ordering::SeqCst), 1);
    assert_eq!(hits.video.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_ffmpeg_fails_before_downloading() {
    let (base, hits) = start("/media/video.m4s").await;
    let dir = tempfile::tempdir().unwrap();
    let client = common::client(&base, dir.path(), &dir.path().join("no-such-ffmpeg"));

    let job = job(&client, dir.path(), DownloadMode::default()).await;
    let err = client
        .download_job(&job, &ProgressReporter::noop())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ToolMissing);
    assert_eq!(hits.video.load(Ordering::SeqCst), 0);
    assert_eq!(hits.audio.load(Ordering::SeqCst), 0);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_failed_merge_keeps_intermediates() {
    let (base, _) = start("/media/video.m4s").await;
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = common::failing_ffmpeg(dir.path());
    let client = common::client(&base, dir.path(), &ffmpeg);

    let job = job(&client, dir.path(), DownloadMode::default()).await;
    let err = client
        .download_job(&job, &ProgressReporter::noop())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transcode);
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("Invalid data found when processing input"));
    assert!(dir.path().join("Demo_ video_1_video.m4s").exists());
    assert!(dir.path().join("Demo_ video_1_audio.m4s").exists());
}

#[tokio::test]
async fn test_unsupported_audio_format_is_rejected_up_front() {
    let (base, hits) = start("/media/video.m4s").await;
    let dir = tempfile::tempdir().unwrap();
    let client = common::client(&base, dir.path(), &dir.path().join("no-such-ffmpeg"));

    let mode = DownloadMode::AudioOnly {
        audio_quality: 30216,
        format: "opus".to_string(),
    };
    let job = job(&client, dir.path(), mode).await;
    let err = client
        .download_job(&job, &ProgressReporter::noop())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_eq!(hits.audio.load(Ordering::SeqCst), 0);
}
