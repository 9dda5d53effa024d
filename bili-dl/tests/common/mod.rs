#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use bili_dl::{AppConfig, BiliClient};
use bili_platform::credentials::MemoryStorage;
use bili_platform::{Endpoints, SessionConfig};
use tokio::net::TcpListener;

/// Serve the router built by `build` (which receives the server's base URL)
/// on an ephemeral port.
pub async fn serve_with(build: impl FnOnce(String) -> Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let router = build(base.clone());
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    base
}

pub fn config(base: &str, data_dir: &Path, ffmpeg: &Path) -> AppConfig {
    AppConfig {
        data_dir: data_dir.to_path_buf(),
        ffmpeg_path: ffmpeg.to_string_lossy().into_owned(),
        session: SessionConfig {
            api_timeout_secs: 5,
            ip_echo_services: Vec::new(),
            ..SessionConfig::default()
        },
        endpoints: Endpoints::all_at(base),
        ..AppConfig::default()
    }
}

pub fn client(base: &str, data_dir: &Path, ffmpeg: &Path) -> BiliClient {
    let storage = Arc::new(MemoryStorage::new());
    BiliClient::with_storage(config(base, data_dir, ffmpeg), storage).unwrap()
}

/// A stand-in for ffmpeg: answers `-version`, appends its arguments to
/// `ffmpeg-args.log` next to itself and creates the output file (the last
/// argument).
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    let log = dir.join("ffmpeg-args.log");
    write_script(
        dir,
        "ffmpeg",
        &format!(
            "if [ \"$1\" = \"-version\" ]; then echo 'ffmpeg version fake'; exit 0; fi\n\
             echo \"$*\" >> '{}'\n\
             for last; do :; done\n\
             : > \"$last\"",
            log.display()
        ),
    )
}

/// An ffmpeg that starts but fails every conversion.
#[cfg(unix)]
pub fn failing_ffmpeg(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "ffmpeg-broken",
        "if [ \"$1\" = \"-version\" ]; then exit 0; fi\n\
         echo 'Invalid data found when processing input' >&2\n\
         exit 1",
    )
}

#[cfg(unix)]
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn ffmpeg_calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("ffmpeg-args.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
