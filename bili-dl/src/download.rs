//! Streaming HTTP download to a file.

use std::path::{Path, PathBuf};

use bili_platform::HttpSession;
use bili_platform::cookie_utils::CookieMap;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::ACCEPT_ENCODING;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use crate::error::is_transient_status;
use crate::progress::{Progress, ProgressReporter};

/// Progress is reported every this many bytes when the size is unknown.
const INDETERMINATE_STEP: u64 = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("transfer ended after {received} of {expected} bytes")]
    Incomplete { expected: u64, received: u64 },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Incomplete { .. } => true,
            Self::HttpStatus { status, .. } => is_transient_status(*status),
            Self::Io { .. } => false,
        }
    }

    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Streams URLs to files through the shared session.
///
/// At most one attempt per call. A failed transfer leaves its partial file in
/// place.
#[derive(Debug, Clone)]
pub struct Downloader {
    session: HttpSession,
}

impl Downloader {
    pub fn new(session: HttpSession) -> Self {
        Self { session }
    }

    /// Download `url` into `dest`, returning the number of bytes written.
    ///
    /// Percent values are non-decreasing and end at 100. When the server sends
    /// no length, events carry `total == 0` until the final one.
    #[instrument(skip(self, url, dest, cookies, reporter), fields(dest = %dest.display()))]
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cookies: Option<&CookieMap>,
        label: &str,
        reporter: &ProgressReporter,
    ) -> Result<u64, DownloadError> {
        let response = self
            .session
            .stream_get(url, cookies)
            .header(ACCEPT_ENCODING, "identity")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }

        let total = response.content_length().unwrap_or(0);
        debug!(total, "Download started");

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(DownloadError::io(dest))?;
        }
        let file = File::create(dest).await.map_err(DownloadError::io(dest))?;
        let mut writer = BufWriter::new(file);

        reporter.report(Progress::new(0, total, label));

        let mut stream = response.bytes_stream();
        let mut done: u64 = 0;
        let mut last_step: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer
                .write_all(&chunk)
                .await
                .map_err(DownloadError::io(dest))?;
            done += chunk.len() as u64;

            // Permille of the total, or MiB count when the total is unknown.
            let step = if total > 0 {
                (done.min(total) * 1000) / total
            } else {
                done / INDETERMINATE_STEP
            };
            if step > last_step {
                last_step = step;
                reporter.report(Progress::new(done, total, label));
            }
        }

        writer.flush().await.map_err(DownloadError::io(dest))?;

        if total > 0 && done != total {
            return Err(DownloadError::Incomplete {
                expected: total,
                received: done,
            });
        }

        reporter.report(Progress::complete(done, label));
        debug!(bytes = done, "Download finished");
        Ok(done)
    }
}
