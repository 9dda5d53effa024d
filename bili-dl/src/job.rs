//! Download jobs: resolve, download, post-process.
//!
//! A job runs its stages strictly in order (video, audio, then ffmpeg) and
//! stops at the first failure. Intermediate files from a failed stage are
//! left on disk.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use bili_platform::{
    CredentialStore, Delivery, MediaDescriptor, MediaPage, PlatformError, StreamResolver, StreamUrl,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::download::{DownloadError, Downloader};
use crate::error::{Error, Result};
use crate::filename::sanitize_filename;
use crate::progress::ProgressReporter;
use crate::transcode::{SUPPORTED_AUDIO_FORMATS, TranscodeError, Transcoder};

/// 1080P.
pub const DEFAULT_VIDEO_QUALITY: u32 = 80;
/// 128K.
pub const DEFAULT_AUDIO_QUALITY: u32 = 30216;

/// Anonymous sessions are capped below this tier.
const LOGIN_REQUIRED_QUALITY: u32 = 80;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Flv,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Flv => "flv",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Container {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "flv" => Ok(Self::Flv),
            other => Err(Error::invalid_job(format!("unsupported container `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DownloadMode {
    /// Video and audio merged into one file.
    Merged {
        video_quality: u32,
        audio_quality: u32,
        container: Container,
    },
    VideoOnly {
        video_quality: u32,
        container: Container,
    },
    /// Audio converted to one of [`SUPPORTED_AUDIO_FORMATS`].
    AudioOnly { audio_quality: u32, format: String },
}

impl Default for DownloadMode {
    fn default() -> Self {
        Self::Merged {
            video_quality: DEFAULT_VIDEO_QUALITY,
            audio_quality: DEFAULT_AUDIO_QUALITY,
            container: Container::Mp4,
        }
    }
}

impl DownloadMode {
    fn video_quality(&self) -> Option<u32> {
        match self {
            Self::Merged { video_quality, .. } | Self::VideoOnly { video_quality, .. } => {
                Some(*video_quality)
            }
            Self::AudioOnly { .. } => None,
        }
    }

    fn audio_quality(&self) -> Option<u32> {
        match self {
            Self::Merged { audio_quality, .. } | Self::AudioOnly { audio_quality, .. } => {
                Some(*audio_quality)
            }
            Self::VideoOnly { .. } => None,
        }
    }

    pub fn extension(&self) -> String {
        match self {
            Self::Merged { container, .. } | Self::VideoOnly { container, .. } => {
                container.extension().to_string()
            }
            Self::AudioOnly { format, .. } => format.to_ascii_lowercase(),
        }
    }
}

/// One part of one video, to be written into `output_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub bvid: String,
    pub cid: u64,
    pub title: String,
    pub output_dir: PathBuf,
    pub mode: DownloadMode,
}

impl DownloadJob {
    /// The first part of `descriptor`.
    pub fn new(
        descriptor: &MediaDescriptor,
        output_dir: impl Into<PathBuf>,
        mode: DownloadMode,
    ) -> Self {
        Self {
            bvid: descriptor.bvid.clone(),
            cid: descriptor.cid,
            title: descriptor.title.clone(),
            output_dir: output_dir.into(),
            mode,
        }
    }

    /// A specific part of a multi-part video. The part title is appended
    /// unless the video has a single part.
    pub fn for_page(
        descriptor: &MediaDescriptor,
        page: &MediaPage,
        output_dir: impl Into<PathBuf>,
        mode: DownloadMode,
    ) -> Self {
        let title = if descriptor.pages.len() > 1 {
            format!("{} - P{} {}", descriptor.title, page.index, page.title)
        } else {
            descriptor.title.clone()
        };
        Self {
            bvid: descriptor.bvid.clone(),
            cid: page.cid,
            title,
            output_dir: output_dir.into(),
            mode,
        }
    }

    fn stem(&self) -> String {
        sanitize_filename(&self.title)
    }

    /// `<output_dir>/<stem><suffix>`.
    fn sibling(&self, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{}{suffix}", self.stem()))
    }

    pub fn output_path(&self) -> PathBuf {
        self.sibling(&format!(".{}", self.mode.extension()))
    }

    fn validate(&self) -> Result<()> {
        if let DownloadMode::AudioOnly { format, .. } = &self.mode
            && !SUPPORTED_AUDIO_FORMATS.contains(&format.to_ascii_lowercase().as_str())
        {
            return Err(TranscodeError::UnsupportedFormat(format.clone()).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    pub path: PathBuf,
    /// Bytes transferred across all downloads of the job.
    pub downloaded: u64,
}

/// Runs [`DownloadJob`]s. Stateless between jobs, so independent jobs can run
/// concurrently.
#[derive(Clone)]
pub struct JobRunner {
    resolver: StreamResolver,
    downloader: Downloader,
    transcoder: Transcoder,
    store: Arc<CredentialStore>,
}

impl JobRunner {
    pub fn new(
        resolver: StreamResolver,
        downloader: Downloader,
        transcoder: Transcoder,
        store: Arc<CredentialStore>,
    ) -> Self {
        Self {
            resolver,
            downloader,
            transcoder,
            store,
        }
    }

    #[instrument(skip_all, fields(bvid = %job.bvid, cid = job.cid))]
    pub async fn run(&self, job: &DownloadJob, reporter: &ProgressReporter) -> Result<JobOutput> {
        job.validate()?;
        self.transcoder.ensure_available().await?;

        if let Some(quality) = job.mode.video_quality()
            && quality >= LOGIN_REQUIRED_QUALITY
            && !self.store.is_authenticated()
        {
            warn!(quality, "Not logged in; the platform may serve a lower quality");
        }

        let streams = self
            .resolver
            .resolve_urls(
                &job.bvid,
                job.cid,
                job.mode.video_quality().unwrap_or(DEFAULT_VIDEO_QUALITY),
                job.mode.audio_quality().unwrap_or(DEFAULT_AUDIO_QUALITY),
            )
            .await?;
        if streams.is_empty() {
            return Err(PlatformError::NotFound(format!(
                "no downloadable stream for {}/{}",
                job.bvid, job.cid
            ))
            .into());
        }

        tokio::fs::create_dir_all(&job.output_dir)
            .await
            .map_err(|source| DownloadError::Io {
                path: job.output_dir.clone(),
                source,
            })?;

        let output = job.output_path();
        let downloaded = match &job.mode {
            DownloadMode::Merged { container, .. } => {
                match (streams.delivery, &streams.video, &streams.audio) {
                    (Delivery::Dash, Some(video), Some(audio)) => {
                        self.merged(job, video, audio, *container, &output, reporter)
                            .await?
                    }
                    (_, Some(video), _) => self.single(job, video, &output, reporter).await?,
                    (_, None, _) => {
                        return Err(Error::invalid_job("the video has no video stream"));
                    }
                }
            }
            DownloadMode::VideoOnly { .. } => {
                let video = streams
                    .video
                    .as_ref()
                    .ok_or_else(|| Error::invalid_job("the video has no video stream"))?;
                self.single(job, video, &output, reporter).await?
            }
            DownloadMode::AudioOnly { format, .. } => {
                let audio = streams
                    .audio
                    .as_ref()
                    .ok_or_else(|| Error::invalid_job("the video has no separate audio stream"))?;
                let temp = job.sibling("_temp.m4s");
                let bytes = self.download(audio, &temp, "audio", reporter).await?;
                self.transcoder
                    .convert_audio(&temp, &output, format, reporter)
                    .await?;
                bytes
            }
        };

        info!(output = %output.display(), downloaded, "Job finished");
        Ok(JobOutput {
            path: output,
            downloaded,
        })
    }

    async fn merged(
        &self,
        job: &DownloadJob,
        video: &StreamUrl,
        audio: &StreamUrl,
        container: Container,
        output: &Path,
        reporter: &ProgressReporter,
    ) -> Result<u64> {
        let video_path = job.sibling("_video.m4s");
        let audio_path = job.sibling("_audio.m4s");

        let mut bytes = self.download(video, &video_path, "video", reporter).await?;
        bytes += self.download(audio, &audio_path, "audio", reporter).await?;

        match container {
            Container::Mp4 => {
                self.transcoder
                    .merge_video_audio(&video_path, &audio_path, output, reporter)
                    .await?;
            }
            Container::Flv => {
                let merged = job.sibling("_temp.mp4");
                self.transcoder
                    .merge_video_audio(&video_path, &audio_path, &merged, reporter)
                    .await?;
                self.transcoder
                    .convert_container(&merged, output, reporter)
                    .await?;
            }
        }
        Ok(bytes)
    }

    /// One stream remuxed into the output container: video-only DASH or
    /// legacy merged delivery.
    async fn single(
        &self,
        job: &DownloadJob,
        stream: &StreamUrl,
        output: &Path,
        reporter: &ProgressReporter,
    ) -> Result<u64> {
        let temp = job.sibling(&format!("_temp.{}", temp_extension(&stream.url)));
        let bytes = self.download(stream, &temp, "video", reporter).await?;
        self.transcoder
            .convert_container(&temp, output, reporter)
            .await?;
        Ok(bytes)
    }

    /// Try the primary URL, then each backup once. Local I/O failures are not
    /// retried.
    async fn download(
        &self,
        stream: &StreamUrl,
        dest: &Path,
        label: &str,
        reporter: &ProgressReporter,
    ) -> Result<u64> {
        let cookies = self.store.cookies();
        let mut last_error = None;

        for (attempt, url) in stream.candidates().enumerate() {
            match self
                .downloader
                .fetch(url, dest, cookies.as_ref(), label, reporter)
                .await
            {
                Ok(bytes) => return Ok(bytes),
                Err(e @ DownloadError::Io { .. }) => return Err(e.into()),
                Err(e) => {
                    warn!(attempt, label, error = %e, "Download attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .map(Error::from)
            .unwrap_or_else(|| Error::invalid_job(format!("no URL for the {label} stream"))))
    }
}

/// Intermediate extension for a downloaded stream, from its URL path.
fn temp_extension(url: &str) -> &'static str {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();
    if path.ends_with(".flv") {
        "flv"
    } else if path.ends_with(".mp4") {
        "mp4"
    } else {
        "m4s"
    }
}
