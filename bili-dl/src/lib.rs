//! Bilibili video downloader.
//!
//! Builds on [`bili_platform`] for login and stream resolution, and adds the
//! parts that touch the local machine:
//!
//! - [`download::Downloader`] - streamed HTTP download with progress
//! - [`transcode::Transcoder`] - ffmpeg merge and conversion
//! - [`job::JobRunner`] - the resolve, download, post-process pipeline
//! - [`BiliClient`] - facade wiring everything to one session and login

pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod filename;
pub mod job;
pub mod logging;
pub mod progress;
pub mod transcode;

pub use client::BiliClient;
pub use config::AppConfig;
pub use error::{Error, ErrorKind, Outcome, Result};
pub use job::{Container, DownloadJob, DownloadMode, JobOutput};
pub use logging::{LogConfig, LoggingHandle, init_logging};
pub use progress::{Progress, ProgressReporter};
