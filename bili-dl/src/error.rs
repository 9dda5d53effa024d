//! Application-wide error types.

use bili_platform::PlatformError;
use reqwest::StatusCode;
use thiserror::Error;

use crate::download::DownloadError;
use crate::transcode::TranscodeError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),
}

/// Coarse classification used to decide between retrying, logging in again
/// and asking the user to fix their input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    HttpStatus,
    Protocol,
    Auth,
    ToolMissing,
    Transcode,
    InvalidReference,
    UnsupportedFormat,
    InvalidJob,
    NotFound,
    Io,
    Configuration,
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Platform(e) => match e {
                PlatformError::Network(_) => ErrorKind::Network,
                PlatformError::HttpStatus { .. } => ErrorKind::HttpStatus,
                PlatformError::Protocol(_) | PlatformError::Json(_) => ErrorKind::Protocol,
                PlatformError::Auth(_) => ErrorKind::Auth,
                PlatformError::InvalidReference(_) => ErrorKind::InvalidReference,
                PlatformError::NotFound(_) => ErrorKind::NotFound,
                PlatformError::Config(_) => ErrorKind::Configuration,
                PlatformError::Io(_) => ErrorKind::Io,
            },
            Self::Download(e) => match e {
                DownloadError::Network { .. } | DownloadError::Incomplete { .. } => {
                    ErrorKind::Network
                }
                DownloadError::HttpStatus { .. } => ErrorKind::HttpStatus,
                DownloadError::Io { .. } => ErrorKind::Io,
            },
            Self::Transcode(e) => match e {
                TranscodeError::ToolMissing { .. } => ErrorKind::ToolMissing,
                TranscodeError::Failed { .. } => ErrorKind::Transcode,
                TranscodeError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
                TranscodeError::Io(_) => ErrorKind::Io,
            },
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::InvalidJob(_) => ErrorKind::InvalidJob,
        }
    }

    /// Network failures always, HTTP 5xx/429 and truncated transfers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Platform(e) => e.is_retryable(),
            Self::Download(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn requires_relogin(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }
}

pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Success flag plus a message for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    pub fn from_result<T>(result: &Result<T>, on_success: impl FnOnce(&T) -> String) -> Self {
        match result {
            Ok(value) => Self::ok(on_success(value)),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}
