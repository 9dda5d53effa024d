//! Wire models of the platform's JSON responses.

use serde::Deserialize;

use crate::error::{PlatformError, Result};

/// Common `{ code, message, data }` envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Unwrap `data`, mapping platform rejection codes onto the error taxonomy.
    pub fn into_data(self, what: &str) -> Result<T> {
        match self.code {
            0 => self
                .data
                .ok_or_else(|| PlatformError::protocol(format!("{what}: response has no data"))),
            -404 | 62002 | 62004 => Err(PlatformError::NotFound(format!(
                "{what}: {} ({})",
                self.message, self.code
            ))),
            -101 => Err(PlatformError::auth(format!(
                "{what}: {} ({})",
                self.message, self.code
            ))),
            code => Err(PlatformError::protocol(format!(
                "{what} rejected: {} ({code})",
                self.message
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct QrGenerateData {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub qrcode_key: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QrPollData {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NavData {
    #[serde(rename = "isLogin", default)]
    pub is_login: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoView {
    pub bvid: String,
    pub aid: u64,
    pub cid: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pic: String,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub owner: VideoOwner,
    #[serde(default)]
    pub stat: VideoStat,
    #[serde(default)]
    pub pages: Vec<VideoPage>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct VideoOwner {
    #[serde(default)]
    pub mid: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct VideoStat {
    #[serde(default)]
    pub view: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoPage {
    pub cid: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub part: String,
    #[serde(default)]
    pub duration: u64,
}

/// `playurl` payload. Carries either `dash` (separate streams) or `durl`
/// (legacy merged delivery).
#[derive(Debug, Deserialize)]
pub(crate) struct PlayUrlData {
    #[serde(default)]
    pub quality: u32,
    #[serde(default)]
    pub accept_quality: Vec<u32>,
    pub dash: Option<Dash>,
    pub durl: Option<Vec<Durl>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Dash {
    pub video: Option<Vec<DashStream>>,
    pub audio: Option<Vec<DashStream>>,
}

// The platform sends both `baseUrl` and `base_url`; only the camel-case key is
// read so the duplicate is ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct DashStream {
    pub id: u32,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(rename = "backupUrl", default)]
    pub backup_url: Option<Vec<String>>,
    #[serde(default)]
    pub bandwidth: u64,
    #[serde(default)]
    pub codecs: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Durl {
    pub url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub backup_url: Option<Vec<String>>,
}
