//! Application configuration.
//!
//! Defaults, optionally overridden from the environment (and a `.env` file).

use std::path::PathBuf;

use bili_platform::{Endpoints, SessionConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging::LogConfig;

/// Name of the saved login inside the data directory.
pub const CREDENTIAL_FILE: &str = ".bili_login.json";

pub const ENV_DATA_DIR: &str = "BILI_DL_DATA_DIR";
pub const ENV_FFMPEG_PATH: &str = "FFMPEG_PATH";
pub const ENV_LOG_FILTER: &str = "BILI_DL_LOG_FILTER";
pub const ENV_LOG_DIR: &str = "BILI_DL_LOG_DIR";
pub const ENV_TIMEOUT_SECS: &str = "BILI_DL_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub ffmpeg_path: String,
    pub session: SessionConfig,
    pub endpoints: Endpoints,
    pub logging: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            ffmpeg_path: "ffmpeg".to_string(),
            session: SessionConfig::default(),
            endpoints: Endpoints::default(),
            logging: LogConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn credential_path(&self) -> PathBuf {
        self.data_dir.join(CREDENTIAL_FILE)
    }

    /// Defaults overridden by the process environment, after loading `.env`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns. Empty values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(dir) = get(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = get(ENV_FFMPEG_PATH) {
            config.ffmpeg_path = path;
        }
        if let Some(filter) = get(ENV_LOG_FILTER) {
            config.logging.filter = filter;
        }
        if let Some(dir) = get(ENV_LOG_DIR) {
            config.logging.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = get(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.parse().ok().filter(|secs| *secs > 0).ok_or_else(|| {
                Error::config(format!(
                    "{ENV_TIMEOUT_SECS} must be a positive integer, got `{raw}`"
                ))
            })?;
            config.session.api_timeout_secs = secs;
        }

        Ok(config)
    }
}
