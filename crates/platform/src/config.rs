//! Endpoint and HTTP session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Base URLs of the platform hosts.
///
/// Paths are fixed; only the hosts are configurable so the client can be
/// pointed at a local server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub passport_base: String,
    pub api_base: String,
    /// Sent as `Referer` on every request.
    pub web_origin: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            passport_base: "https://passport.bilibili.com".to_string(),
            api_base: "https://api.bilibili.com".to_string(),
            web_origin: "https://www.bilibili.com".to_string(),
        }
    }
}

impl Endpoints {
    pub const QR_GENERATE: &'static str = "/x/passport-login/web/qrcode/generate";
    pub const QR_POLL: &'static str = "/x/passport-login/web/qrcode/poll";
    pub const NAV: &'static str = "/x/web-interface/nav";
    pub const VIEW: &'static str = "/x/web-interface/view";
    pub const PLAY_URL: &'static str = "/x/player/playurl";

    /// Use one base URL for every host.
    pub fn all_at(base: &str) -> Self {
        Self {
            passport_base: base.to_string(),
            api_base: base.to_string(),
            web_origin: base.to_string(),
        }
    }

    pub fn passport(&self, path: &str) -> String {
        join(&self.passport_base, path)
    }

    pub fn api(&self, path: &str) -> String {
        join(&self.api_base, path)
    }
}

fn join(base: &str, path: &str) -> String {
    let mut url = String::with_capacity(base.len() + path.len());
    url.push_str(base.trim_end_matches('/'));
    url.push_str(path);
    url
}

/// HTTP client settings shared by every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub user_agent: String,
    /// Whole-request timeout for JSON API calls.
    pub api_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Maximum gap between received chunks, applies to streamed downloads.
    pub read_timeout_secs: u64,
    pub ip_echo_timeout_secs: u64,
    /// Tried in order; the first one that answers wins.
    pub ip_echo_services: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_UA.to_string(),
            api_timeout_secs: 30,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            ip_echo_timeout_secs: 5,
            ip_echo_services: vec![
                "https://api.ipify.org?format=json".to_string(),
                "https://api64.ipify.org?format=json".to_string(),
                "https://ifconfig.me/ip".to_string(),
            ],
        }
    }
}

impl SessionConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn ip_echo_timeout(&self) -> Duration {
        Duration::from_secs(self.ip_echo_timeout_secs)
    }
}
