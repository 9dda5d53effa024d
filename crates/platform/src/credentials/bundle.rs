use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cookie_utils::{CookieMap, SESSION_COOKIE, cookie_header, parse_cookie_string};

/// Saved logins older than this are discarded.
pub const MAX_CREDENTIAL_AGE: Duration = Duration::from_secs(30 * 24 * 3600);

/// A login: cookies, the public IP it was saved from and when it was issued.
///
/// Serialized as `{ "cookies": {..}, "ip": "..." | null, "timestamp": 1700000000.0 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBundle {
    #[serde(default)]
    pub cookies: CookieMap,
    #[serde(default)]
    pub ip: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

pub(crate) fn unix_now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

impl CredentialBundle {
    pub fn new(cookies: CookieMap) -> Self {
        Self {
            cookies,
            ip: None,
            timestamp: unix_now(),
            refresh_token: None,
        }
    }

    /// Build a bundle from a pasted browser cookie string.
    pub fn from_cookie_string(cookies: &str) -> Self {
        Self::new(parse_cookie_string(cookies))
    }

    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token.filter(|t| !t.is_empty());
        self
    }

    pub fn session_data(&self) -> Option<&str> {
        self.cookies
            .get(SESSION_COOKIE)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// A bundle without the session cookie is never valid.
    pub fn has_session(&self) -> bool {
        self.session_data().is_some()
    }

    pub fn cookie_header(&self) -> String {
        cookie_header(&self.cookies)
    }

    pub fn age_secs(&self, now: f64) -> f64 {
        now - self.timestamp
    }

    pub fn is_expired_at(&self, now: f64) -> bool {
        self.age_secs(now) > MAX_CREDENTIAL_AGE.as_secs_f64()
    }
}
