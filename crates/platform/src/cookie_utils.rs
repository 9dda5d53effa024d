//! Cookie helpers.
//!
//! Cookies are carried as an ordered name → value map and rendered into a
//! single `Cookie` header when a request needs them.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, SET_COOKIE};

pub type CookieMap = BTreeMap<String, String>;

/// The cookie that carries the login session. Credentials without it are
/// never considered valid.
pub const SESSION_COOKIE: &str = "SESSDATA";

/// Cookies the platform expects first in the header.
const PRIORITY_COOKIES: [&str; 4] = [SESSION_COOKIE, "bili_jct", "DedeUserID", "DedeUserID__ckMd5"];

/// Query parameters of the login cross-domain URL that are really cookies.
const CROSS_DOMAIN_COOKIES: [&str; 5] = [
    SESSION_COOKIE,
    "bili_jct",
    "DedeUserID",
    "DedeUserID__ckMd5",
    "sid",
];

fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let (name, value) = pair.trim().split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some((name, value.trim()))
}

/// Parse a `name=value; name2=value2` cookie string.
///
/// # Example
/// ```
/// use bili_platform::cookie_utils::parse_cookie_string;
///
/// let cookies = parse_cookie_string("SESSDATA=abc123; bili_jct=xyz789");
/// assert_eq!(cookies.get("SESSDATA").map(String::as_str), Some("abc123"));
/// ```
pub fn parse_cookie_string(cookies: &str) -> CookieMap {
    cookies
        .split(';')
        .filter_map(split_pair)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Render a `Cookie` header value, priority cookies first.
pub fn cookie_header(cookies: &CookieMap) -> String {
    let mut parts = Vec::with_capacity(cookies.len());

    for key in PRIORITY_COOKIES {
        if let Some(value) = cookies.get(key) {
            parts.push(format!("{key}={value}"));
        }
    }

    for (key, value) in cookies {
        if !PRIORITY_COOKIES.contains(&key.as_str()) {
            parts.push(format!("{key}={value}"));
        }
    }

    parts.join("; ")
}

/// Collect cookies from `Set-Cookie` response headers, ignoring attributes.
pub fn parse_set_cookies(headers: &HeaderMap) -> CookieMap {
    let mut cookies = CookieMap::new();

    for value in headers.get_all(SET_COOKIE) {
        let Ok(raw) = value.to_str() else {
            continue;
        };
        if let Some((name, value)) = raw.split(';').next().and_then(split_pair) {
            cookies.insert(name.to_string(), value.to_string());
        }
    }

    cookies
}

/// Extract login cookies from the cross-domain URL returned by a confirmed
/// QR login (`...crossDomain?DedeUserID=..&SESSDATA=..&bili_jct=..`).
///
/// Values are taken from the raw query text, still percent-encoded, so they
/// match what the platform sends in `Set-Cookie`.
pub fn cookies_from_cross_domain_url(raw: &str) -> CookieMap {
    let Ok(parsed) = url::Url::parse(raw) else {
        return CookieMap::new();
    };

    parsed
        .query()
        .unwrap_or_default()
        .split('&')
        .filter_map(split_pair)
        .filter(|(name, value)| CROSS_DOMAIN_COOKIES.contains(name) && !value.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
