//! QR code login.
//!
//! [`QrLoginSession`] is a step function: every [`QrLoginSession::poll`] call
//! performs one request and one state transition. The caller owns the delay
//! between polls ([`POLL_INTERVAL`] is what the platform expects).
//!
//! ```text
//! Idle -> ChallengeIssued -> { Waiting, Scanned } -> { Confirmed, Expired, Failed }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};

use crate::config::Endpoints;
use crate::cookie_utils::{cookies_from_cross_domain_url, parse_set_cookies};
use crate::credentials::{CredentialBundle, CredentialStore};
use crate::error::{PlatformError, Result};
use crate::models::{ApiResponse, QrGenerateData, QrPollData};
use crate::session::HttpSession;

/// Delay between polls expected by the platform. Polling faster risks being
/// rate limited.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

const STATUS_CONFIRMED: i64 = 0;
const STATUS_WAITING: i64 = 86101;
const STATUS_SCANNED: i64 = 86090;
const STATUS_EXPIRED: i64 = 86038;

/// A login challenge: the URL to render as a QR code and the key to poll with.
///
/// Single use. Once a poll reaches a terminal state the challenge is discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrChallenge {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    ChallengeIssued,
    /// Not scanned yet.
    Waiting,
    /// Scanned, waiting for confirmation on the phone.
    Scanned,
    Confirmed,
    /// Terminal. A new challenge must be requested.
    Expired,
    Failed(String),
}

impl LoginState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Expired | Self::Failed(_))
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ChallengeIssued => write!(f, "QR code ready, please scan"),
            Self::Waiting => write!(f, "waiting for scan"),
            Self::Scanned => write!(f, "scanned, please confirm on your phone"),
            Self::Confirmed => write!(f, "login confirmed"),
            Self::Expired => write!(f, "QR code expired, please request a new one"),
            Self::Failed(reason) => write!(f, "login failed: {reason}"),
        }
    }
}

/// One QR login attempt.
///
/// On confirmation the resulting credentials are handed to the
/// [`CredentialStore`]; the session itself never touches storage.
pub struct QrLoginSession {
    session: HttpSession,
    store: Arc<CredentialStore>,
    state: LoginState,
    active: Option<QrChallenge>,
}

impl QrLoginSession {
    pub fn new(session: HttpSession, store: Arc<CredentialStore>) -> Self {
        Self {
            session,
            store,
            state: LoginState::Idle,
            active: None,
        }
    }

    pub fn state(&self) -> &LoginState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == LoginState::Confirmed
    }

    /// Request a new challenge, replacing any active one.
    pub async fn begin_challenge(&mut self) -> Result<QrChallenge> {
        let url = self.session.endpoints().passport(Endpoints::QR_GENERATE);
        let response: ApiResponse<QrGenerateData> =
            self.session.send_json(self.session.api_get(&url, None)).await?;
        let data = response.into_data("QR generate")?;

        if data.url.is_empty() || data.qrcode_key.is_empty() {
            return Err(PlatformError::protocol(
                "QR generate response is missing url or qrcode_key",
            ));
        }

        let challenge = QrChallenge {
            url: data.url,
            key: data.qrcode_key,
        };
        self.active = Some(challenge.clone());
        self.transition(LoginState::ChallengeIssued);
        Ok(challenge)
    }

    /// Poll the challenge once.
    ///
    /// Transport and HTTP failures are returned as errors and leave the state
    /// unchanged so the caller may poll again. Platform-level rejections are
    /// reported as [`LoginState::Failed`].
    pub async fn poll(&mut self, challenge: &QrChallenge) -> Result<LoginState> {
        if self.active.as_ref() != Some(challenge) {
            return Err(PlatformError::auth(
                "challenge is not active, request a new QR code",
            ));
        }

        let url = self.session.endpoints().passport(Endpoints::QR_POLL);
        let request = self
            .session
            .api_get(&url, None)
            .query(&[("qrcode_key", challenge.key.as_str())]);
        let (response, headers): (ApiResponse<QrPollData>, _) =
            self.session.send_json_with_headers(request).await?;

        let next = if response.code != 0 {
            LoginState::Failed(format!(
                "poll rejected: {} ({})",
                response.message, response.code
            ))
        } else {
            let data = response
                .data
                .ok_or_else(|| PlatformError::protocol("QR poll response has no data"))?;
            debug!(code = data.code, message = %data.message, "QR poll status");

            match data.code {
                STATUS_WAITING => LoginState::Waiting,
                STATUS_SCANNED => LoginState::Scanned,
                STATUS_EXPIRED => LoginState::Expired,
                STATUS_CONFIRMED => self.confirm(&headers, data).await,
                code => LoginState::Failed(format!("unknown poll status {code}: {}", data.message)),
            }
        };

        self.transition(next.clone());
        Ok(next)
    }

    async fn confirm(&self, headers: &HeaderMap, data: QrPollData) -> LoginState {
        // Set-Cookie values win; the URL only fills in what is missing.
        let mut cookies = parse_set_cookies(headers);
        for (name, value) in cookies_from_cross_domain_url(&data.url) {
            cookies.entry(name).or_insert(value);
        }

        let bundle = CredentialBundle::new(cookies).with_refresh_token(Some(data.refresh_token));
        if !bundle.has_session() {
            warn!("Platform confirmed the login but sent no session cookie");
            let reason = PlatformError::auth("missing session credential");
            return LoginState::Failed(reason.to_string());
        }

        match self.store.save(bundle).await {
            Ok(saved) => info!(ip = ?saved.ip, "QR login confirmed"),
            Err(e) => warn!(error = %e, "QR login confirmed but the login could not be saved"),
        }
        LoginState::Confirmed
    }

    fn transition(&mut self, next: LoginState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "QR login state changed");
        }
        if next.is_terminal() {
            self.active = None;
        }
        self.state = next;
    }
}
