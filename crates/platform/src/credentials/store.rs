use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::bundle::{CredentialBundle, unix_now};
use super::ip::IpDiscovery;
use super::storage::{CredentialStorage, FileStorage};
use crate::config::Endpoints;
use crate::cookie_utils::CookieMap;
use crate::error::{PlatformError, Result};
use crate::models::{ApiResponse, NavData};
use crate::session::HttpSession;

/// Why a saved login was not loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadRejection {
    NoSavedState,
    /// Unparsable record, or no session cookie.
    InvalidData,
    Expired,
    IpChanged { saved: String, current: String },
    Unreadable(String),
}

impl fmt::Display for LoadRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSavedState => write!(f, "no saved state"),
            Self::InvalidData => write!(f, "invalid data"),
            Self::Expired => write!(f, "expired"),
            Self::IpChanged { saved, current } => {
                write!(f, "IP changed ({saved} -> {current}), please log in again")
            }
            Self::Unreadable(reason) => write!(f, "saved state unreadable: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(CredentialBundle),
    Rejected(LoadRejection),
}

impl LoadOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn bundle(&self) -> Option<&CredentialBundle> {
        match self {
            Self::Loaded(bundle) => Some(bundle),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&LoadRejection> {
        match self {
            Self::Loaded(_) => None,
            Self::Rejected(reason) => Some(reason),
        }
    }
}

/// Result of the start-up `load` + `validate` sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub authenticated: bool,
    pub message: String,
}

impl RestoreOutcome {
    fn unauthenticated(message: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Default)]
struct AuthState {
    bundle: Option<CredentialBundle>,
    authenticated: bool,
}

/// Owner of the login state.
///
/// The only component that writes the durable record. Writers (`save`,
/// `clear`) are serialized.
pub struct CredentialStore {
    storage: Arc<dyn CredentialStorage>,
    session: HttpSession,
    ip: IpDiscovery,
    state: RwLock<AuthState>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn CredentialStorage>, session: HttpSession) -> Self {
        Self {
            storage,
            ip: IpDiscovery::new(session.clone()),
            session,
            state: RwLock::new(AuthState::default()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_file(path: impl Into<PathBuf>, session: HttpSession) -> Self {
        Self::new(Arc::new(FileStorage::new(path)), session)
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().authenticated
    }

    pub fn current(&self) -> Option<CredentialBundle> {
        self.state.read().bundle.clone()
    }

    /// Cookies to attach to platform requests, if logged in.
    pub fn cookies(&self) -> Option<CookieMap> {
        self.state.read().bundle.as_ref().map(|b| b.cookies.clone())
    }

    /// Stamp the bundle with the current public IP and time, make it the live
    /// login and write it durably.
    ///
    /// The in-memory login is updated even if the durable write fails.
    #[instrument(skip_all)]
    pub async fn save(&self, mut bundle: CredentialBundle) -> Result<CredentialBundle> {
        let _guard = self.write_lock.lock().await;

        bundle.ip = self.ip.current_ip().await;
        bundle.timestamp = unix_now();

        {
            let mut state = self.state.write();
            state.bundle = Some(bundle.clone());
            state.authenticated = true;
        }

        let record = serde_json::to_string_pretty(&bundle)?;
        self.storage.write(&record).await?;

        info!(ip = ?bundle.ip, "Login state saved");
        Ok(bundle)
    }

    /// Read the saved login and apply the expiry and IP-change policy.
    ///
    /// Fails closed. Expired and IP-changed records are cleared.
    #[instrument(skip_all)]
    pub async fn load(&self) -> LoadOutcome {
        let record = match self.storage.read().await {
            Ok(Some(record)) => record,
            Ok(None) => return LoadOutcome::Rejected(LoadRejection::NoSavedState),
            Err(e) => {
                warn!(error = %e, "Failed to read saved login state");
                return LoadOutcome::Rejected(LoadRejection::Unreadable(e.to_string()));
            }
        };

        let bundle: CredentialBundle = match serde_json::from_str(&record) {
            Ok(bundle) => bundle,
            Err(e) => {
                debug!(error = %e, "Saved login state is not parsable");
                return LoadOutcome::Rejected(LoadRejection::InvalidData);
            }
        };

        if !bundle.has_session() {
            return LoadOutcome::Rejected(LoadRejection::InvalidData);
        }

        if bundle.is_expired_at(unix_now()) {
            info!("Saved login is older than 30 days, discarding");
            self.clear().await;
            return LoadOutcome::Rejected(LoadRejection::Expired);
        }

        if let Some(saved) = bundle.ip.clone().filter(|ip| !ip.is_empty()) {
            match self.ip.current_ip().await {
                Some(current) if current != saved => {
                    warn!(
                        saved = %saved,
                        current = %current,
                        "Public IP changed since login, discarding"
                    );
                    self.clear().await;
                    return LoadOutcome::Rejected(LoadRejection::IpChanged { saved, current });
                }
                Some(_) => {}
                None => debug!("Current IP unknown, skipping IP check"),
            }
        }

        LoadOutcome::Loaded(bundle)
    }

    /// Ask the platform whether the bundle is a live login.
    ///
    /// True only for a zero status with the logged-in flag set. Every failure
    /// reads as "not logged in".
    #[instrument(skip_all)]
    pub async fn validate(&self, bundle: &CredentialBundle) -> bool {
        let url = self.session.endpoints().api(Endpoints::NAV);
        let request = self.session.api_get(&url, Some(&bundle.cookies));

        match self.session.send_json::<ApiResponse<NavData>>(request).await {
            Ok(response) => {
                let valid = response.code == 0 && response.data.is_some_and(|d| d.is_login);
                debug!(code = response.code, valid, "Credential probe answered");
                valid
            }
            Err(e) => {
                debug!(error = %e, "Credential probe failed");
                false
            }
        }
    }

    /// Delete the saved login and drop the in-memory one. Idempotent.
    #[instrument(skip_all)]
    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;

        if let Err(e) = self.storage.remove().await {
            warn!(error = %e, "Failed to delete saved login state");
        }
        *self.state.write() = AuthState::default();
    }

    /// Start-up sequence: `load`, then `validate` only if the load succeeded.
    /// Any negative outcome clears the store.
    pub async fn restore(&self) -> RestoreOutcome {
        let bundle = match self.load().await {
            LoadOutcome::Loaded(bundle) => bundle,
            LoadOutcome::Rejected(reason) => {
                debug!(reason = %reason, "No usable saved login");
                self.clear().await;
                return RestoreOutcome::unauthenticated(reason.to_string());
            }
        };

        if !self.validate(&bundle).await {
            info!("Saved login was rejected by the platform");
            self.clear().await;
            return RestoreOutcome::unauthenticated("saved credentials are no longer valid");
        }

        {
            let mut state = self.state.write();
            state.bundle = Some(bundle);
            state.authenticated = true;
        }
        info!("Restored saved login");
        RestoreOutcome {
            authenticated: true,
            message: "logged in from saved state".to_string(),
        }
    }

    /// Log in with a pasted browser cookie string.
    pub async fn import_cookies(&self, cookies: &str) -> Result<CredentialBundle> {
        let bundle = CredentialBundle::from_cookie_string(cookies);
        if !bundle.has_session() {
            return Err(PlatformError::auth("missing session credential"));
        }
        if !self.validate(&bundle).await {
            return Err(PlatformError::auth("cookies were rejected by the platform"));
        }
        self.save(bundle).await
    }
}
