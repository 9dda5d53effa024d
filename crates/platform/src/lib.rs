//! Bilibili web API client.
//!
//! Covers the parts of the platform needed to fetch media:
//!
//! - [`HttpSession`] - pooled client with the fixed identity headers
//! - [`credentials::CredentialStore`] - saved login with expiry and IP-change checks
//! - [`auth::QrLoginSession`] - caller-driven QR login state machine
//! - [`catalog::MediaCatalog`] - video metadata and quality tiers
//! - [`resolver::StreamResolver`] - direct stream URLs for chosen tiers

pub mod auth;
pub mod catalog;
pub mod config;
pub mod cookie_utils;
pub mod credentials;
pub mod error;
mod models;
pub mod resolver;
pub mod session;

#[cfg(test)]
mod test_utils;

pub use auth::{LoginState, POLL_INTERVAL, QrChallenge, QrLoginSession};
pub use catalog::{
    AudioTier, Delivery, MediaCatalog, MediaDescriptor, MediaPage, MediaReference, QualityList,
    QualityTier,
};
pub use config::{Endpoints, SessionConfig};
pub use credentials::{
    CredentialBundle, CredentialStore, LoadOutcome, LoadRejection, RestoreOutcome,
};
pub use error::{PlatformError, Result};
pub use resolver::{ResolvedStreams, StreamResolver, StreamUrl};
pub use session::{HttpSession, install_rustls_provider};
