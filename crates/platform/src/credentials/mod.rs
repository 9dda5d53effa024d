//! Credential persistence and revalidation.
//!
//! - [`CredentialBundle`]: cookies + origin IP + issue time
//! - [`CredentialStorage`]: durable backing for the serialized bundle
//! - [`CredentialStore`]: the single owner of the login state; loads, checks
//!   expiry and IP changes, validates against the platform, saves and clears

mod bundle;
mod ip;
mod storage;
mod store;

pub use bundle::{CredentialBundle, MAX_CREDENTIAL_AGE};
pub use ip::IpDiscovery;
pub use storage::{CredentialStorage, FileStorage, MemoryStorage};
pub use store::{CredentialStore, LoadOutcome, LoadRejection, RestoreOutcome};
