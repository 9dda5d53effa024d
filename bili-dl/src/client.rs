use std::sync::Arc;

use bili_platform::credentials::{CredentialStorage, FileStorage};
use bili_platform::{
    CredentialStore, HttpSession, MediaCatalog, MediaDescriptor, QrLoginSession, QualityList,
    ResolvedStreams, StreamResolver,
};
use tracing::info;

use crate::config::AppConfig;
use crate::download::Downloader;
use crate::error::{Outcome, Result};
use crate::job::{DownloadJob, JobOutput, JobRunner};
use crate::progress::ProgressReporter;
use crate::transcode::Transcoder;

/// Entry point for embedders: one HTTP session and one credential store
/// shared by every operation.
pub struct BiliClient {
    config: AppConfig,
    session: HttpSession,
    store: Arc<CredentialStore>,
    catalog: MediaCatalog,
    resolver: StreamResolver,
    runner: JobRunner,
}

impl BiliClient {
    /// Client whose login is saved to [`AppConfig::credential_path`].
    pub fn new(config: AppConfig) -> Result<Self> {
        let storage = Arc::new(FileStorage::new(config.credential_path()));
        Self::with_storage(config, storage)
    }

    pub fn with_storage(config: AppConfig, storage: Arc<dyn CredentialStorage>) -> Result<Self> {
        let session = HttpSession::new(config.session.clone(), config.endpoints.clone())?;
        let store = Arc::new(CredentialStore::new(storage, session.clone()));
        let catalog = MediaCatalog::new(session.clone(), store.clone());
        let resolver = StreamResolver::new(session.clone(), store.clone());
        let runner = JobRunner::new(
            resolver.clone(),
            Downloader::new(session.clone()),
            Transcoder::with_ffmpeg_path(config.ffmpeg_path.clone()),
            store.clone(),
        );

        Ok(Self {
            config,
            session,
            store,
            catalog,
            resolver,
            runner,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn is_logged_in(&self) -> bool {
        self.store.is_authenticated()
    }

    /// Load and revalidate the saved login. Never fails: a missing or rejected
    /// login leaves the client anonymous.
    pub async fn restore_login(&self) -> Outcome {
        let restored = self.store.restore().await;
        Outcome {
            success: restored.authenticated,
            message: restored.message,
        }
    }

    /// Start a QR login. The caller drives the polling.
    pub fn login_session(&self) -> QrLoginSession {
        QrLoginSession::new(self.session.clone(), self.store.clone())
    }

    pub async fn import_cookies(&self, cookies: &str) -> Outcome {
        match self.store.import_cookies(cookies).await {
            Ok(_) => Outcome::ok("logged in with imported cookies"),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }

    pub async fn logout(&self) -> Outcome {
        self.store.clear().await;
        info!("Logged out");
        Outcome::ok("logged out")
    }

    pub async fn resolve(&self, reference: &str) -> Result<MediaDescriptor> {
        Ok(self.catalog.resolve(reference).await?)
    }

    pub async fn list_qualities(&self, bvid: &str, cid: u64) -> Result<QualityList> {
        Ok(self.catalog.list_qualities(bvid, cid).await?)
    }

    pub async fn resolve_urls(
        &self,
        bvid: &str,
        cid: u64,
        video_quality: u32,
        audio_quality: u32,
    ) -> Result<ResolvedStreams> {
        Ok(self
            .resolver
            .resolve_urls(bvid, cid, video_quality, audio_quality)
            .await?)
    }

    pub async fn download_job(
        &self,
        job: &DownloadJob,
        reporter: &ProgressReporter,
    ) -> Result<JobOutput> {
        self.runner.run(job, reporter).await
    }
}
