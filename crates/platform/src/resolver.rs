//! Playable URL resolution.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{Delivery, play_url};
use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::models::{DashStream, PlayUrlData};
use crate::session::HttpSession;

/// A direct, time-limited media URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamUrl {
    /// Tier id of the selected entry, which may differ from the requested one.
    pub quality: u32,
    pub url: String,
    pub backup_urls: Vec<String>,
    pub codecs: String,
    /// Advertised bandwidth / 8 for DASH, advertised size for legacy delivery.
    /// Only good for scaling a progress bar.
    pub estimated_size: u64,
}

impl StreamUrl {
    /// Primary URL followed by the backups.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.url.as_str()).chain(self.backup_urls.iter().map(String::as_str))
    }

    fn from_dash(stream: &DashStream) -> Self {
        Self {
            quality: stream.id,
            url: stream.base_url.clone(),
            backup_urls: stream.backup_url.clone().unwrap_or_default(),
            codecs: stream.codecs.clone(),
            estimated_size: stream.bandwidth / 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStreams {
    pub delivery: Delivery,
    /// For legacy delivery this is the merged stream.
    pub video: Option<StreamUrl>,
    pub audio: Option<StreamUrl>,
}

impl ResolvedStreams {
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }
}

/// The entry matching `wanted`, else the first one in platform order.
fn select(streams: &[DashStream], wanted: u32) -> Option<&DashStream> {
    streams
        .iter()
        .find(|s| s.id == wanted)
        .or_else(|| streams.first())
}

pub(crate) fn select_streams(
    data: &PlayUrlData,
    video_quality: u32,
    audio_quality: u32,
) -> ResolvedStreams {
    if let Some(dash) = &data.dash {
        let video = select(dash.video.as_deref().unwrap_or_default(), video_quality)
            .map(StreamUrl::from_dash);
        let audio = select(dash.audio.as_deref().unwrap_or_default(), audio_quality)
            .map(StreamUrl::from_dash);
        return ResolvedStreams {
            delivery: Delivery::Dash,
            video,
            audio,
        };
    }

    if let Some(durl) = data.durl.as_deref().and_then(<[_]>::first) {
        return ResolvedStreams {
            delivery: Delivery::Legacy,
            video: Some(StreamUrl {
                quality: data.quality,
                url: durl.url.clone(),
                backup_urls: durl.backup_url.clone().unwrap_or_default(),
                codecs: String::new(),
                estimated_size: durl.size,
            }),
            audio: None,
        };
    }

    ResolvedStreams {
        delivery: Delivery::Unavailable,
        video: None,
        audio: None,
    }
}

#[derive(Clone)]
pub struct StreamResolver {
    session: HttpSession,
    store: Arc<CredentialStore>,
}

impl StreamResolver {
    pub fn new(session: HttpSession, store: Arc<CredentialStore>) -> Self {
        Self { session, store }
    }

    /// Resolve URLs for the requested tiers. A tier the content does not offer
    /// falls back to the first entry the platform lists; an unmatched tier is
    /// never an error.
    pub async fn resolve_urls(
        &self,
        bvid: &str,
        cid: u64,
        video_quality: u32,
        audio_quality: u32,
    ) -> Result<ResolvedStreams> {
        let data = play_url(&self.session, &self.store, bvid, cid, video_quality).await?;
        let streams = select_streams(&data, video_quality, audio_quality);

        if let Some(video) = streams.video.as_ref().filter(|v| v.quality != video_quality) {
            info!(
                requested = video_quality,
                selected = video.quality,
                "Requested video tier unavailable, using fallback"
            );
        }
        debug!(
            bvid,
            cid,
            delivery = ?streams.delivery,
            video = ?streams.video.as_ref().map(|s| s.quality),
            audio = ?streams.audio.as_ref().map(|s| s.quality),
            "Resolved stream URLs"
        );
        Ok(streams)
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::routing::get;
    use serde_json::json;

    use super::*;
    use crate::credentials::MemoryStorage;
    use crate::error::PlatformError;
    use crate::test_utils::{spawn_server, test_session};

    fn dash_payload() -> PlayUrlData {
        serde_json::from_value(json!({
            "quality": 64,
            "dash": {
                "video": [
                    {
                        "id": 64, "baseUrl": "https://v/64", "backupUrl": ["https://bak/64"],
                        "bandwidth": 800000, "codecs": "avc1"
                    },
                    {"id": 32, "baseUrl": "https://v/32", "bandwidth": 400000}
                ],
                "audio": [
                    {"id": 30232, "baseUrl": "https://a/30232", "bandwidth": 320000},
                    {"id": 30216, "baseUrl": "https://a/30216", "bandwidth": 128000}
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_exact_tier_is_selected() {
        let streams = select_streams(&dash_payload(), 32, 30216);
        assert_eq!(streams.delivery, Delivery::Dash);
        assert_eq!(streams.video.unwrap().url, "https://v/32");
        let audio = streams.audio.unwrap();
        assert_eq!(audio.url, "https://a/30216");
        assert_eq!(audio.estimated_size, 16000);
    }

    #[test]
    fn test_missing_tier_falls_back_to_first_entry() {
        // 8K requested, 720P offered: still the first entry.
        let streams = select_streams(&dash_payload(), 127, 30280);
        let video = streams.video.unwrap();
        assert_eq!(video.quality, 64);
        assert_eq!(video.estimated_size, 100000);
        assert_eq!(
            video.candidates().collect::<Vec<_>>(),
            vec!["https://v/64", "https://bak/64"]
        );
        assert_eq!(streams.audio.unwrap().quality, 30232);
    }

    #[test]
    fn test_legacy_and_empty_shapes() {
        let legacy: PlayUrlData = serde_json::from_value(json!({
            "quality": 80,
            "durl": [{"url": "https://d/1.flv", "size": 2048, "backup_url": ["https://bak/1.flv"]}]
        }))
        .unwrap();
        let streams = select_streams(&legacy, 116, 30216);
        assert_eq!(streams.delivery, Delivery::Legacy);
        assert!(streams.audio.is_none());
        let video = streams.video.unwrap();
        assert_eq!((video.quality, video.estimated_size), (80, 2048));
        assert_eq!(video.backup_urls, vec!["https://bak/1.flv".to_string()]);

        let streams = select_streams(&serde_json::from_value(json!({})).unwrap(), 80, 30216);
        assert_eq!(streams.delivery, Delivery::Unavailable);
        assert!(streams.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_urls_against_server() {
        let router = Router::new()
            .route(
                "/x/player/playurl",
                get(|| async {
                    axum::Json(json!({
                        "code": 0,
                        "data": {"dash": {"video": [{"id": 16, "baseUrl": "https://v/16"}]}}
                    }))
                }),
            )
            .route(
                "/bad/x/player/playurl",
                get(|| async { axum::Json(json!({"code": 0, "data": {"dash": "nope"}})) }),
            );
        let base = spawn_server(router).await;

        let session = test_session(&base);
        let store = Arc::new(CredentialStore::new(Arc::new(MemoryStorage::new()), session.clone()));
        let resolver = StreamResolver::new(session, store.clone());
        let streams = resolver.resolve_urls("BV17x411w7KC", 1, 80, 30216).await.unwrap();
        assert_eq!(streams.video.unwrap().quality, 16);
        assert!(streams.audio.is_none());

        let bad = StreamResolver::new(test_session(&format!("{base}/bad")), store);
        assert!(matches!(
            bad.resolve_urls("BV17x411w7KC", 1, 80, 30216).await,
            Err(PlatformError::Protocol(_))
        ));
    }
}
