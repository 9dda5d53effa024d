//! Video metadata and quality tiers.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::Endpoints;
use crate::credentials::CredentialStore;
use crate::error::{PlatformError, Result};
use crate::models::{ApiResponse, PlayUrlData, VideoView};
use crate::session::HttpSession;

/// Known video tiers, best first.
pub const VIDEO_QUALITIES: &[(u32, &str)] = &[
    (127, "8K Ultra HD"),
    (126, "Dolby Vision"),
    (125, "HDR"),
    (120, "4K"),
    (116, "1080P 60fps"),
    (112, "1080P+ high bitrate"),
    (80, "1080P"),
    (74, "720P 60fps"),
    (64, "720P"),
    (32, "480P"),
    (16, "360P"),
];

/// Known audio tiers, best first.
pub const AUDIO_QUALITIES: &[(u32, &str)] = &[
    (30280, "Hi-Res lossless"),
    (30232, "320K"),
    (30216, "128K"),
    (30210, "64K"),
];

/// Tier requested when enumerating, so the response lists everything the
/// account is entitled to.
const MAX_QUALITY: u32 = 127;
/// Every DASH capability flag the web player sets.
pub(crate) const FNVAL_ALL: u32 = 4048;

pub fn video_label(id: u32) -> Option<&'static str> {
    lookup(VIDEO_QUALITIES, id)
}

pub fn audio_label(id: u32) -> Option<&'static str> {
    lookup(AUDIO_QUALITIES, id)
}

fn lookup(table: &[(u32, &'static str)], id: u32) -> Option<&'static str> {
    table.iter().find(|(known, _)| *known == id).map(|(_, label)| *label)
}

static BVID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"BV[0-9A-Za-z]{10}").expect("valid bvid regex"));
static AID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bav(\d+)").expect("valid aid regex"));

/// A video reference extracted from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaReference {
    Bvid(String),
    Aid(u64),
}

impl MediaReference {
    /// Extract a reference from a URL or bare id. The `BV` form wins when both
    /// are present.
    pub fn parse(input: &str) -> Result<Self> {
        if let Some(m) = BVID_REGEX.find(input) {
            return Ok(Self::Bvid(m.as_str().to_string()));
        }
        if let Some(aid) = AID_REGEX
            .captures(input)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
        {
            return Ok(Self::Aid(aid));
        }
        Err(PlatformError::InvalidReference(input.to_string()))
    }

    fn query(&self) -> (&'static str, String) {
        match self {
            Self::Bvid(bvid) => ("bvid", bvid.clone()),
            Self::Aid(aid) => ("aid", aid.to_string()),
        }
    }
}

impl fmt::Display for MediaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bvid(bvid) => f.write_str(bvid),
            Self::Aid(aid) => write!(f, "av{aid}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaPage {
    pub cid: u64,
    /// 1-based part number.
    pub index: u32,
    pub title: String,
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaDescriptor {
    pub bvid: String,
    pub aid: u64,
    /// Stream id of the first part.
    pub cid: u64,
    pub title: String,
    pub owner: String,
    pub owner_mid: u64,
    /// Seconds.
    pub duration: u64,
    pub view_count: u64,
    pub cover_url: String,
    pub pages: Vec<MediaPage>,
}

impl From<VideoView> for MediaDescriptor {
    fn from(view: VideoView) -> Self {
        Self {
            bvid: view.bvid,
            aid: view.aid,
            cid: view.cid,
            title: view.title,
            owner: view.owner.name,
            owner_mid: view.owner.mid,
            duration: view.duration,
            view_count: view.stat.view,
            cover_url: view.pic,
            pages: view
                .pages
                .into_iter()
                .map(|p| MediaPage {
                    cid: p.cid,
                    index: p.page,
                    title: p.part,
                    duration: p.duration,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityTier {
    pub id: u32,
    pub label: &'static str,
    /// Bits per second, 0 when unknown.
    pub bitrate: u64,
    pub codec: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioTier {
    pub id: u32,
    pub label: &'static str,
    pub bitrate: u64,
    pub codec: String,
}

/// How the platform delivers a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Delivery {
    /// Separate video and audio streams.
    Dash,
    /// One merged stream.
    Legacy,
    /// Neither representation was returned.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityList {
    pub delivery: Delivery,
    pub video: Vec<QualityTier>,
    /// Always empty for legacy delivery.
    pub audio: Vec<AudioTier>,
}

/// Split a `playurl` payload into labelled tiers. Ids missing from the label
/// tables are dropped.
pub(crate) fn partition_qualities(data: &PlayUrlData) -> QualityList {
    if let Some(dash) = &data.dash {
        let video = dash
            .video
            .iter()
            .flatten()
            .filter_map(|s| {
                Some(QualityTier {
                    id: s.id,
                    label: video_label(s.id)?,
                    bitrate: s.bandwidth,
                    codec: s.codecs.clone(),
                    width: s.width,
                    height: s.height,
                })
            })
            .collect();
        let audio = dash
            .audio
            .iter()
            .flatten()
            .filter_map(|s| {
                Some(AudioTier {
                    id: s.id,
                    label: audio_label(s.id)?,
                    bitrate: s.bandwidth,
                    codec: s.codecs.clone(),
                })
            })
            .collect();
        return QualityList {
            delivery: Delivery::Dash,
            video,
            audio,
        };
    }

    let video = data
        .accept_quality
        .iter()
        .filter_map(|&id| {
            Some(QualityTier {
                id,
                label: video_label(id)?,
                bitrate: 0,
                codec: String::new(),
                width: 0,
                height: 0,
            })
        })
        .collect();
    let delivery = if data.durl.is_some() || !data.accept_quality.is_empty() {
        Delivery::Legacy
    } else {
        Delivery::Unavailable
    };
    QualityList {
        delivery,
        video,
        audio: Vec::new(),
    }
}

/// Metadata and quality lookups. Requests carry the stored login when there is
/// one.
#[derive(Clone)]
pub struct MediaCatalog {
    session: HttpSession,
    store: Arc<CredentialStore>,
}

impl MediaCatalog {
    pub fn new(session: HttpSession, store: Arc<CredentialStore>) -> Self {
        Self { session, store }
    }

    /// Resolve a URL or id to the video's metadata.
    pub async fn resolve(&self, reference: &str) -> Result<MediaDescriptor> {
        let reference = MediaReference::parse(reference)?;
        let url = self.session.endpoints().api(Endpoints::VIEW);
        let cookies = self.store.cookies();
        let (key, value) = reference.query();

        let request = self
            .session
            .api_get(&url, cookies.as_ref())
            .query(&[(key, value.as_str())]);
        let response: ApiResponse<VideoView> = self.session.send_json(request).await?;
        let descriptor = MediaDescriptor::from(response.into_data(&format!("video {reference}"))?);

        debug!(
            bvid = %descriptor.bvid,
            cid = descriptor.cid,
            pages = descriptor.pages.len(),
            "Resolved video"
        );
        Ok(descriptor)
    }

    /// Enumerate the video and audio tiers available for one part.
    pub async fn list_qualities(&self, bvid: &str, cid: u64) -> Result<QualityList> {
        let data = play_url(&self.session, &self.store, bvid, cid, MAX_QUALITY).await?;
        let list = partition_qualities(&data);
        debug!(
            bvid,
            cid,
            delivery = ?list.delivery,
            video = list.video.len(),
            audio = list.audio.len(),
            "Listed qualities"
        );
        Ok(list)
    }
}

pub(crate) async fn play_url(
    session: &HttpSession,
    store: &CredentialStore,
    bvid: &str,
    cid: u64,
    quality: u32,
) -> Result<PlayUrlData> {
    let url = session.endpoints().api(Endpoints::PLAY_URL);
    let cookies = store.cookies();
    let request = session.api_get(&url, cookies.as_ref()).query(&[
        ("bvid", bvid.to_string()),
        ("cid", cid.to_string()),
        ("qn", quality.to_string()),
        ("fnval", FNVAL_ALL.to_string()),
        ("fourk", "1".to_string()),
    ]);
    let response: ApiResponse<PlayUrlData> = session.send_json(request).await?;
    response.into_data(&format!("play URL for {bvid}/{cid}"))
}
