//! Media service descriptors for Kiln plugins.
//!
//! This plugin publishes a [`MediaCatalog`] under the registry key
//! [`MEDIA`] so later plugins can discover which media kinds the host offers
//! and how to configure them. Capture, playback and encoding are performed
//! by the host platform, not here.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use kiln_core::{Context, Disposer, Key, Plugin};

pub const MEDIA: Key<MediaCatalog> = Key::new("media");

/// A kind of media element the host can construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    VideoPlayer,
    Camera,
    Recorder,
}

/// Settings for a video player element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerOptions {
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub autoplay: bool,
    #[serde(default)]
    pub controls: bool,
}

/// Which tracks a capture stream requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureOptions {
    pub video: bool,
    pub audio: bool,
}

impl CaptureOptions {
    /// Video only, as used for still snapshots.
    pub const CAMERA: Self = Self {
        video: true,
        audio: false,
    };

    /// Video and audio, as used for recordings.
    pub const RECORDER: Self = Self {
        video: true,
        audio: true,
    };
}

/// Still image encodings for camera snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum SnapshotFormat {
    Png,
    Jpeg { quality: Option<f32> },
}

impl SnapshotFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg { .. } => "image/jpeg",
        }
    }
}

/// Frame size used when the camera has not reported its own dimensions yet.
pub const FALLBACK_FRAME_SIZE: (u32, u32) = (640, 480);

/// File container for saved recordings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingContainer {
    Mp4,
    Mov,
    Webm,
}

impl RecordingContainer {
    /// MIME type used for the saved blob. Browsers record WebM natively;
    /// `.mov` downloads are labelled as MP4 video.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp4 | Self::Mov => "video/mp4",
            Self::Webm => "video/webm",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => ".mp4",
            Self::Mov => ".mov",
            Self::Webm => ".webm",
        }
    }

    /// Download name for a recording finished at `timestamp_ms`.
    pub fn file_name(&self, timestamp_ms: u64) -> String {
        format!("video-recording-{timestamp_ms}{}", self.extension())
    }
}

/// Everything the media plugin makes available to other plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaCatalog {
    kinds: Vec<MediaKind>,
    pub recording_container: RecordingContainer,
    pub snapshot_format: SnapshotFormat,
}

impl Default for MediaCatalog {
    fn default() -> Self {
        Self {
            kinds: vec![MediaKind::VideoPlayer, MediaKind::Camera, MediaKind::Recorder],
            recording_container: RecordingContainer::Webm,
            snapshot_format: SnapshotFormat::Png,
        }
    }
}

impl MediaCatalog {
    pub fn kinds(&self) -> &[MediaKind] {
        &self.kinds
    }

    pub fn supports(&self, kind: MediaKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Capture request appropriate for `kind`, or `None` for playback.
    pub fn capture_for(&self, kind: MediaKind) -> Option<CaptureOptions> {
        match kind {
            MediaKind::VideoPlayer => None,
            MediaKind::Camera => Some(CaptureOptions::CAMERA),
            MediaKind::Recorder => Some(CaptureOptions::RECORDER),
        }
    }
}

/// Publishes a [`MediaCatalog`] under [`MEDIA`].
#[derive(Debug, Default)]
pub struct MediaPlugin {
    catalog: MediaCatalog,
}

impl MediaPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: MediaCatalog) -> Self {
        Self { catalog }
    }
}

impl<S> Plugin<S> for MediaPlugin {
    fn name(&self) -> &str {
        "media"
    }

    fn init(&mut self, ctx: &Context<S>) -> Result<Option<Disposer>> {
        ctx.registry().set(&MEDIA, self.catalog.clone());
        // Nothing global to undo; the catalog lives as long as the registry.
        Ok(Some(Disposer::noop()))
    }
}
