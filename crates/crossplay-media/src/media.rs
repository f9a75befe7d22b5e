//! Media descriptions handed to the player.

use std::fmt;
use std::time::Duration;

/// What a media file primarily contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MediaKind {
    #[default]
    Video,
    Audio,
}

/// The kind of an individual track inside an asset or timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackKind {
    Video,
    Audio,
    /// Timed text, i.e. closed captions.
    Text,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Descriptive information about a media file, all of it optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    /// Duration known ahead of loading. The engine's own value wins once known.
    pub duration_hint: Option<Duration>,
}

/// A media file to play.
///
/// Immutable once built. The player keeps it behind an `Arc` for the lifetime
/// of the playback session, so it is shared rather than copied.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    url: String,
    kind: MediaKind,
    metadata: Option<MediaMetadata>,
}

impl MediaFile {
    /// A file of the given kind.
    pub fn new(url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            url: url.into(),
            kind,
            metadata: None,
        }
    }

    /// A video file.
    pub fn video(url: impl Into<String>) -> Self {
        Self::new(url, MediaKind::Video)
    }

    /// An audio-only file.
    pub fn audio(url: impl Into<String>) -> Self {
        Self::new(url, MediaKind::Audio)
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn metadata(&self) -> Option<&MediaMetadata> {
        self.metadata.as_ref()
    }
}
