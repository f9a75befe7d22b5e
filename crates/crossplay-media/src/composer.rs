//! Composition of independent tracks into one playable timeline.
//!
//! The primary URL supplies the video and audio tracks; an optional caption
//! URL supplies a text track. Each track goes into its own composition track
//! at time zero for the full length of the primary asset, so everything plays
//! in parallel from the origin.

use std::fmt;
use std::sync::Arc;

use crossplay_core::PerfSpan;

use crate::backend::{AssetTrack, MediaBackend, NativeComposition, NativeTimeline, RequestHeaders, TimeRange};
use crate::error::{MediaError, Result};
use crate::media::TrackKind;
use crate::targets::COMPOSER as TARGET;

/// What to compose.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionRequest {
    pub primary_url: String,
    pub caption_url: Option<String>,
    pub headers: RequestHeaders,
}

impl CompositionRequest {
    pub fn new(primary_url: impl Into<String>) -> Self {
        Self {
            primary_url: primary_url.into(),
            ..Default::default()
        }
    }

    /// Add a caption URL. Blank URLs mean no captions.
    pub fn with_caption(mut self, caption_url: Option<String>) -> Self {
        self.caption_url = caption_url.filter(|url| !url.trim().is_empty());
        self
    }

    pub fn with_headers(mut self, headers: RequestHeaders) -> Self {
        self.headers = headers;
        self
    }
}

/// A track that made it into a composed timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedTrack {
    pub kind: TrackKind,
    pub source_url: String,
}

/// A finished timeline, ready for the engine.
///
/// Owned by exactly one playback session and released with it.
pub struct ComposedTimeline {
    native: Box<dyn NativeTimeline>,
    tracks: Vec<ComposedTrack>,
    duration_secs: f64,
}

impl ComposedTimeline {
    pub fn native(&self) -> &dyn NativeTimeline {
        self.native.as_ref()
    }

    pub fn tracks(&self) -> &[ComposedTrack] {
        &self.tracks
    }

    pub fn track_kinds(&self) -> Vec<TrackKind> {
        self.tracks.iter().map(|t| t.kind).collect()
    }

    pub fn has_track(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }

    /// Duration of the primary asset. May be NaN.
    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}

impl fmt::Debug for ComposedTimeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedTimeline")
            .field("tracks", &self.tracks)
            .field("duration_secs", &self.duration_secs)
            .finish_non_exhaustive()
    }
}

/// Builds [`ComposedTimeline`]s through a [`MediaBackend`].
#[derive(Clone)]
pub struct TrackComposer {
    backend: Arc<dyn MediaBackend>,
}

impl TrackComposer {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    /// Resolve and compose the tracks named by `request`.
    ///
    /// Fails with [`MediaError::Resolution`] when the primary URL does not
    /// resolve, and with [`MediaError::Composition`] when neither a video nor
    /// an audio track could be inserted. A caption that cannot be resolved or
    /// inserted is skipped.
    #[tracing::instrument(skip_all, target = "crossplay_media::composer", fields(url = %request.primary_url))]
    pub fn compose(&self, request: &CompositionRequest) -> Result<ComposedTimeline> {
        let _span = PerfSpan::new("compose_timeline");

        let asset = self
            .backend
            .resolve_asset(&request.primary_url, &request.headers)
            .ok_or_else(|| MediaError::Resolution {
                url: request.primary_url.clone(),
            })?;

        let video = asset.tracks(TrackKind::Video).into_iter().next();
        let audio = asset.tracks(TrackKind::Audio).into_iter().next();
        if video.is_none() && audio.is_none() {
            return Err(MediaError::Composition(format!(
                "{} has no video or audio track",
                request.primary_url
            )));
        }

        let caption = request
            .caption_url
            .as_deref()
            .and_then(|url| self.resolve_caption(url, &request.headers));

        let duration_secs = asset.duration_secs();
        let full_range = TimeRange::new(
            0.0,
            if duration_secs.is_finite() && duration_secs > 0.0 {
                duration_secs
            } else {
                0.0
            },
        );

        let mut composition = self.backend.new_composition();
        let mut tracks = Vec::with_capacity(3);
        for source in [video, audio].into_iter().flatten() {
            if insert(composition.as_mut(), &source, full_range) {
                tracks.push(ComposedTrack {
                    kind: source.kind,
                    source_url: source.source_url,
                });
            }
        }
        if tracks.is_empty() {
            return Err(MediaError::Composition(format!(
                "no track of {} could be inserted",
                request.primary_url
            )));
        }

        if let Some(source) = caption {
            if insert(composition.as_mut(), &source, full_range) {
                tracks.push(ComposedTrack {
                    kind: TrackKind::Text,
                    source_url: source.source_url,
                });
            }
        }

        tracing::debug!(target: TARGET, tracks = ?tracks.iter().map(|t| t.kind).collect::<Vec<_>>(), "timeline composed");

        Ok(ComposedTimeline {
            native: composition.finish(),
            tracks,
            duration_secs,
        })
    }

    fn resolve_caption(&self, url: &str, headers: &RequestHeaders) -> Option<AssetTrack> {
        let Some(asset) = self.backend.resolve_asset(url, headers) else {
            tracing::debug!(target: TARGET, url, "caption asset unavailable, continuing without captions");
            return None;
        };
        let track = asset.tracks(TrackKind::Text).into_iter().next();
        if track.is_none() {
            tracing::debug!(target: TARGET, url, "caption asset has no text track");
        }
        track
    }
}

fn insert(composition: &mut dyn NativeComposition, source: &AssetTrack, range: TimeRange) -> bool {
    let track = composition.add_track(source.kind);
    match composition.insert_time_range(track, range, source, 0.0) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(target: TARGET, kind = %source.kind, error = %err, "track insertion failed");
            false
        }
    }
}
