//! The boundary between the playback core and a platform's native media stack.
//!
//! Each host platform supplies one [`MediaBackend`]. The backend hands out
//! assets, compositions and an engine; the core drives them and listens to the
//! engine through a [`NotificationSink`]. Everything past these traits
//! (decoding, rendering, networking) is a black box.
//!
//! [`headless`] contains an in-process implementation that needs no platform
//! media stack at all.

pub mod headless;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::media::TrackKind;

/// HTTP headers forwarded with every asset request.
pub type RequestHeaders = BTreeMap<String, String>;

/// Identifies one playback session on one player.
///
/// Session ids only grow. Work and notifications tagged with an id other than
/// the current session's are stale and get discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn first() -> Self {
        Self(1)
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The raw id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A rectangle in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// The kind of view a native engine can render into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    UiKit,
    AppKit,
    Android,
    /// Not backed by any windowing system.
    Offscreen,
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UiKit => write!(f, "UIKit view"),
            Self::AppKit => write!(f, "AppKit view"),
            Self::Android => write!(f, "Android surface view"),
            Self::Offscreen => write!(f, "offscreen surface"),
        }
    }
}

/// How a video layer fits its content into its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoGravity {
    /// Stretch to fill, ignoring aspect ratio.
    Resize,
    /// Fit inside, preserving aspect ratio.
    ResizeAspect,
    /// Fill, preserving aspect ratio and cropping.
    ResizeAspectFill,
}

/// Whether the engine's current item can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineReadiness {
    #[default]
    Unknown,
    Ready,
    Failed,
}

/// A span of media time in seconds, as native engines report it.
///
/// Values come straight from the engine and may be NaN or infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub duration: f64,
}

impl TimeRange {
    pub fn new(start: f64, duration: f64) -> Self {
        Self { start, duration }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Finite, non-negative start and duration.
    pub fn is_valid(&self) -> bool {
        self.start.is_finite()
            && self.duration.is_finite()
            && self.start >= 0.0
            && self.duration >= 0.0
    }
}

/// Convert engine seconds into a `Duration`.
///
/// NaN, negative and infinite inputs all become zero.
pub fn seconds_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}

/// A failure reported by the native media stack, with every diagnostic field
/// the platform exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub domain: String,
    pub code: i64,
    pub description: String,
    pub failure_reason: Option<String>,
    pub recovery_options: Vec<String>,
    pub recovery_suggestion: Option<String>,
}

impl NativeError {
    pub fn new(domain: impl Into<String>, code: i64, description: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            code,
            description: description.into(),
            failure_reason: None,
            recovery_options: Vec::new(),
            recovery_suggestion: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    pub fn with_recovery_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recovery_options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.recovery_suggestion = Some(suggestion.into());
        self
    }
}

/// One line per diagnostic field; absent fields are left out.
impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Description: {}", self.description)?;
        if let Some(reason) = &self.failure_reason {
            write!(f, "\nReason: {reason}")?;
        }
        if !self.recovery_options.is_empty() {
            write!(f, "\nRecovery Options: {}", self.recovery_options.join(", "))?;
        }
        if let Some(suggestion) = &self.recovery_suggestion {
            write!(f, "\nRecovery Suggestion: {suggestion}")?;
        }
        Ok(())
    }
}

impl std::error::Error for NativeError {}

/// Asynchronous notifications a native engine delivers about its current item.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotification {
    /// The item's readiness changed.
    StatusChanged(EngineReadiness),
    /// Periodic playback progress.
    ProgressTick,
    /// The set of loaded time ranges changed.
    LoadedRangesChanged,
    /// The playback rate changed. Zero means not advancing.
    RateChanged(f32),
    /// Playback reached the end of the item.
    PlayedToEnd,
    /// Playback failed.
    Failed(NativeError),
}

type Deliver = Arc<dyn Fn(SessionId, EngineNotification) + Send + Sync>;

/// Where an engine sends its notifications.
///
/// A sink is bound to one session. Delivering never runs player logic on the
/// calling thread; the notification is queued for the player's dispatch queue.
#[derive(Clone)]
pub struct NotificationSink {
    session: SessionId,
    deliver: Deliver,
}

impl NotificationSink {
    pub fn new<F>(session: SessionId, deliver: F) -> Self
    where
        F: Fn(SessionId, EngineNotification) + Send + Sync + 'static,
    {
        Self {
            session,
            deliver: Arc::new(deliver),
        }
    }

    /// The session this sink reports for.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver a notification tagged with this sink's session.
    pub fn notify(&self, notification: EngineNotification) {
        (self.deliver)(self.session, notification);
    }
}

impl fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationSink")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// A track inside a resolved asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetTrack {
    pub id: u32,
    pub kind: TrackKind,
    /// URL of the asset the track belongs to.
    pub source_url: String,
}

/// Handle to a track created inside a [`NativeComposition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompositionTrackId(pub u32);

/// A media asset resolved from a URL.
pub trait MediaAsset: Send + Sync {
    fn url(&self) -> &str;

    /// Duration in seconds. May be NaN when unknown.
    fn duration_secs(&self) -> f64;

    /// Tracks of the given kind, in asset order.
    fn tracks(&self, kind: TrackKind) -> Vec<AssetTrack>;
}

/// A mutable composition that tracks are inserted into.
pub trait NativeComposition: Send {
    /// Create an empty composition track.
    fn add_track(&mut self, kind: TrackKind) -> CompositionTrackId;

    /// Copy `range` of `source` into `track`, starting at `at_secs`.
    fn insert_time_range(
        &mut self,
        track: CompositionTrackId,
        range: TimeRange,
        source: &AssetTrack,
        at_secs: f64,
    ) -> Result<(), NativeError>;

    /// Freeze the composition into something the engine can play.
    fn finish(self: Box<Self>) -> Box<dyn NativeTimeline>;
}

/// A finished composition, playable by the engine.
pub trait NativeTimeline: Send + Sync {
    fn duration_secs(&self) -> f64;

    /// Kinds of the tracks that received media.
    fn track_kinds(&self) -> Vec<TrackKind>;
}

/// A layer the engine renders video frames into.
pub trait VideoLayer: Send + Sync {
    fn frame(&self) -> Rect;
    fn gravity(&self) -> VideoGravity;
    fn set_gravity(&self, gravity: VideoGravity);
}

/// The native playback engine.
///
/// Implementations must be callable from any thread and must not call back
/// into the player synchronously; all feedback goes through the
/// [`NotificationSink`] registered with [`observe`](Self::observe).
pub trait NativeEngine: Send + Sync {
    /// The kind of view this engine renders into.
    fn surface_kind(&self) -> SurfaceKind;

    /// Swap the current item. `None` releases it.
    fn replace_item(&self, item: Option<&dyn NativeTimeline>);

    /// Start delivering notifications for the current item to `sink`,
    /// including progress ticks every `progress_interval`.
    fn observe(&self, sink: NotificationSink, progress_interval: Duration);

    /// Stop delivering notifications.
    fn unobserve(&self);

    fn play(&self);
    fn pause(&self);
    fn seek(&self, position: Duration) -> Result<(), NativeError>;

    fn readiness(&self) -> EngineReadiness;
    fn rate(&self) -> f32;
    fn set_rate(&self, rate: f32);

    /// Current position of the item in seconds. May be NaN.
    fn position_secs(&self) -> f64;
    /// Duration of the item in seconds. May be NaN.
    fn duration_secs(&self) -> f64;
    fn loaded_ranges(&self) -> Vec<TimeRange>;
    fn last_error(&self) -> Option<NativeError>;

    fn volume(&self) -> f32;
    fn set_volume(&self, volume: f32);
    fn is_muted(&self) -> bool;
    fn set_muted(&self, muted: bool);

    /// Create a video layer bound to this engine.
    fn create_layer(&self, frame: Rect) -> Result<Box<dyn VideoLayer>, NativeError>;
}

/// Factory for everything platform-specific.
pub trait MediaBackend: Send + Sync {
    fn create_engine(&self) -> Result<Arc<dyn NativeEngine>, NativeError>;

    /// Resolve `url` into an asset. `None` when nothing can be loaded from it.
    fn resolve_asset(&self, url: &str, headers: &RequestHeaders) -> Option<Arc<dyn MediaAsset>>;

    fn new_composition(&self) -> Box<dyn NativeComposition>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_seconds_to_duration_guards() {
        assert_eq!(seconds_to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(seconds_to_duration(-3.0), Duration::ZERO);
        assert_eq!(seconds_to_duration(f64::INFINITY), Duration::ZERO);
        assert_eq!(seconds_to_duration(1.5), Duration::from_millis(1500));
    }

    #[test]
    fn test_time_range() {
        let range = TimeRange::new(2.0, 3.0);
        assert_eq!(range.end(), 5.0);
        assert!(range.is_valid());
        assert!(!TimeRange::new(f64::NAN, 1.0).is_valid());
        assert!(!TimeRange::new(0.0, -1.0).is_valid());
    }

    #[test]
    fn test_native_error_formats_all_fields() {
        let err = NativeError::new("NSURLErrorDomain", -1009, "The Internet connection appears to be offline.")
            .with_reason("No network")
            .with_recovery_options(["Retry", "Cancel"])
            .with_recovery_suggestion("Check your connection");
        assert_eq!(
            err.to_string(),
            "Description: The Internet connection appears to be offline.\n\
             Reason: No network\n\
             Recovery Options: Retry, Cancel\n\
             Recovery Suggestion: Check your connection"
        );
    }

    #[test]
    fn test_native_error_omits_missing_fields() {
        let err = NativeError::new("domain", 1, "Broken");
        assert_eq!(err.to_string(), "Description: Broken");
    }

    #[test]
    fn test_sink_tags_session() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let session = SessionId::first().next();
        let sink = NotificationSink::new(session, move |id, n| {
            received_clone.lock().push((id, n));
        });

        sink.notify(EngineNotification::PlayedToEnd);
        assert_eq!(sink.session().get(), 2);
        assert_eq!(
            *received.lock(),
            vec![(session, EngineNotification::PlayedToEnd)]
        );
    }
}
