//! An in-process media backend with no platform dependencies.
//!
//! `HeadlessBackend` serves assets from an in-memory catalog and hands out a
//! [`HeadlessEngine`] that never decodes anything. The engine only moves when
//! told to: tests and demos drive readiness, buffering, progress, stalls,
//! end-of-stream and failures by hand, and read back counters (compositions
//! built, play commands, seeks, gravity updates) to check what the player did.
//!
//! ```
//! use crossplay_media::backend::headless::{HeadlessAsset, HeadlessBackend};
//!
//! let backend = HeadlessBackend::new()
//!     .with_asset(HeadlessAsset::movie("a.mp4", 60.0))
//!     .with_asset(HeadlessAsset::caption("en.vtt"));
//! assert_eq!(backend.composition_count(), 0);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use super::{
    AssetTrack, CompositionTrackId, EngineNotification, EngineReadiness, MediaAsset, MediaBackend,
    NativeComposition, NativeEngine, NativeError, NativeTimeline, NotificationSink, Rect,
    RequestHeaders, SessionId, SurfaceKind, TimeRange, VideoGravity, VideoLayer,
};
use crate::media::TrackKind;
use crate::surface::RenderSurface;

const ERROR_DOMAIN: &str = "crossplay.headless";

/// A catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessAsset {
    pub url: String,
    pub duration_secs: f64,
    pub tracks: Vec<TrackKind>,
}

impl HeadlessAsset {
    /// An asset with the given tracks.
    pub fn new(url: impl Into<String>, duration_secs: f64, tracks: &[TrackKind]) -> Self {
        Self {
            url: url.into(),
            duration_secs,
            tracks: tracks.to_vec(),
        }
    }

    /// A video with one video and one audio track.
    pub fn movie(url: impl Into<String>, duration_secs: f64) -> Self {
        Self::new(url, duration_secs, &[TrackKind::Video, TrackKind::Audio])
    }

    /// An audio-only asset.
    pub fn song(url: impl Into<String>, duration_secs: f64) -> Self {
        Self::new(url, duration_secs, &[TrackKind::Audio])
    }

    /// A timed-text asset with a single text track.
    pub fn caption(url: impl Into<String>) -> Self {
        Self::new(url, f64::NAN, &[TrackKind::Text])
    }
}

impl MediaAsset for HeadlessAsset {
    fn url(&self) -> &str {
        &self.url
    }

    fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    fn tracks(&self, kind: TrackKind) -> Vec<AssetTrack> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, k)| **k == kind)
            .map(|(index, k)| AssetTrack {
                id: index as u32 + 1,
                kind: *k,
                source_url: self.url.clone(),
            })
            .collect()
    }
}

/// One call to [`MediaBackend::resolve_asset`], as recorded by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveRequest {
    pub url: String,
    pub headers: RequestHeaders,
}

struct BackendShared {
    catalog: RwLock<HashMap<String, Arc<HeadlessAsset>>>,
    surface_kind: SurfaceKind,
    engine_failure: Mutex<Option<NativeError>>,
    failing_inserts: Mutex<HashSet<TrackKind>>,
    auto_ready: AtomicBool,
    initial_volume: Mutex<(f32, bool)>,
    compositions: AtomicUsize,
    resolves: Mutex<Vec<ResolveRequest>>,
    resolves_held: Mutex<bool>,
    resolves_released: Condvar,
    engine: Mutex<Option<Arc<HeadlessEngine>>>,
}

/// A [`MediaBackend`] backed by an in-memory asset catalog.
///
/// Clones share state, so a test can keep one handle for inspection and give
/// another to the player.
#[derive(Clone)]
pub struct HeadlessBackend {
    shared: Arc<BackendShared>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// An empty catalog. Engines render into [`SurfaceKind::Offscreen`] and
    /// report readiness as soon as an item is observed.
    pub fn new() -> Self {
        Self::with_surface_kind(SurfaceKind::Offscreen)
    }

    /// An empty catalog whose engines render into `kind`.
    pub fn with_surface_kind(kind: SurfaceKind) -> Self {
        Self {
            shared: Arc::new(BackendShared {
                catalog: RwLock::new(HashMap::new()),
                surface_kind: kind,
                engine_failure: Mutex::new(None),
                failing_inserts: Mutex::new(HashSet::new()),
                auto_ready: AtomicBool::new(true),
                initial_volume: Mutex::new((1.0, false)),
                compositions: AtomicUsize::new(0),
                resolves: Mutex::new(Vec::new()),
                resolves_held: Mutex::new(false),
                resolves_released: Condvar::new(),
                engine: Mutex::new(None),
            }),
        }
    }

    /// Add `asset` to the catalog.
    pub fn with_asset(self, asset: HeadlessAsset) -> Self {
        self.insert_asset(asset);
        self
    }

    /// Add `asset` to the catalog, replacing any entry with the same URL.
    pub fn insert_asset(&self, asset: HeadlessAsset) {
        self.shared
            .catalog
            .write()
            .insert(asset.url.clone(), Arc::new(asset));
    }

    /// Make future engine construction fail with `error`. `None` clears it.
    pub fn fail_engine_creation(&self, error: Option<NativeError>) {
        *self.shared.engine_failure.lock() = error;
    }

    /// Make inserting tracks of `kind` into a composition fail.
    pub fn fail_inserts(&self, kind: TrackKind) {
        self.shared.failing_inserts.lock().insert(kind);
    }

    /// Whether engines report readiness on their own once observed.
    ///
    /// Applies to the current engine as well as future ones.
    pub fn set_auto_ready(&self, auto_ready: bool) {
        self.shared.auto_ready.store(auto_ready, Ordering::SeqCst);
        if let Some(engine) = self.engine() {
            engine.auto_ready.store(auto_ready, Ordering::SeqCst);
        }
    }

    /// Volume and mute that newly created engines start with.
    pub fn set_initial_volume(&self, volume: f32, muted: bool) {
        *self.shared.initial_volume.lock() = (volume, muted);
    }

    /// Compositions created so far.
    pub fn composition_count(&self) -> usize {
        self.shared.compositions.load(Ordering::SeqCst)
    }

    /// Every asset resolution so far, oldest first.
    pub fn resolve_requests(&self) -> Vec<ResolveRequest> {
        self.shared.resolves.lock().clone()
    }

    /// Make asset resolution block until [`release_resolves`](Self::release_resolves).
    ///
    /// The request is still recorded before blocking, so
    /// [`resolve_requests`](Self::resolve_requests) shows a held resolve.
    pub fn hold_resolves(&self) {
        *self.shared.resolves_held.lock() = true;
    }

    /// Let held and future resolves through.
    pub fn release_resolves(&self) {
        *self.shared.resolves_held.lock() = false;
        self.shared.resolves_released.notify_all();
    }

    /// The most recently created engine.
    pub fn engine(&self) -> Option<Arc<HeadlessEngine>> {
        self.shared.engine.lock().clone()
    }
}

impl MediaBackend for HeadlessBackend {
    fn create_engine(&self) -> Result<Arc<dyn NativeEngine>, NativeError> {
        if let Some(err) = self.shared.engine_failure.lock().clone() {
            return Err(err);
        }
        let (volume, muted) = *self.shared.initial_volume.lock();
        let engine = Arc::new(HeadlessEngine::new(
            self.shared.surface_kind,
            self.shared.auto_ready.load(Ordering::SeqCst),
            volume,
            muted,
        ));
        *self.shared.engine.lock() = Some(engine.clone());
        Ok(engine)
    }

    fn resolve_asset(&self, url: &str, headers: &RequestHeaders) -> Option<Arc<dyn MediaAsset>> {
        self.shared.resolves.lock().push(ResolveRequest {
            url: url.to_string(),
            headers: headers.clone(),
        });
        {
            let mut held = self.shared.resolves_held.lock();
            while *held {
                self.shared.resolves_released.wait(&mut held);
            }
        }
        let asset = self.shared.catalog.read().get(url).cloned()?;
        Some(asset as Arc<dyn MediaAsset>)
    }

    fn new_composition(&self) -> Box<dyn NativeComposition> {
        self.shared.compositions.fetch_add(1, Ordering::SeqCst);
        Box::new(HeadlessComposition {
            failing: self.shared.failing_inserts.lock().clone(),
            tracks: Vec::new(),
            duration_secs: 0.0,
        })
    }
}

struct HeadlessComposition {
    failing: HashSet<TrackKind>,
    tracks: Vec<(TrackKind, bool)>,
    duration_secs: f64,
}

impl NativeComposition for HeadlessComposition {
    fn add_track(&mut self, kind: TrackKind) -> CompositionTrackId {
        self.tracks.push((kind, false));
        CompositionTrackId(self.tracks.len() as u32 - 1)
    }

    fn insert_time_range(
        &mut self,
        track: CompositionTrackId,
        range: TimeRange,
        source: &AssetTrack,
        at_secs: f64,
    ) -> Result<(), NativeError> {
        let slot = self.tracks.get_mut(track.0 as usize).ok_or_else(|| {
            NativeError::new(ERROR_DOMAIN, -2, format!("no composition track {}", track.0))
        })?;
        if slot.0 != source.kind {
            return Err(NativeError::new(
                ERROR_DOMAIN,
                -3,
                format!("cannot insert {} media into a {} track", source.kind, slot.0),
            ));
        }
        if self.failing.contains(&source.kind) {
            return Err(NativeError::new(
                ERROR_DOMAIN,
                -4,
                format!("insertion of {} track from {} failed", source.kind, source.source_url),
            ));
        }
        slot.1 = true;
        if range.is_valid() {
            self.duration_secs = self.duration_secs.max(at_secs + range.duration);
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Box<dyn NativeTimeline> {
        Box::new(HeadlessTimeline {
            duration_secs: self.duration_secs,
            kinds: self
                .tracks
                .iter()
                .filter(|(_, filled)| *filled)
                .map(|(kind, _)| *kind)
                .collect(),
        })
    }
}

struct HeadlessTimeline {
    duration_secs: f64,
    kinds: Vec<TrackKind>,
}

impl NativeTimeline for HeadlessTimeline {
    fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    fn track_kinds(&self) -> Vec<TrackKind> {
        self.kinds.clone()
    }
}

#[derive(Debug, Clone)]
struct LoadedItem {
    duration_secs: f64,
    kinds: Vec<TrackKind>,
}

struct EngineState {
    item: Option<LoadedItem>,
    sink: Option<NotificationSink>,
    progress_interval: Duration,
    readiness: EngineReadiness,
    rate: f32,
    position_secs: f64,
    duration_override: Option<f64>,
    loaded_ranges: Vec<TimeRange>,
    last_error: Option<NativeError>,
    volume: f32,
    muted: bool,
    seeks: Vec<f64>,
}

/// A [`NativeEngine`] that plays nothing and does exactly what it is told.
pub struct HeadlessEngine {
    surface_kind: SurfaceKind,
    auto_ready: AtomicBool,
    state: Mutex<EngineState>,
    play_calls: AtomicUsize,
    pause_calls: AtomicUsize,
    gravity_updates: Arc<AtomicUsize>,
}

impl HeadlessEngine {
    fn new(surface_kind: SurfaceKind, auto_ready: bool, volume: f32, muted: bool) -> Self {
        Self {
            surface_kind,
            auto_ready: AtomicBool::new(auto_ready),
            state: Mutex::new(EngineState {
                item: None,
                sink: None,
                progress_interval: Duration::ZERO,
                readiness: EngineReadiness::Unknown,
                rate: 0.0,
                position_secs: 0.0,
                duration_override: None,
                loaded_ranges: Vec::new(),
                last_error: None,
                volume,
                muted,
                seeks: Vec::new(),
            }),
            play_calls: AtomicUsize::new(0),
            pause_calls: AtomicUsize::new(0),
            gravity_updates: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Send `notification` through the registered sink.
    ///
    /// Returns `false` when nothing is observing.
    pub fn emit(&self, notification: EngineNotification) -> bool {
        let sink = self.state.lock().sink.clone();
        match sink {
            Some(sink) => {
                sink.notify(notification);
                true
            }
            None => false,
        }
    }

    /// Mark the current item ready to play.
    pub fn make_ready(&self) -> bool {
        self.state.lock().readiness = EngineReadiness::Ready;
        self.emit(EngineNotification::StatusChanged(EngineReadiness::Ready))
    }

    /// Replace the loaded ranges and announce the change.
    pub fn set_loaded_ranges(&self, ranges: Vec<TimeRange>) -> bool {
        self.state.lock().loaded_ranges = ranges;
        self.emit(EngineNotification::LoadedRangesChanged)
    }

    /// Move the playhead and deliver a progress tick.
    pub fn advance_to(&self, position_secs: f64) -> bool {
        self.state.lock().position_secs = position_secs;
        self.emit(EngineNotification::ProgressTick)
    }

    /// Drop the rate to zero without telling anyone, as a starved decoder would.
    pub fn stall(&self) {
        self.state.lock().rate = 0.0;
    }

    /// Run to the end of the item.
    pub fn finish_item(&self) -> bool {
        {
            let mut state = self.state.lock();
            state.position_secs = state
                .duration_override
                .or(state.item.as_ref().map(|i| i.duration_secs))
                .unwrap_or(0.0);
            state.rate = 0.0;
        }
        self.emit(EngineNotification::PlayedToEnd)
    }

    /// Fail the current item with `error`.
    pub fn fail(&self, error: NativeError) -> bool {
        {
            let mut state = self.state.lock();
            state.readiness = EngineReadiness::Failed;
            state.rate = 0.0;
            state.last_error = Some(error.clone());
        }
        self.emit(EngineNotification::Failed(error))
    }

    /// Report `duration_secs` instead of the item's real duration.
    pub fn override_duration(&self, duration_secs: Option<f64>) {
        self.state.lock().duration_override = duration_secs;
    }

    /// The currently registered sink.
    pub fn current_sink(&self) -> Option<NotificationSink> {
        self.state.lock().sink.clone()
    }

    /// Session of the currently registered sink.
    pub fn observed_session(&self) -> Option<SessionId> {
        self.state.lock().sink.as_ref().map(NotificationSink::session)
    }

    pub fn progress_interval(&self) -> Duration {
        self.state.lock().progress_interval
    }

    pub fn has_item(&self) -> bool {
        self.state.lock().item.is_some()
    }

    /// Track kinds of the current item.
    pub fn item_track_kinds(&self) -> Vec<TrackKind> {
        self.state
            .lock()
            .item
            .as_ref()
            .map(|i| i.kinds.clone())
            .unwrap_or_default()
    }

    pub fn play_calls(&self) -> usize {
        self.play_calls.load(Ordering::SeqCst)
    }

    pub fn pause_calls(&self) -> usize {
        self.pause_calls.load(Ordering::SeqCst)
    }

    /// Every seek target, in seconds, in the order applied.
    pub fn seek_log(&self) -> Vec<f64> {
        self.state.lock().seeks.clone()
    }

    /// Gravity changes applied to layers created by this engine.
    pub fn gravity_updates(&self) -> usize {
        self.gravity_updates.load(Ordering::SeqCst)
    }

    fn set_rate_and_notify(&self, rate: f32) {
        let changed = {
            let mut state = self.state.lock();
            let changed = state.rate != rate;
            state.rate = rate;
            changed
        };
        if changed {
            self.emit(EngineNotification::RateChanged(rate));
        }
    }
}

impl NativeEngine for HeadlessEngine {
    fn surface_kind(&self) -> SurfaceKind {
        self.surface_kind
    }

    fn replace_item(&self, item: Option<&dyn NativeTimeline>) {
        let mut state = self.state.lock();
        state.item = item.map(|timeline| LoadedItem {
            duration_secs: timeline.duration_secs(),
            kinds: timeline.track_kinds(),
        });
        state.readiness = EngineReadiness::Unknown;
        state.rate = 0.0;
        state.position_secs = 0.0;
        state.duration_override = None;
        state.loaded_ranges.clear();
        state.last_error = None;
    }

    fn observe(&self, sink: NotificationSink, progress_interval: Duration) {
        let announce = {
            let mut state = self.state.lock();
            state.sink = Some(sink);
            state.progress_interval = progress_interval;
            if self.auto_ready.load(Ordering::SeqCst) && state.item.is_some() {
                state.readiness = EngineReadiness::Ready;
                true
            } else {
                false
            }
        };
        if announce {
            self.emit(EngineNotification::StatusChanged(EngineReadiness::Ready));
        }
    }

    fn unobserve(&self) {
        self.state.lock().sink = None;
    }

    fn play(&self) {
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        let ready = {
            let state = self.state.lock();
            state.item.is_some() && state.readiness == EngineReadiness::Ready
        };
        if ready {
            self.set_rate_and_notify(1.0);
        }
    }

    fn pause(&self) {
        self.pause_calls.fetch_add(1, Ordering::SeqCst);
        self.set_rate_and_notify(0.0);
    }

    fn seek(&self, position: Duration) -> Result<(), NativeError> {
        let mut state = self.state.lock();
        if state.item.is_none() {
            return Err(NativeError::new(ERROR_DOMAIN, -5, "no item to seek"));
        }
        let secs = position.as_secs_f64();
        state.position_secs = secs;
        state.seeks.push(secs);
        Ok(())
    }

    fn readiness(&self) -> EngineReadiness {
        self.state.lock().readiness
    }

    fn rate(&self) -> f32 {
        self.state.lock().rate
    }

    fn set_rate(&self, rate: f32) {
        self.set_rate_and_notify(rate);
    }

    fn position_secs(&self) -> f64 {
        let state = self.state.lock();
        if state.item.is_some() {
            state.position_secs
        } else {
            0.0
        }
    }

    fn duration_secs(&self) -> f64 {
        let state = self.state.lock();
        match (&state.item, state.duration_override) {
            (Some(_), Some(secs)) => secs,
            (Some(item), None) => item.duration_secs,
            (None, _) => f64::NAN,
        }
    }

    fn loaded_ranges(&self) -> Vec<TimeRange> {
        self.state.lock().loaded_ranges.clone()
    }

    fn last_error(&self) -> Option<NativeError> {
        self.state.lock().last_error.clone()
    }

    fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    fn set_volume(&self, volume: f32) {
        self.state.lock().volume = volume;
    }

    fn is_muted(&self) -> bool {
        self.state.lock().muted
    }

    fn set_muted(&self, muted: bool) {
        self.state.lock().muted = muted;
    }

    fn create_layer(&self, frame: Rect) -> Result<Box<dyn VideoLayer>, NativeError> {
        Ok(Box::new(HeadlessLayer {
            frame,
            gravity: Mutex::new(VideoGravity::ResizeAspect),
            updates: self.gravity_updates.clone(),
        }))
    }
}

struct HeadlessLayer {
    frame: Rect,
    gravity: Mutex<VideoGravity>,
    updates: Arc<AtomicUsize>,
}

impl VideoLayer for HeadlessLayer {
    fn frame(&self) -> Rect {
        self.frame
    }

    fn gravity(&self) -> VideoGravity {
        *self.gravity.lock()
    }

    fn set_gravity(&self, gravity: VideoGravity) {
        *self.gravity.lock() = gravity;
        self.updates.fetch_add(1, Ordering::SeqCst);
    }
}

/// A [`RenderSurface`] that records what gets attached to it.
pub struct HeadlessSurface {
    kind: SurfaceKind,
    frame: Rect,
    disposed: AtomicBool,
    attached: Mutex<Vec<Rect>>,
    detached: AtomicUsize,
}

impl HeadlessSurface {
    pub fn new(kind: SurfaceKind, frame: Rect) -> Self {
        Self {
            kind,
            frame,
            disposed: AtomicBool::new(false),
            attached: Mutex::new(Vec::new()),
            detached: AtomicUsize::new(0),
        }
    }

    /// Mark the surface as torn down by its UI toolkit.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    /// Frames of every layer attached so far.
    pub fn attached_frames(&self) -> Vec<Rect> {
        self.attached.lock().clone()
    }

    /// How many times a layer was taken out of this surface.
    pub fn detach_count(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }
}

impl RenderSurface for HeadlessSurface {
    fn kind(&self) -> SurfaceKind {
        self.kind
    }

    fn frame(&self) -> Rect {
        self.frame
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn attach_layer(&self, layer: &dyn VideoLayer) {
        self.attached.lock().push(layer.frame());
    }

    fn detach_layer(&self) {
        self.detached.fetch_add(1, Ordering::SeqCst);
    }
}
