//! The video player facade.
//!
//! [`VideoPlayer`] ties the pieces together. Every playback operation is
//! posted onto the player's dispatch queue and returns immediately; results
//! arrive through signals, always emitted from that queue and always after
//! the player's state lock has been released, so slots may call straight
//! back into the player.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use crossplay_media::{MediaFile, PlaybackStatus, VideoPlayer};
//! use crossplay_media::backend::headless::{HeadlessAsset, HeadlessBackend};
//!
//! let backend = HeadlessBackend::new().with_asset(HeadlessAsset::movie("a.mp4", 60.0));
//! let player = VideoPlayer::new(Arc::new(backend)).unwrap();
//!
//! player.on_status_changed(|status| println!("status: {status}"));
//! player.play(Some(MediaFile::video("a.mp4"))).unwrap();
//! player.wait_idle().unwrap();
//! assert_eq!(player.status(), PlaybackStatus::Playing);
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crossplay_core::{ConnectionId, SerialQueue};

use crate::backend::{
    MediaBackend, NativeEngine, NativeError, NotificationSink, RequestHeaders, SessionId,
    VideoLayer, seconds_to_duration,
};
use crate::composer::{ComposedTimeline, CompositionRequest, TrackComposer};
use crate::config::PlayerConfig;
use crate::error::{MediaError, Result};
use crate::events::{
    BufferingChanged, EventBatch, MediaFailed, MediaFinished, PlayerSignals, PlayingChanged,
};
use crate::media::{MediaFile, TrackKind};
use crate::reconciler::EventReconciler;
use crate::state::{PlayPlan, PlaybackStateMachine, PlaybackStatus, clamp_seek};
use crate::surface::{AspectMode, RenderSurface};
use crate::targets::PLAYER as TARGET;
use crate::volume::{VolumeAuthority, VolumeBridge, VolumeController};

/// Upper bound on drain rounds in [`VideoPlayer::wait_idle`].
const MAX_IDLE_ROUNDS: usize = 64;

/// A read-only view of the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub file: Arc<MediaFile>,
    pub status: PlaybackStatus,
    pub caption_url: Option<String>,
    /// Kinds of the tracks in the composed timeline; empty while composing.
    pub track_kinds: Vec<TrackKind>,
    pub has_timeline: bool,
    pub rate: f32,
    pub buffered: Duration,
}

/// Settings a new session starts with, captured when `play` is called.
#[derive(Debug, Clone, Default)]
struct SessionDefaults {
    closed_caption: Option<String>,
    headers: RequestHeaders,
}

/// Mutable player state. Only touched with the lock held.
struct PlayerCore {
    backend: Arc<dyn MediaBackend>,
    engine: Option<Arc<dyn NativeEngine>>,
    machine: PlaybackStateMachine,
    aspect_mode: AspectMode,
    surface: Option<Arc<dyn RenderSurface>>,
    layer: Option<Box<dyn VideoLayer>>,
    volume: Arc<dyn VolumeAuthority>,
    volume_bridge: Option<VolumeBridge>,
}

impl PlayerCore {
    /// The engine, created on first use.
    fn ensure_engine(&mut self) -> std::result::Result<Arc<dyn NativeEngine>, NativeError> {
        if let Some(engine) = &self.engine {
            return Ok(engine.clone());
        }
        let engine = self.backend.create_engine().inspect_err(|err| {
            tracing::error!(target: TARGET, error = %err, "native engine construction failed");
        })?;
        tracing::info!(target: TARGET, surface = %engine.surface_kind(), "native engine created");
        self.volume_bridge = Some(VolumeBridge::attach(self.volume.clone(), &engine));
        self.engine = Some(engine.clone());
        Ok(engine)
    }

    /// Take the layer out of the current surface and drop both.
    fn release_surface(&mut self) {
        let layer = self.layer.take();
        let surface = self.surface.take();
        if let (Some(surface), Some(_)) = (surface, layer) {
            if !surface.is_disposed() {
                surface.detach_layer();
            }
        }
    }

    /// Duration of the loaded item, with the file's hint standing in while
    /// the engine does not know it. NaN when nothing is loaded.
    fn duration_secs(&self) -> f64 {
        match (self.loaded_engine(), self.machine.session()) {
            (Some(engine), Some(session)) => session.duration_secs(engine.duration_secs()),
            _ => f64::NAN,
        }
    }

    fn has_timeline(&self) -> bool {
        self.machine
            .session()
            .is_some_and(|session| session.timeline().is_some())
    }

    /// The engine, but only while it holds the current session's timeline.
    fn loaded_engine(&self) -> Option<&dyn NativeEngine> {
        if self.has_timeline() {
            self.engine.as_deref()
        } else {
            None
        }
    }
}

struct PlayerShared {
    core: Mutex<PlayerCore>,
    defaults: Mutex<SessionDefaults>,
    signals: PlayerSignals,
    dispatch: SerialQueue,
    compose: SerialQueue,
    composer: TrackComposer,
    reconciler: EventReconciler,
    progress_interval: Duration,
}

impl PlayerShared {
    /// Run `op` on the dispatch queue with the core locked, then emit
    /// whatever events it collected.
    fn run<F>(self: &Arc<Self>, op: F) -> Result<()>
    where
        F: FnOnce(&Arc<PlayerShared>, &mut PlayerCore, &mut EventBatch) + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        self.dispatch.submit(move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut events = EventBatch::new();
            {
                let mut core = shared.core.lock();
                op(&shared, &mut *core, &mut events);
            }
            shared.signals.emit_batch(events);
        })?;
        Ok(())
    }

    fn play_now(
        self: &Arc<Self>,
        core: &mut PlayerCore,
        file: Option<&MediaFile>,
        defaults: &SessionDefaults,
        events: &mut EventBatch,
    ) {
        match core.machine.plan_play(file) {
            PlayPlan::Ignore => {
                tracing::trace!(target: TARGET, status = %core.machine.status(), "play ignored");
            }
            PlayPlan::Resume | PlayPlan::ResumeWithoutSession => {
                core.machine.resume(core.engine.as_deref(), events);
            }
            PlayPlan::NoMedia => {
                tracing::warn!(target: TARGET, "play requested with no media");
                core.machine.fail(
                    MediaError::Resolution { url: String::new() },
                    core.engine.as_deref(),
                    events,
                );
            }
            PlayPlan::Compose(file) => self.start_session(core, file, defaults, events),
        }
    }

    fn start_session(
        self: &Arc<Self>,
        core: &mut PlayerCore,
        file: Arc<MediaFile>,
        defaults: &SessionDefaults,
        events: &mut EventBatch,
    ) {
        let engine = match core.ensure_engine() {
            Ok(engine) => engine,
            Err(err) => {
                core.machine.fail(MediaError::EngineUnavailable(err), None, events);
                return;
            }
        };

        let caption = defaults.closed_caption.clone();
        let session = core
            .machine
            .begin_session(file.clone(), caption.clone(), Some(engine.as_ref()), events);
        let request = CompositionRequest::new(file.url())
            .with_caption(caption)
            .with_headers(defaults.headers.clone());

        let weak = Arc::downgrade(self);
        let composer = self.composer.clone();
        let submitted = self.compose.submit(move || {
            let result = composer.compose(&request);
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let posted = shared.run(move |shared, core, events| {
                shared.finish_composition(core, session, result, events);
            });
            if posted.is_err() {
                tracing::debug!(target: TARGET, %session, "composition finished after shutdown");
            }
        });

        if let Err(err) = submitted {
            core.machine.fail(err.into(), Some(engine.as_ref()), events);
        }
    }

    fn finish_composition(
        self: &Arc<Self>,
        core: &mut PlayerCore,
        session: SessionId,
        result: Result<ComposedTimeline>,
        events: &mut EventBatch,
    ) {
        if !core.machine.is_current(session) {
            tracing::trace!(target: TARGET, %session, "stale composition discarded");
            return;
        }

        let timeline = match result {
            Ok(timeline) => timeline,
            Err(err) => {
                core.machine.fail(err, core.engine.as_deref(), events);
                return;
            }
        };
        let engine = match core.ensure_engine() {
            Ok(engine) => engine,
            Err(err) => {
                core.machine.fail(MediaError::EngineUnavailable(err), None, events);
                return;
            }
        };

        match core.machine.install_timeline(session, timeline) {
            Ok(installed) => engine.replace_item(Some(installed.native())),
            Err(_) => return,
        }
        engine.observe(self.sink(session), self.progress_interval);
        tracing::debug!(target: TARGET, %session, "timeline installed");
    }

    fn sink(self: &Arc<Self>, session: SessionId) -> NotificationSink {
        let weak = Arc::downgrade(self);
        NotificationSink::new(session, move |session, notification| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let posted = shared.run(move |shared, core, events| {
                let Some(engine) = core.engine.clone() else {
                    return;
                };
                shared
                    .reconciler
                    .handle(&mut core.machine, engine.as_ref(), session, notification, events);
            });
            if posted.is_err() {
                tracing::trace!(target: TARGET, %session, "notification after shutdown dropped");
            }
        })
    }
}

/// Builder for [`VideoPlayer`].
pub struct VideoPlayerBuilder {
    backend: Arc<dyn MediaBackend>,
    config: PlayerConfig,
    volume: Option<Arc<dyn VolumeAuthority>>,
}

impl VideoPlayerBuilder {
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `authority` as the canonical volume. Defaults to a fresh
    /// [`VolumeController`].
    pub fn volume_authority(mut self, authority: Arc<dyn VolumeAuthority>) -> Self {
        self.volume = Some(authority);
        self
    }

    /// Spawn the player's queues.
    pub fn build(self) -> Result<VideoPlayer> {
        let dispatch = SerialQueue::with_config(self.config.dispatch_queue())?;
        let compose = SerialQueue::with_config(self.config.compose_queue())?;
        let volume: Arc<dyn VolumeAuthority> = match self.volume {
            Some(authority) => authority,
            None => Arc::new(VolumeController::new()),
        };

        let core = PlayerCore {
            backend: self.backend.clone(),
            engine: None,
            machine: PlaybackStateMachine::new(),
            aspect_mode: self.config.default_aspect_mode,
            surface: None,
            layer: None,
            volume,
            volume_bridge: None,
        };
        let defaults = SessionDefaults {
            closed_caption: None,
            headers: self.config.request_headers.clone(),
        };

        tracing::info!(
            target: TARGET,
            progress_interval_ms = self.config.progress_interval_ms,
            "video player created"
        );

        Ok(VideoPlayer {
            shared: Arc::new(PlayerShared {
                core: Mutex::new(core),
                defaults: Mutex::new(defaults),
                signals: PlayerSignals::new(),
                dispatch,
                compose,
                composer: TrackComposer::new(self.backend),
                reconciler: EventReconciler::new(),
                progress_interval: self.config.progress_interval(),
            }),
        })
    }
}

/// A video (or audio) player with signal-based notifications.
///
/// # Signals
///
/// - `status_changed`: the playback status changed.
/// - `playing_changed`: periodic progress while an item is loaded.
/// - `buffering_changed`: the loaded ranges changed.
/// - `media_finished`: playback reached the end of the file. The player does
///   not stop on its own.
/// - `media_failed`: playback failed; the player is Stopped by the time
///   this is emitted.
///
/// Dropping the player stops playback and joins its threads.
pub struct VideoPlayer {
    shared: Arc<PlayerShared>,
}

impl VideoPlayer {
    /// A player with the default configuration.
    pub fn new(backend: Arc<dyn MediaBackend>) -> Result<Self> {
        Self::builder(backend).build()
    }

    pub fn builder(backend: Arc<dyn MediaBackend>) -> VideoPlayerBuilder {
        VideoPlayerBuilder {
            backend,
            config: PlayerConfig::default(),
            volume: None,
        }
    }

    pub fn on_status_changed<F>(&self, callback: F) -> ConnectionId
    where
        F: Fn(&PlaybackStatus) + Send + Sync + 'static,
    {
        self.shared.signals.status_changed.connect(callback)
    }

    pub fn disconnect_status_changed(&self, id: ConnectionId) -> bool {
        self.shared.signals.status_changed.disconnect(id)
    }

    pub fn on_playing_changed<F>(&self, callback: F) -> ConnectionId
    where
        F: Fn(&PlayingChanged) + Send + Sync + 'static,
    {
        self.shared.signals.playing_changed.connect(callback)
    }

    pub fn disconnect_playing_changed(&self, id: ConnectionId) -> bool {
        self.shared.signals.playing_changed.disconnect(id)
    }

    pub fn on_buffering_changed<F>(&self, callback: F) -> ConnectionId
    where
        F: Fn(&BufferingChanged) + Send + Sync + 'static,
    {
        self.shared.signals.buffering_changed.connect(callback)
    }

    pub fn disconnect_buffering_changed(&self, id: ConnectionId) -> bool {
        self.shared.signals.buffering_changed.disconnect(id)
    }

    pub fn on_media_finished<F>(&self, callback: F) -> ConnectionId
    where
        F: Fn(&MediaFinished) + Send + Sync + 'static,
    {
        self.shared.signals.media_finished.connect(callback)
    }

    pub fn disconnect_media_finished(&self, id: ConnectionId) -> bool {
        self.shared.signals.media_finished.disconnect(id)
    }

    pub fn on_media_failed<F>(&self, callback: F) -> ConnectionId
    where
        F: Fn(&MediaFailed) + Send + Sync + 'static,
    {
        self.shared.signals.media_failed.connect(callback)
    }

    pub fn disconnect_media_failed(&self, id: ConnectionId) -> bool {
        self.shared.signals.media_failed.disconnect(id)
    }

    /// Start or resume playback.
    ///
    /// With `Some(file)` naming a different file than the current session,
    /// a new session is started. Otherwise a paused session resumes, an
    /// active one is left alone, and a stopped player replays the last file.
    ///
    /// A session started by this call uses the closed caption and request
    /// headers set before it, not ones set while it is still queued.
    pub fn play(&self, file: Option<MediaFile>) -> Result<()> {
        let defaults = self.shared.defaults.lock().clone();
        self.shared.run(move |shared, core, events| {
            shared.play_now(core, file.as_ref(), &defaults, events);
        })
    }

    /// Pause playback.
    pub fn pause(&self) -> Result<()> {
        self.shared.run(|_, core, events| {
            core.machine.pause(core.engine.as_deref(), events);
        })
    }

    /// Stop playback and release the current session.
    pub fn stop(&self) -> Result<()> {
        self.shared.run(|_, core, events| {
            core.machine.stop(core.engine.as_deref(), events);
        })
    }

    /// Pause when playing or buffering, play otherwise.
    pub fn toggle_playback(&self) -> Result<()> {
        let defaults = self.shared.defaults.lock().clone();
        self.shared.run(move |shared, core, events| {
            if core.machine.status().is_active() {
                core.machine.pause(core.engine.as_deref(), events);
            } else {
                shared.play_now(core, None, &defaults, events);
            }
        })
    }

    /// Seek to `position`, clamped to the media duration.
    pub fn seek(&self, position: Duration) -> Result<()> {
        self.seek_secs(position.as_secs_f64())
    }

    /// Seek to `position_secs`. Negative and NaN targets seek to zero. With
    /// no known duration the target is only bounded below.
    ///
    /// Ignored until the current session's timeline is loaded.
    pub fn seek_secs(&self, position_secs: f64) -> Result<()> {
        self.shared.run(move |_, core, _| {
            let duration_secs = core.duration_secs();
            let Some(engine) = core.loaded_engine() else {
                tracing::debug!(target: TARGET, "seek ignored, nothing loaded");
                return;
            };
            let target = clamp_seek(position_secs, duration_secs);
            if let Err(err) = engine.seek(target) {
                tracing::warn!(target: TARGET, error = %err, "seek failed");
            }
        })
    }

    /// Change the playback rate of the engine.
    pub fn set_rate(&self, rate: f32) -> Result<()> {
        self.shared.run(move |_, core, _| {
            if let Some(engine) = core.engine.as_deref() {
                engine.set_rate(rate);
            }
        })
    }

    pub fn status(&self) -> PlaybackStatus {
        self.shared.core.lock().machine.status()
    }

    /// The playback rate last reported by the engine; zero with no session.
    pub fn rate(&self) -> f32 {
        let core = self.shared.core.lock();
        core.machine.session().map_or(0.0, |s| s.rate())
    }

    /// Current position; zero while nothing is loaded.
    pub fn position(&self) -> Duration {
        let core = self.shared.core.lock();
        core.loaded_engine()
            .map_or(Duration::ZERO, |engine| seconds_to_duration(engine.position_secs()))
    }

    /// Total duration; the file's duration hint while the engine does not
    /// know it, zero when neither is known.
    pub fn duration(&self) -> Duration {
        seconds_to_duration(self.shared.core.lock().duration_secs())
    }

    /// Length of the largest contiguous loaded span.
    pub fn buffered(&self) -> Duration {
        let core = self.shared.core.lock();
        core.machine.session().map_or(Duration::ZERO, |s| s.buffered())
    }

    pub fn session_snapshot(&self) -> Option<SessionSnapshot> {
        let core = self.shared.core.lock();
        let status = core.machine.status();
        core.machine.session().map(|session| SessionSnapshot {
            id: session.id(),
            file: session.file().clone(),
            status,
            caption_url: session.caption_url().map(str::to_owned),
            track_kinds: session
                .timeline()
                .map(ComposedTimeline::track_kinds)
                .unwrap_or_default(),
            has_timeline: session.timeline().is_some(),
            rate: session.rate(),
            buffered: session.buffered(),
        })
    }

    /// Attach video output to `surface`, or detach with `None`.
    ///
    /// The surface must be of the kind the engine renders into. The layer is
    /// sized to the surface's current frame and uses the current aspect mode.
    /// A previous surface has its layer detached once the new one is accepted.
    pub fn set_render_surface(&self, surface: Option<Arc<dyn RenderSurface>>) -> Result<()> {
        let mut guard = self.shared.core.lock();
        let core = &mut *guard;

        let Some(surface) = surface else {
            core.release_surface();
            return Ok(());
        };
        if surface.is_disposed() {
            return Err(MediaError::SurfaceDisposed);
        }

        let engine = core.ensure_engine().map_err(MediaError::EngineUnavailable)?;
        let expected = engine.surface_kind();
        let found = surface.kind();
        if found != expected {
            tracing::warn!(target: TARGET, %expected, %found, "render surface rejected");
            return Err(MediaError::InvalidSurface { expected, found });
        }

        let layer = engine.create_layer(surface.frame()).map_err(MediaError::Engine)?;
        layer.set_gravity(core.aspect_mode.gravity());
        core.release_surface();
        surface.attach_layer(layer.as_ref());
        core.layer = Some(layer);
        core.surface = Some(surface);
        Ok(())
    }

    pub fn render_surface(&self) -> Option<Arc<dyn RenderSurface>> {
        self.shared.core.lock().surface.clone()
    }

    /// Whether video output is attached to a live surface.
    pub fn is_ready_rendering(&self) -> bool {
        let core = self.shared.core.lock();
        core.layer.is_some() && core.surface.as_ref().is_some_and(|s| !s.is_disposed())
    }

    pub fn aspect_mode(&self) -> AspectMode {
        self.shared.core.lock().aspect_mode
    }

    /// Change the aspect mode, updating the attached layer if there is one.
    pub fn set_aspect_mode(&self, mode: AspectMode) {
        let mut core = self.shared.core.lock();
        core.aspect_mode = mode;
        if let Some(layer) = &core.layer {
            layer.set_gravity(mode.gravity());
        }
    }

    pub fn closed_caption(&self) -> Option<String> {
        self.shared.defaults.lock().closed_caption.clone()
    }

    /// Set the caption URL used by sessions that later `play` calls start.
    /// An empty URL means no captions. The current session and plays already
    /// issued are unaffected.
    pub fn set_closed_caption(&self, url: Option<String>) {
        self.shared.defaults.lock().closed_caption = url.filter(|u| !u.trim().is_empty());
    }

    pub fn request_headers(&self) -> RequestHeaders {
        self.shared.defaults.lock().headers.clone()
    }

    /// Headers sent with asset requests of sessions that later `play` calls
    /// start.
    pub fn set_request_headers(&self, headers: RequestHeaders) {
        self.shared.defaults.lock().headers = headers;
    }

    /// The canonical volume.
    pub fn volume(&self) -> Arc<dyn VolumeAuthority> {
        self.shared.core.lock().volume.clone()
    }

    /// Block until every queued operation, composition and notification has
    /// been processed.
    ///
    /// Must not be called from a signal slot.
    pub fn wait_idle(&self) -> Result<()> {
        let shared = &self.shared;
        for _ in 0..MAX_IDLE_ROUNDS {
            shared.dispatch.submit_sync(|| ())?;
            shared.compose.submit_sync(|| ())?;
            shared.dispatch.submit_sync(|| ())?;
            if shared.dispatch.pending_tasks() == 0 && shared.compose.pending_tasks() == 0 {
                return Ok(());
            }
        }
        tracing::debug!(target: TARGET, "player still busy after draining");
        Ok(())
    }

    /// Stop playback and join the player's threads. Later operations fail
    /// with [`MediaError::QueueStopped`].
    pub fn shutdown(&self) {
        if !self.shared.dispatch.is_running() {
            return;
        }
        let _ = self.stop();
        self.shared.compose.stop_and_join();
        self.shared.dispatch.stop_and_join();

        let mut core = self.shared.core.lock();
        core.release_surface();
        core.volume_bridge = None;
        if let Some(engine) = core.engine.take() {
            engine.unobserve();
        }
        tracing::info!(target: TARGET, "video player shut down");
    }
}

impl Drop for VideoPlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
