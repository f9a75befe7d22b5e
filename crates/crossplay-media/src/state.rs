//! The playback state machine.
//!
//! [`PlaybackStateMachine`] is the single source of truth for what playback
//! is doing. It is a plain struct: the player owns it behind a lock and only
//! touches it from its dispatch queue, which is what serializes transitions.
//!
//! ```text
//!            play (new session)            engine ready
//!  Stopped ───────────────────▶ Buffering ─────────────▶ Playing
//!     ▲                             │  ▲                    │
//!     │ stop / failure              │  │ play (not ready)   │
//!     │ (from any state)      pause ▼  │                    │ pause
//!     └──────────────────────── Paused ◀────────────────────┘
//!                                  │ play (ready) ──────▶ Playing
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{EngineReadiness, NativeEngine, SessionId};
use crate::composer::ComposedTimeline;
use crate::error::MediaError;
use crate::events::{EventBatch, MediaFailed, PlayerEvent};
use crate::media::MediaFile;
use crate::targets::STATE as TARGET;

/// The logical playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Buffering,
    Playing,
    Paused,
}

impl PlaybackStatus {
    /// Playing or about to.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Buffering)
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "Stopped",
            Self::Buffering => "Buffering",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
        };
        f.write_str(name)
    }
}

/// The result of a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied {
        from: PlaybackStatus,
        to: PlaybackStatus,
    },
    Unchanged,
}

impl Transition {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// What a `play` request has to do, given the current state.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayPlan {
    /// Already playing or buffering the requested file.
    Ignore,
    /// Continue the paused session.
    Resume,
    /// Paused with nothing loaded: only the status changes.
    ResumeWithoutSession,
    /// Start a new session for this file.
    Compose(Arc<MediaFile>),
    /// No file was given and none was played before.
    NoMedia,
}

/// One active playback of one media file.
#[derive(Debug)]
pub struct PlaybackSession {
    id: SessionId,
    file: Arc<MediaFile>,
    timeline: Option<ComposedTimeline>,
    caption_url: Option<String>,
    rate: f32,
    buffered: Duration,
}

impl PlaybackSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn file(&self) -> &Arc<MediaFile> {
        &self.file
    }

    /// The composed timeline, once composition has finished.
    pub fn timeline(&self) -> Option<&ComposedTimeline> {
        self.timeline.as_ref()
    }

    /// Caption URL captured when the session started.
    pub fn caption_url(&self) -> Option<&str> {
        self.caption_url.as_deref()
    }

    /// Last rate the engine reported.
    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn buffered(&self) -> Duration {
        self.buffered
    }

    /// `engine_secs` when the engine knows the duration, otherwise the
    /// file's duration hint. NaN when neither is known.
    pub fn duration_secs(&self, engine_secs: f64) -> f64 {
        if engine_secs.is_finite() && engine_secs >= 0.0 {
            return engine_secs;
        }
        self.file
            .metadata()
            .and_then(|metadata| metadata.duration_hint)
            .map_or(f64::NAN, |hint| hint.as_secs_f64())
    }

    pub(crate) fn set_rate(&mut self, rate: f32) {
        self.rate = rate;
    }

    pub(crate) fn set_buffered(&mut self, buffered: Duration) {
        self.buffered = buffered;
    }
}

/// Owns the playback status and the current session.
#[derive(Debug)]
pub struct PlaybackStateMachine {
    status: PlaybackStatus,
    session: Option<PlaybackSession>,
    last_file: Option<Arc<MediaFile>>,
    next_id: SessionId,
}

impl Default for PlaybackStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackStateMachine {
    pub fn new() -> Self {
        Self {
            status: PlaybackStatus::Stopped,
            session: None,
            last_file: None,
            next_id: SessionId::first(),
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut PlaybackSession> {
        self.session.as_mut()
    }

    /// The file of the most recent session, kept across `stop`.
    pub fn last_file(&self) -> Option<&Arc<MediaFile>> {
        self.last_file.as_ref()
    }

    /// Whether `id` names the live session.
    pub fn is_current(&self, id: SessionId) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == id)
    }

    /// Decide how to honor `play(requested)`.
    pub fn plan_play(&self, requested: Option<&MediaFile>) -> PlayPlan {
        if let Some(file) = requested {
            let same_file = self
                .session
                .as_ref()
                .is_some_and(|s| s.file.url() == file.url());
            if !same_file {
                return PlayPlan::Compose(Arc::new(file.clone()));
            }
        }

        match self.status {
            PlaybackStatus::Playing | PlaybackStatus::Buffering => PlayPlan::Ignore,
            PlaybackStatus::Paused if self.session.is_some() => PlayPlan::Resume,
            PlaybackStatus::Paused => PlayPlan::ResumeWithoutSession,
            PlaybackStatus::Stopped => match (&self.session, &self.last_file) {
                (Some(session), _) => PlayPlan::Compose(session.file.clone()),
                (None, Some(file)) => PlayPlan::Compose(file.clone()),
                (None, None) => PlayPlan::NoMedia,
            },
        }
    }

    /// Replace any current session with a fresh one for `file` and enter
    /// Buffering. Work tagged with the old session id becomes stale.
    pub fn begin_session(
        &mut self,
        file: Arc<MediaFile>,
        caption_url: Option<String>,
        engine: Option<&dyn NativeEngine>,
        events: &mut EventBatch,
    ) -> SessionId {
        if let Some(old) = self.session.take() {
            tracing::debug!(target: TARGET, session = %old.id, "session superseded");
            if let Some(engine) = engine {
                release(engine);
            }
        }

        let id = self.next_id;
        self.next_id = id.next();
        tracing::debug!(target: TARGET, session = %id, url = file.url(), "session started");

        self.last_file = Some(file.clone());
        self.session = Some(PlaybackSession {
            id,
            file,
            timeline: None,
            caption_url,
            rate: 0.0,
            buffered: Duration::ZERO,
        });
        self.set_status(PlaybackStatus::Buffering, events);
        id
    }

    /// Hand a finished timeline to session `id`.
    ///
    /// Returns the timeline back if `id` is stale.
    pub fn install_timeline(
        &mut self,
        id: SessionId,
        timeline: ComposedTimeline,
    ) -> Result<&ComposedTimeline, ComposedTimeline> {
        match self.session.as_mut() {
            Some(session) if session.id == id => Ok(&*session.timeline.insert(timeline)),
            _ => Err(timeline),
        }
    }

    /// Continue the paused session.
    ///
    /// Goes straight to Playing when the engine is ready for the session's
    /// timeline; otherwise back to Buffering until readiness arrives.
    pub fn resume(&mut self, engine: Option<&dyn NativeEngine>, events: &mut EventBatch) -> Transition {
        if self.status != PlaybackStatus::Paused {
            return Transition::Unchanged;
        }

        let has_timeline = self.session.as_ref().is_some_and(|s| s.timeline.is_some());
        match engine {
            Some(engine) if has_timeline && engine.readiness() == EngineReadiness::Ready => {
                engine.play();
                self.set_status(PlaybackStatus::Playing, events)
            }
            _ if self.session.is_some() => self.set_status(PlaybackStatus::Buffering, events),
            Some(engine) => {
                engine.play();
                self.set_status(PlaybackStatus::Playing, events)
            }
            None => self.set_status(PlaybackStatus::Playing, events),
        }
    }

    /// The engine became ready for the current session's timeline.
    pub fn mark_ready(&mut self, engine: &dyn NativeEngine, events: &mut EventBatch) -> Transition {
        if self.status != PlaybackStatus::Buffering {
            tracing::trace!(target: TARGET, status = %self.status, "readiness ignored");
            return Transition::Unchanged;
        }
        engine.play();
        self.set_status(PlaybackStatus::Playing, events)
    }

    /// Pause. From Stopped this only records Paused.
    pub fn pause(&mut self, engine: Option<&dyn NativeEngine>, events: &mut EventBatch) -> Transition {
        match self.status {
            PlaybackStatus::Paused => Transition::Unchanged,
            PlaybackStatus::Playing | PlaybackStatus::Buffering => {
                if let Some(engine) = engine {
                    if self.session.as_ref().is_some_and(|s| s.timeline.is_some()) {
                        engine.pause();
                    }
                }
                self.set_status(PlaybackStatus::Paused, events)
            }
            PlaybackStatus::Stopped => self.set_status(PlaybackStatus::Paused, events),
        }
    }

    /// Stop and tear the session down. A no-op when already Stopped with no
    /// session.
    pub fn stop(&mut self, engine: Option<&dyn NativeEngine>, events: &mut EventBatch) -> Transition {
        if self.status == PlaybackStatus::Stopped && self.session.is_none() {
            return Transition::Unchanged;
        }
        if let Some(engine) = engine {
            release(engine);
        }
        if let Some(session) = self.session.take() {
            tracing::debug!(target: TARGET, session = %session.id, "session ended");
        }
        self.set_status(PlaybackStatus::Stopped, events)
    }

    /// Report `error` and force Stopped.
    pub fn fail(&mut self, error: MediaError, engine: Option<&dyn NativeEngine>, events: &mut EventBatch) {
        tracing::warn!(target: TARGET, error = %error, "playback failed");
        events.push(PlayerEvent::Failed(MediaFailed::new(error)));
        self.stop(engine, events);
    }

    fn set_status(&mut self, to: PlaybackStatus, events: &mut EventBatch) -> Transition {
        let from = self.status;
        if from == to {
            return Transition::Unchanged;
        }
        self.status = to;
        tracing::debug!(target: TARGET, %from, %to, "status changed");
        events.push(PlayerEvent::StatusChanged(to));
        Transition::Applied { from, to }
    }
}

/// Detach the engine from whatever it is playing.
fn release(engine: &dyn NativeEngine) {
    engine.pause();
    engine.unobserve();
    engine.replace_item(None);
}

/// Clamp a seek target to `[0, duration]`.
///
/// Non-finite or negative targets become zero. An unknown duration leaves the
/// upper end open.
pub fn clamp_seek(target_secs: f64, duration_secs: f64) -> Duration {
    if !target_secs.is_finite() || target_secs <= 0.0 {
        return Duration::ZERO;
    }
    let bounded = if duration_secs.is_finite() && duration_secs >= 0.0 {
        target_secs.min(duration_secs)
    } else {
        target_secs
    };
    Duration::try_from_secs_f64(bounded).unwrap_or(Duration::ZERO)
}
