//! Outward player events.
//!
//! State transitions and notification handlers never emit directly. They
//! collect [`PlayerEvent`]s into an [`EventBatch`] while the player state is
//! locked; the player emits the batch once the lock is released.

use std::sync::Arc;
use std::time::Duration;

use crossplay_core::Signal;

use crate::error::MediaError;
use crate::media::MediaFile;
use crate::state::PlaybackStatus;

/// Periodic playback progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayingChanged {
    /// `position / duration` in `[0, 1]`; zero while the duration is unknown.
    pub progress: f64,
    pub position: Duration,
    pub duration: Duration,
}

/// Buffering progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferingChanged {
    /// `buffered / duration` in `[0, 1]`; zero while the duration is unknown.
    pub fraction: f64,
    pub buffered: Duration,
}

/// Playback reached the end of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFinished {
    pub file: Arc<MediaFile>,
}

/// Playback failed.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFailed {
    /// Human-readable description including every native diagnostic.
    pub message: String,
    pub error: MediaError,
}

impl MediaFailed {
    pub fn new(error: MediaError) -> Self {
        Self {
            message: error.to_string(),
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StatusChanged(PlaybackStatus),
    Playing(PlayingChanged),
    Buffering(BufferingChanged),
    Finished(MediaFinished),
    Failed(MediaFailed),
}

/// Events collected during one serialized operation, in order.
#[derive(Debug, Default)]
pub struct EventBatch {
    events: Vec<PlayerEvent>,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: PlayerEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerEvent> {
        self.events.iter()
    }

    pub fn into_vec(self) -> Vec<PlayerEvent> {
        self.events
    }
}

/// The player's signals.
pub(crate) struct PlayerSignals {
    pub status_changed: Signal<PlaybackStatus>,
    pub playing_changed: Signal<PlayingChanged>,
    pub buffering_changed: Signal<BufferingChanged>,
    pub media_finished: Signal<MediaFinished>,
    pub media_failed: Signal<MediaFailed>,
}

impl PlayerSignals {
    pub fn new() -> Self {
        Self {
            status_changed: Signal::new(),
            playing_changed: Signal::new(),
            buffering_changed: Signal::new(),
            media_finished: Signal::new(),
            media_failed: Signal::new(),
        }
    }

    /// Emit every event in `batch`, in order.
    pub fn emit_batch(&self, batch: EventBatch) {
        for event in batch.into_vec() {
            match event {
                PlayerEvent::StatusChanged(status) => {
                    self.status_changed.emit(status);
                }
                PlayerEvent::Playing(args) => {
                    self.playing_changed.emit(args);
                }
                PlayerEvent::Buffering(args) => {
                    self.buffering_changed.emit(args);
                }
                PlayerEvent::Finished(args) => {
                    self.media_finished.emit(args);
                }
                PlayerEvent::Failed(args) => {
                    self.media_failed.emit(args);
                }
            }
        }
    }
}
