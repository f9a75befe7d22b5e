//! Cross-platform media playback core.
//!
//! This crate implements the platform-independent half of a video player:
//! the playback state machine, reconciliation of asynchronous native engine
//! notifications, composition of video, audio and caption tracks into one
//! timeline, and the bridge between a shared volume control and the engine.
//! Everything native sits behind the traits in [`backend`]; the
//! [`backend::headless`] implementation runs the whole pipeline in memory.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use crossplay_media::{MediaFile, PlaybackStatus, VideoPlayer};
//! use crossplay_media::backend::headless::{HeadlessAsset, HeadlessBackend};
//!
//! let backend = HeadlessBackend::new().with_asset(HeadlessAsset::movie("intro.mp4", 12.0));
//! let player = VideoPlayer::new(Arc::new(backend)).unwrap();
//!
//! player.on_media_failed(|failure| eprintln!("{}", failure.message));
//! player.play(Some(MediaFile::video("intro.mp4"))).unwrap();
//! player.wait_idle().unwrap();
//! assert_eq!(player.status(), PlaybackStatus::Playing);
//! ```

pub mod backend;
pub mod composer;
mod config;
mod error;
pub mod events;
mod media;
mod player;
pub mod reconciler;
pub mod state;
pub mod surface;
pub mod volume;

pub use config::{PlayerConfig, PlayerConfigBuilder};
pub use error::{MediaError, Result};
pub use events::{BufferingChanged, MediaFailed, MediaFinished, PlayingChanged};
pub use media::{MediaFile, MediaKind, MediaMetadata, TrackKind};
pub use player::{SessionSnapshot, VideoPlayer, VideoPlayerBuilder};
pub use state::PlaybackStatus;
pub use surface::{AspectMode, RenderSurface};
pub use volume::{VolumeAuthority, VolumeBridge, VolumeController, VolumeState};

/// Tracing targets used by this crate.
pub mod targets {
    /// Session lifecycle and status transitions.
    pub const STATE: &str = "crossplay_media::state";
    /// Native notification handling.
    pub const RECONCILER: &str = "crossplay_media::reconciler";
    /// Timeline composition.
    pub const COMPOSER: &str = "crossplay_media::composer";
    /// Volume synchronization.
    pub const VOLUME: &str = "crossplay_media::volume";
    /// The player facade.
    pub const PLAYER: &str = "crossplay_media::player";
}
