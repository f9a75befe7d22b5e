//! Error types for the media crate.

use thiserror::Error;

use crossplay_core::CoreError;

use crate::backend::{NativeError, SurfaceKind};

/// Errors raised by media playback.
///
/// Most of these never reach the caller as a `Result`: playback failures are
/// delivered asynchronously through the player's `media_failed` signal. Only
/// surface attachment, configuration and calls made after shutdown fail
/// synchronously.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    /// The primary media URL did not resolve to an asset.
    #[error("unable to resolve media asset: {url}")]
    Resolution { url: String },

    /// No playable track could be placed in the composed timeline.
    #[error("composition failed: {0}")]
    Composition(String),

    /// The native engine reported a playback failure.
    #[error("{0}")]
    Engine(NativeError),

    /// The native engine could not be constructed.
    #[error("native engine unavailable: {0}")]
    EngineUnavailable(NativeError),

    /// The render surface is not the kind the engine draws into.
    #[error("invalid render surface: expected {expected}, found {found}")]
    InvalidSurface {
        expected: SurfaceKind,
        found: SurfaceKind,
    },

    /// The render surface was disposed before it could be attached.
    #[error("render surface has been disposed")]
    SurfaceDisposed,

    /// The player has been shut down.
    #[error("player has been shut down")]
    QueueStopped,

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// One of the player's threads could not be started.
    #[error("failed to start player thread: {0}")]
    Spawn(String),
}

impl From<CoreError> for MediaError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::QueueStopped | CoreError::QueueDisconnected => Self::QueueStopped,
            CoreError::SpawnFailed(msg) => Self::Spawn(msg),
        }
    }
}

impl From<toml::de::Error> for MediaError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// A specialized Result type for media operations.
pub type Result<T> = std::result::Result<T, MediaError>;
