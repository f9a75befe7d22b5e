//! Error types for crossplay-core.

use std::fmt;

/// Errors raised by the core primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The dispatch queue has been stopped and accepts no more work.
    QueueStopped,
    /// The dispatch queue's thread exited before delivering a result.
    QueueDisconnected,
    /// The operating system refused to spawn a queue thread.
    SpawnFailed(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueStopped => write!(f, "Dispatch queue has been stopped"),
            Self::QueueDisconnected => {
                write!(f, "Dispatch queue thread exited before completing the task")
            }
            Self::SpawnFailed(msg) => write!(f, "Failed to spawn dispatch thread: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}

/// A specialized Result type for crossplay-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
