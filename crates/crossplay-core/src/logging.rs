//! Logging facilities for crossplay.
//!
//! crossplay is instrumented with the `tracing` crate and never installs a
//! subscriber itself. Applications pick one:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("crossplay_media=debug,crossplay_core=info")
//!     .init();
//! ```
//!
//! Every log line carries one of the [`targets`] below so individual
//! subsystems can be filtered independently.

/// Target names for log filtering.
pub mod targets {
    /// Core primitives.
    pub const CORE: &str = "crossplay_core";
    /// Signal emission.
    pub const SIGNAL: &str = "crossplay_core::signal";
    /// Serial dispatch queues.
    pub const DISPATCH: &str = "crossplay_core::dispatch";
    /// Timing spans created by [`PerfSpan`](super::PerfSpan).
    pub const PERF: &str = "crossplay::perf";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// Subscribers that record span timings get the duration of the guarded
/// operation for free.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Enter a span named after `operation`.
    pub fn new(operation: &'static str) -> Self {
        let span = tracing::info_span!(target: "crossplay::perf", "perf", operation);
        Self {
            span: span.entered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_span() {
        let span = PerfSpan::new("test_operation");
        drop(span);
    }

    #[test]
    fn test_targets_are_namespaced() {
        for target in [targets::SIGNAL, targets::DISPATCH] {
            assert!(target.starts_with(targets::CORE));
        }
    }
}
