//! Turns native engine notifications into state transitions and events.

use crate::backend::{
    EngineNotification, EngineReadiness, NativeEngine, NativeError, SessionId, TimeRange,
    seconds_to_duration,
};
use crate::error::MediaError;
use crate::events::{BufferingChanged, EventBatch, MediaFinished, PlayerEvent, PlayingChanged};
use crate::state::{PlaybackStateMachine, PlaybackStatus};
use crate::targets::RECONCILER as TARGET;

/// Applies engine notifications to a [`PlaybackStateMachine`].
///
/// Runs on the player's dispatch queue with the player state locked. Every
/// notification is handled the same way each time; nothing here blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventReconciler;

impl EventReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Handle `notification`, delivered for `session`.
    ///
    /// Notifications for any session but the current one are dropped.
    pub fn handle(
        &self,
        machine: &mut PlaybackStateMachine,
        engine: &dyn NativeEngine,
        session: SessionId,
        notification: EngineNotification,
        events: &mut EventBatch,
    ) {
        if !machine.is_current(session) {
            tracing::trace!(target: TARGET, %session, ?notification, "stale notification discarded");
            return;
        }

        match notification {
            EngineNotification::StatusChanged(EngineReadiness::Ready) => {
                machine.mark_ready(engine, events);
            }
            EngineNotification::StatusChanged(EngineReadiness::Failed) => {
                let error = engine.last_error().unwrap_or_else(|| {
                    NativeError::new("crossplay", -1, "The native engine failed to load the item")
                });
                machine.fail(MediaError::Engine(error), Some(engine), events);
            }
            EngineNotification::StatusChanged(EngineReadiness::Unknown) => {}
            EngineNotification::ProgressTick => {
                events.push(PlayerEvent::Playing(playing_changed(
                    engine.position_secs(),
                    known_duration_secs(machine, engine),
                )));
            }
            EngineNotification::LoadedRangesChanged => {
                self.on_loaded_ranges(machine, engine, events);
            }
            EngineNotification::RateChanged(rate) => {
                if let Some(session) = machine.session_mut() {
                    session.set_rate(rate);
                }
            }
            EngineNotification::PlayedToEnd => {
                if let Some(session) = machine.session() {
                    tracing::debug!(target: TARGET, url = session.file().url(), "played to end");
                    events.push(PlayerEvent::Finished(MediaFinished {
                        file: session.file().clone(),
                    }));
                }
            }
            EngineNotification::Failed(error) => {
                machine.fail(MediaError::Engine(error), Some(engine), events);
            }
        }
    }

    fn on_loaded_ranges(
        &self,
        machine: &mut PlaybackStateMachine,
        engine: &dyn NativeEngine,
        events: &mut EventBatch,
    ) {
        let buffered_secs = largest_contiguous_secs(&engine.loaded_ranges());
        let buffered = seconds_to_duration(buffered_secs);
        let duration_secs = known_duration_secs(machine, engine);
        if let Some(session) = machine.session_mut() {
            session.set_buffered(buffered);
        }
        events.push(PlayerEvent::Buffering(BufferingChanged {
            fraction: fraction(buffered_secs, duration_secs),
            buffered,
        }));

        // A starved engine drops its rate to zero and does not restart itself.
        if engine.readiness() == EngineReadiness::Ready
            && engine.rate() == 0.0
            && machine.status() == PlaybackStatus::Playing
        {
            tracing::debug!(target: TARGET, "engine stalled while playing, restarting");
            engine.play();
        }
    }
}

/// The engine's duration, falling back to the session file's hint.
fn known_duration_secs(machine: &PlaybackStateMachine, engine: &dyn NativeEngine) -> f64 {
    let engine_secs = engine.duration_secs();
    machine
        .session()
        .map_or(engine_secs, |session| session.duration_secs(engine_secs))
}

fn playing_changed(position_secs: f64, duration_secs: f64) -> PlayingChanged {
    PlayingChanged {
        progress: fraction(position_secs, duration_secs),
        position: seconds_to_duration(position_secs),
        duration: seconds_to_duration(duration_secs),
    }
}

/// `part / total` in `[0, 1]`.
///
/// Zero whenever either side is NaN or infinite, or the total is not positive.
pub fn fraction(part: f64, total: f64) -> f64 {
    if !part.is_finite() || !total.is_finite() || total <= 0.0 {
        return 0.0;
    }
    (part / total).clamp(0.0, 1.0)
}

/// Merge overlapping and touching ranges, dropping invalid ones.
pub fn merge_ranges(ranges: &[TimeRange]) -> Vec<TimeRange> {
    let mut valid: Vec<TimeRange> = ranges.iter().copied().filter(TimeRange::is_valid).collect();
    valid.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<TimeRange> = Vec::with_capacity(valid.len());
    for range in valid {
        match merged.last_mut() {
            Some(last) if range.start <= last.end() => {
                let end = last.end().max(range.end());
                last.duration = end - last.start;
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Length in seconds of the longest contiguous loaded span.
pub fn largest_contiguous_secs(ranges: &[TimeRange]) -> f64 {
    merge_ranges(ranges)
        .iter()
        .map(|r| r.duration)
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::backend::MediaBackend;
    use crate::backend::headless::{HeadlessAsset, HeadlessBackend, HeadlessEngine};
    use crate::composer::{CompositionRequest, TrackComposer};
    use crate::media::{MediaFile, MediaMetadata};

    struct Fixture {
        backend: HeadlessBackend,
        machine: PlaybackStateMachine,
        session: SessionId,
    }

    impl Fixture {
        /// A machine with a session whose timeline is loaded into the engine.
        fn new(duration_secs: f64) -> Self {
            Self::with_file(duration_secs, MediaFile::video("a.mp4"))
        }

        fn with_file(duration_secs: f64, file: MediaFile) -> Self {
            let backend = HeadlessBackend::new().with_asset(HeadlessAsset::movie("a.mp4", duration_secs));
            backend.set_auto_ready(false);
            backend.create_engine().unwrap();
            let composer = TrackComposer::new(Arc::new(backend.clone()));

            let mut machine = PlaybackStateMachine::new();
            let mut events = EventBatch::new();
            let session = machine.begin_session(Arc::new(file), None, None, &mut events);
            let timeline = composer.compose(&CompositionRequest::new("a.mp4")).unwrap();
            let installed = machine.install_timeline(session, timeline).unwrap();
            backend.engine().unwrap().replace_item(Some(installed.native()));

            Self {
                backend,
                machine,
                session,
            }
        }

        fn engine(&self) -> Arc<HeadlessEngine> {
            self.backend.engine().unwrap()
        }

        fn handle(&mut self, notification: EngineNotification) -> Vec<PlayerEvent> {
            let engine = self.engine();
            let mut events = EventBatch::new();
            EventReconciler::new().handle(&mut self.machine, engine.as_ref(), self.session, notification, &mut events);
            events.into_vec()
        }
    }

    #[test]
    fn test_fraction_guards() {
        assert_eq!(fraction(5.0, 0.0), 0.0);
        assert_eq!(fraction(5.0, f64::NAN), 0.0);
        assert_eq!(fraction(f64::NAN, 10.0), 0.0);
        assert_eq!(fraction(5.0, f64::INFINITY), 0.0);
        assert_eq!(fraction(15.0, 10.0), 1.0);
        assert_eq!(fraction(-1.0, 10.0), 0.0);
        assert_eq!(fraction(2.5, 10.0), 0.25);
    }

    #[test]
    fn test_merge_ranges() {
        let merged = merge_ranges(&[
            TimeRange::new(10.0, 5.0),
            TimeRange::new(0.0, 4.0),
            TimeRange::new(4.0, 2.0),
            TimeRange::new(12.0, 8.0),
            TimeRange::new(f64::NAN, 100.0),
        ]);
        assert_eq!(merged, vec![TimeRange::new(0.0, 6.0), TimeRange::new(10.0, 10.0)]);
        assert_eq!(largest_contiguous_secs(&[]), 0.0);
        assert_eq!(
            largest_contiguous_secs(&[TimeRange::new(0.0, 3.0), TimeRange::new(3.0, 3.0)]),
            6.0
        );
    }

    #[test]
    fn test_readiness_starts_buffering_session() {
        let mut fx = Fixture::new(60.0);
        fx.engine().make_ready();
        let events = fx.handle(EngineNotification::StatusChanged(EngineReadiness::Ready));

        assert_eq!(events, vec![PlayerEvent::StatusChanged(PlaybackStatus::Playing)]);
        assert_eq!(fx.engine().play_calls(), 1);
    }

    #[test]
    fn test_progress_tick() {
        let mut fx = Fixture::new(60.0);
        fx.engine().advance_to(15.0);
        let events = fx.handle(EngineNotification::ProgressTick);

        assert_eq!(
            events,
            vec![PlayerEvent::Playing(PlayingChanged {
                progress: 0.25,
                position: Duration::from_secs(15),
                duration: Duration::from_secs(60),
            })]
        );
    }

    #[test]
    fn test_buffering_with_unknown_duration() {
        let mut fx = Fixture::new(60.0);
        fx.engine().override_duration(Some(f64::NAN));
        fx.engine().set_loaded_ranges(vec![TimeRange::new(0.0, 12.0)]);
        let events = fx.handle(EngineNotification::LoadedRangesChanged);

        assert_eq!(
            events,
            vec![PlayerEvent::Buffering(BufferingChanged {
                fraction: 0.0,
                buffered: Duration::from_secs(12),
            })]
        );
        assert_eq!(fx.machine.session().unwrap().buffered(), Duration::from_secs(12));
    }

    #[test]
    fn test_duration_hint_used_while_engine_duration_unknown() {
        let file = MediaFile::video("a.mp4").with_metadata(MediaMetadata {
            duration_hint: Some(Duration::from_secs(40)),
            ..MediaMetadata::default()
        });
        let mut fx = Fixture::with_file(60.0, file);
        fx.engine().override_duration(Some(f64::NAN));
        fx.engine().advance_to(10.0);
        fx.engine().set_loaded_ranges(vec![TimeRange::new(0.0, 20.0)]);

        assert_eq!(
            fx.handle(EngineNotification::ProgressTick),
            vec![PlayerEvent::Playing(PlayingChanged {
                progress: 0.25,
                position: Duration::from_secs(10),
                duration: Duration::from_secs(40),
            })]
        );
        assert_eq!(
            fx.handle(EngineNotification::LoadedRangesChanged),
            vec![PlayerEvent::Buffering(BufferingChanged {
                fraction: 0.5,
                buffered: Duration::from_secs(20),
            })]
        );

        // Once the engine knows, its value wins.
        fx.engine().override_duration(None);
        match fx.handle(EngineNotification::ProgressTick).as_slice() {
            [PlayerEvent::Playing(p)] => assert_eq!(p.duration, Duration::from_secs(60)),
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_stall_recovery_issues_single_play() {
        let mut fx = Fixture::new(60.0);
        fx.engine().make_ready();
        fx.handle(EngineNotification::StatusChanged(EngineReadiness::Ready));
        let before = fx.engine().play_calls();

        fx.engine().stall();
        fx.engine().set_loaded_ranges(vec![TimeRange::new(0.0, 30.0)]);
        fx.handle(EngineNotification::LoadedRangesChanged);

        assert_eq!(fx.engine().play_calls(), before + 1);
        assert_eq!(fx.engine().rate(), 1.0);

        // Rate is non-zero again: no further restarts.
        fx.handle(EngineNotification::LoadedRangesChanged);
        assert_eq!(fx.engine().play_calls(), before + 1);
    }

    #[test]
    fn test_no_stall_recovery_while_paused() {
        let mut fx = Fixture::new(60.0);
        fx.engine().make_ready();
        let mut events = EventBatch::new();
        fx.machine.pause(None, &mut events);
        fx.handle(EngineNotification::LoadedRangesChanged);
        assert_eq!(fx.engine().play_calls(), 0);
    }

    #[test]
    fn test_failure_message_and_forced_stop() {
        let mut fx = Fixture::new(60.0);
        let error = NativeError::new("AVFoundationErrorDomain", -11819, "Cannot Complete Action")
            .with_reason("Media services were reset")
            .with_recovery_suggestion("Try again later.");
        let events = fx.handle(EngineNotification::Failed(error));

        match &events[0] {
            PlayerEvent::Failed(failed) => {
                assert_eq!(
                    failed.message,
                    "Description: Cannot Complete Action\nReason: Media services were reset\nRecovery Suggestion: Try again later."
                );
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(events[1], PlayerEvent::StatusChanged(PlaybackStatus::Stopped));
        assert!(!fx.engine().has_item());
    }

    #[test]
    fn test_readiness_failure_uses_last_error() {
        let mut fx = Fixture::new(60.0);
        fx.engine().fail(NativeError::new("d", 7, "Decoder lost"));
        let events = fx.handle(EngineNotification::StatusChanged(EngineReadiness::Failed));
        assert!(matches!(
            &events[0],
            PlayerEvent::Failed(f) if f.message == "Description: Decoder lost"
        ));
    }

    #[test]
    fn test_end_of_stream_does_not_stop() {
        let mut fx = Fixture::new(60.0);
        let events = fx.handle(EngineNotification::PlayedToEnd);
        assert!(matches!(&events[..], [PlayerEvent::Finished(f)] if f.file.url() == "a.mp4"));
        assert_eq!(fx.machine.status(), PlaybackStatus::Buffering);
    }

    #[test]
    fn test_rate_change_recorded() {
        let mut fx = Fixture::new(60.0);
        assert!(fx.handle(EngineNotification::RateChanged(2.0)).is_empty());
        assert_eq!(fx.machine.session().unwrap().rate(), 2.0);
    }

    #[test]
    fn test_stale_session_ignored() {
        let mut fx = Fixture::new(60.0);
        let mut events = EventBatch::new();
        fx.machine.begin_session(Arc::new(MediaFile::video("b.mp4")), None, None, &mut events);

        let events = fx.handle(EngineNotification::Failed(NativeError::new("d", 1, "late")));
        assert!(events.is_empty());
        assert_eq!(fx.machine.status(), PlaybackStatus::Buffering);
    }
}
