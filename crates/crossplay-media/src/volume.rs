//! Volume and mute mirroring between a volume authority and the engine.
//!
//! The application owns the canonical volume through a [`VolumeAuthority`];
//! the engine merely mirrors it. A [`VolumeBridge`] does the mirroring:
//!
//! - when first attached, it copies the engine's current volume into the
//!   authority once, silently;
//! - afterwards, every `volume_changed` emission is copied onto the engine.
//!
//! The bridge never writes back into the authority after the initial sync, so
//! a change cannot echo between the two sides.

use std::sync::{Arc, Weak};

use crossplay_core::{ConnectionId, Property, Signal};

use crate::backend::NativeEngine;
use crate::targets::VOLUME as TARGET;

/// Volume level and mute flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeState {
    /// Linear level in `[0, 1]`.
    pub level: f32,
    pub muted: bool,
}

impl Default for VolumeState {
    fn default() -> Self {
        Self {
            level: 1.0,
            muted: false,
        }
    }
}

/// The application-side owner of the canonical volume.
pub trait VolumeAuthority: Send + Sync {
    /// Emitted whenever the canonical volume changes.
    fn volume_changed(&self) -> &Signal<VolumeState>;

    fn current(&self) -> VolumeState;

    /// Adopt the engine's volume without emitting `volume_changed`.
    fn sync_from_engine(&self, state: VolumeState);
}

/// The stock [`VolumeAuthority`].
///
/// Levels are clamped to `[0, max_volume]`. `volume_changed` fires only on an
/// actual change.
pub struct VolumeController {
    state: Property<VolumeState>,
    volume_changed: Signal<VolumeState>,
    max_volume: f32,
}

impl Default for VolumeController {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeController {
    /// Upper bound for [`set_volume`](Self::set_volume).
    pub const MAX_VOLUME: f32 = 1.0;

    pub fn new() -> Self {
        Self {
            state: Property::new(VolumeState::default()),
            volume_changed: Signal::new(),
            max_volume: Self::MAX_VOLUME,
        }
    }

    pub fn max_volume(&self) -> f32 {
        self.max_volume
    }

    pub fn volume(&self) -> f32 {
        self.state.with(|s| s.level)
    }

    pub fn is_muted(&self) -> bool {
        self.state.with(|s| s.muted)
    }

    /// Set the level, clamped to `[0, max_volume]`. NaN is treated as zero.
    pub fn set_volume(&self, level: f32) {
        let level = self.clamp(level);
        if let Some(next) = self.state.update(|s| s.level = level) {
            self.volume_changed.emit(next);
        }
    }

    pub fn set_muted(&self, muted: bool) {
        if let Some(next) = self.state.update(|s| s.muted = muted) {
            self.volume_changed.emit(next);
        }
    }

    pub fn toggle_mute(&self) {
        self.set_muted(!self.is_muted());
    }

    fn clamp(&self, level: f32) -> f32 {
        if level.is_nan() {
            0.0
        } else {
            level.clamp(0.0, self.max_volume)
        }
    }
}

impl VolumeAuthority for VolumeController {
    fn volume_changed(&self) -> &Signal<VolumeState> {
        &self.volume_changed
    }

    fn current(&self) -> VolumeState {
        self.state.get()
    }

    fn sync_from_engine(&self, state: VolumeState) {
        self.state.set_silent(VolumeState {
            level: self.clamp(state.level),
            muted: state.muted,
        });
    }
}

/// Keeps an engine's volume in step with a [`VolumeAuthority`].
///
/// Holds the engine weakly; once the engine is gone, changes are ignored.
/// Dropping the bridge disconnects it from the authority.
pub struct VolumeBridge {
    authority: Arc<dyn VolumeAuthority>,
    connection: ConnectionId,
}

impl VolumeBridge {
    /// Sync the engine's current volume into `authority`, then mirror every
    /// later authority change onto the engine.
    pub fn attach(authority: Arc<dyn VolumeAuthority>, engine: &Arc<dyn NativeEngine>) -> Self {
        let initial = VolumeState {
            level: engine.volume(),
            muted: engine.is_muted(),
        };
        authority.sync_from_engine(initial);
        tracing::debug!(
            target: TARGET,
            level = initial.level,
            muted = initial.muted,
            "volume authority synced from engine"
        );

        let weak: Weak<dyn NativeEngine> = Arc::downgrade(engine);
        let connection = authority.volume_changed().connect(move |state: &VolumeState| {
            let Some(engine) = weak.upgrade() else {
                tracing::trace!(target: TARGET, "engine gone, volume change ignored");
                return;
            };
            apply(engine.as_ref(), *state);
        });

        Self {
            authority,
            connection,
        }
    }
}

impl Drop for VolumeBridge {
    fn drop(&mut self) {
        self.authority.volume_changed().disconnect(self.connection);
    }
}

fn apply(engine: &dyn NativeEngine, state: VolumeState) {
    if engine.volume() != state.level {
        engine.set_volume(state.level);
    }
    if engine.is_muted() != state.muted {
        engine.set_muted(state.muted);
    }
    tracing::debug!(
        target: TARGET,
        level = state.level,
        muted = state.muted,
        "engine volume updated"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MediaBackend;
    use crate::backend::headless::HeadlessBackend;
    use parking_lot::Mutex;

    #[test]
    fn test_controller_clamps_and_dedupes() {
        let controller = VolumeController::new();
        let emitted = Arc::new(Mutex::new(Vec::new()));
        let emitted_clone = emitted.clone();
        controller
            .volume_changed()
            .connect(move |s| emitted_clone.lock().push(*s));

        controller.set_volume(2.0);
        controller.set_volume(1.0);
        controller.set_volume(-1.0);
        controller.set_volume(f32::NAN);
        controller.toggle_mute();

        assert_eq!(controller.volume(), 0.0);
        assert!(controller.is_muted());
        let levels: Vec<f32> = emitted.lock().iter().map(|s| s.level).collect();
        // 2.0 clamps to the unchanged 1.0; NaN maps to the unchanged 0.0.
        assert_eq!(levels, vec![0.0, 0.0]);
    }

    #[test]
    fn test_bridge_initial_sync_is_silent() {
        let backend = HeadlessBackend::new();
        backend.set_initial_volume(0.4, true);
        let engine = backend.create_engine().unwrap();

        let controller = Arc::new(VolumeController::new());
        let emissions = Arc::new(Mutex::new(0));
        let emissions_clone = emissions.clone();
        controller
            .volume_changed()
            .connect(move |_| *emissions_clone.lock() += 1);

        let _bridge = VolumeBridge::attach(controller.clone(), &engine);

        assert_eq!(controller.current(), VolumeState { level: 0.4, muted: true });
        assert_eq!(*emissions.lock(), 0);
    }

    #[test]
    fn test_bridge_mirrors_authority_changes() {
        let backend = HeadlessBackend::new();
        let engine = backend.create_engine().unwrap();
        let controller = Arc::new(VolumeController::new());
        let bridge = VolumeBridge::attach(controller.clone(), &engine);

        controller.set_volume(0.25);
        controller.set_muted(true);
        assert_eq!(engine.volume(), 0.25);
        assert!(engine.is_muted());

        drop(bridge);
        assert_eq!(controller.volume_changed().connection_count(), 0);
        controller.set_volume(0.75);
        assert_eq!(engine.volume(), 0.25);
    }

    #[test]
    fn test_bridge_survives_engine_drop() {
        let backend = HeadlessBackend::new();
        let engine = backend.create_engine().unwrap();
        let controller = Arc::new(VolumeController::new());
        let _bridge = VolumeBridge::attach(controller.clone(), &engine);

        drop(engine);
        drop(backend);
        controller.set_volume(0.5);
        assert_eq!(controller.volume(), 0.5);
    }
}
