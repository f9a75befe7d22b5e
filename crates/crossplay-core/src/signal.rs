//! Signal/slot notifications for crossplay.
//!
//! A [`Signal<Args>`] keeps a set of connected slots (closures) and invokes
//! every one of them, in connection order, each time the signal is emitted.
//! Slots run synchronously on the emitting thread. Components that need
//! ordering guarantees (the media player, for instance) emit only from their
//! own dispatch thread, so their subscribers observe one consistent sequence.
//!
//! # Example
//!
//! ```
//! use crossplay_core::Signal;
//!
//! let status_changed = Signal::<String>::new();
//!
//! let id = status_changed.connect(|status| {
//!     println!("status is now {status}");
//! });
//!
//! status_changed.emit("Playing".to_string());
//! status_changed.disconnect(id);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// Identifies one signal-slot connection.
    ///
    /// Returned by [`Signal::connect`] and accepted by [`Signal::disconnect`].
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// A type-safe signal with any number of connected slots.
///
/// `Signal<Args>` is `Send + Sync`. Slots are cloned out of the connection
/// table before they run, so a slot may connect or disconnect slots on the
/// same signal without deadlocking.
pub struct Signal<Args> {
    connections: Mutex<SlotMap<ConnectionId, Slot<Args>>>,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Connect a slot to this signal.
    ///
    /// Returns a `ConnectionId` that can later be passed to
    /// [`disconnect`](Self::disconnect).
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connections.lock().insert(Arc::new(slot))
    }

    /// Disconnect a slot by its connection ID.
    ///
    /// Returns `true` if the connection existed.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Disconnect every slot.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Emit the signal, invoking every connected slot with `args`.
    ///
    /// Returns the number of slots invoked.
    #[tracing::instrument(skip_all, target = "crossplay_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) -> usize {
        // Snapshot so slots can touch this signal's connections while running.
        let slots: Vec<Slot<Args>> = self.connections.lock().values().cloned().collect();
        tracing::trace!(target: "crossplay_core::signal", connection_count = slots.len(), "emitting signal");

        for slot in &slots {
            slot(&args);
        }
        slots.len()
    }
}
