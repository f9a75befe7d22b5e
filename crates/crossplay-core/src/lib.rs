//! Core primitives for crossplay.
//!
//! - **Signal/Slot System**: [`Signal`] delivers typed notifications to any
//!   number of connected closures.
//! - **Property System**: [`Property`] stores a value and reports whether a
//!   write changed it.
//! - **Dispatch Queues**: [`SerialQueue`] runs closures one at a time on a
//!   dedicated thread, in submission order.
//! - **Logging**: target names and [`PerfSpan`] for `tracing` integration.
//!
//! # Example
//!
//! ```
//! use crossplay_core::{Property, SerialQueue, Signal};
//! use std::sync::Arc;
//!
//! struct Counter {
//!     value: Property<i32>,
//!     value_changed: Signal<i32>,
//! }
//!
//! let counter = Arc::new(Counter {
//!     value: Property::new(0),
//!     value_changed: Signal::new(),
//! });
//! counter.value_changed.connect(|v| println!("value is {v}"));
//!
//! let queue = SerialQueue::new("counter").unwrap();
//! let c = counter.clone();
//! queue.submit_sync(move || {
//!     let next = c.value.get() + 1;
//!     if c.value.set(next) {
//!         c.value_changed.emit(next);
//!     }
//! }).unwrap();
//! queue.stop_and_join();
//! ```

pub mod dispatch;
mod error;
pub mod logging;
pub mod property;
pub mod signal;

pub use dispatch::{SerialQueue, SerialQueueBuilder, SerialQueueConfig};
pub use error::{CoreError, Result};
pub use logging::PerfSpan;
pub use property::Property;
pub use signal::{ConnectionId, Signal};
