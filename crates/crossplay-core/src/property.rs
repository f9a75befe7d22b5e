//! Reactive properties with change detection.
//!
//! A [`Property<T>`] wraps a value behind a `RwLock` and reports whether a
//! write actually changed it, so the owner can decide whether to emit a
//! notification signal.
//!
//! ```
//! use crossplay_core::{Property, Signal};
//!
//! struct Caption {
//!     url: Property<String>,
//!     url_changed: Signal<String>,
//! }
//!
//! impl Caption {
//!     fn set_url(&self, url: String) {
//!         if self.url.set(url.clone()) {
//!             self.url_changed.emit(url);
//!         }
//!     }
//! }
//! ```

use std::fmt;

use parking_lot::RwLock;

/// A value with change detection and interior mutability.
pub struct Property<T> {
    value: RwLock<T>,
}

impl<T: Clone> Property<T> {
    /// Create a property holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Clone out the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Borrow the value for the duration of `f`.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.value.read())
    }

    /// Overwrite the value without reporting a change.
    pub fn set_silent(&self, value: T) {
        *self.value.write() = value;
    }
}

impl<T: Clone + PartialEq> Property<T> {
    /// Store `value`, returning `true` if it differed from the current one.
    pub fn set(&self, value: T) -> bool {
        let mut current = self.value.write();
        if *current != value {
            *current = value;
            true
        } else {
            false
        }
    }

    /// Apply `f` to a copy of the value and store the result.
    ///
    /// Returns the new value if it differs from the old one.
    pub fn update<F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&mut T),
    {
        let mut current = self.value.write();
        let mut next = current.clone();
        f(&mut next);
        if *current != next {
            *current = next.clone();
            Some(next)
        } else {
            None
        }
    }
}

impl<T: Clone + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reports_change() {
        let prop = Property::new(1);
        assert!(!prop.set(1));
        assert!(prop.set(2));
        assert_eq!(prop.get(), 2);
    }

    #[test]
    fn test_update() {
        let prop = Property::new((0.5_f32, false));
        assert_eq!(prop.update(|v| v.1 = true), Some((0.5, true)));
        assert_eq!(prop.update(|v| v.1 = true), None);
    }

    #[test]
    fn test_set_silent() {
        let prop = Property::<u8>::default();
        prop.set_silent(9);
        assert_eq!(prop.get(), 9);
        assert!(!prop.set(9));
    }
}
