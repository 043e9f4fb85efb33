//! Interior-mutable state for single-owner cooperative code.
//!
//! Lights and schedulers are driven from one executor, so every public method
//! takes `&self` and mutates its state through a [`Shared`] cell built on
//! `critical-section`. A borrow never outlives the closure passed to
//! [`Shared::with`], which keeps borrows from spanning an `.await` point or a
//! call into another component.

use core::cell::RefCell;

use critical_section::Mutex;

/// A value guarded by a critical section.
pub struct Shared<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> Shared<T> {
    /// Wrap a value.
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive access to the value.
    ///
    /// Must not be re-entered for the same cell from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| {
            let mut value = self.inner.borrow(cs).borrow_mut();
            f(&mut value)
        })
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
