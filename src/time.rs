//! Monotonic clock abstraction and fade timing helpers.

use core::cell::Cell;

use critical_section::Mutex;
use embassy_time::{Duration, Instant};

/// Zero-length duration.
pub const NO_FADE: Duration = Duration::from_millis(0);

/// Source of monotonic time for lights and schedulers.
pub trait Clock {
    /// Current time.
    fn now(&self) -> Instant;
}

/// Clock backed by the `embassy-time` driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for simulation and tests.
pub struct ManualClock {
    now: Mutex<Cell<Instant>>,
}

impl ManualClock {
    /// Create a clock starting at `start`.
    pub const fn new(start: Instant) -> Self {
        Self {
            now: Mutex::new(Cell::new(start)),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: Instant) {
        critical_section::with(|cs| self.now.borrow(cs).set(now));
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        critical_section::with(|cs| {
            let cell = self.now.borrow(cs);
            cell.set(cell.get() + by);
        });
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Instant::from_millis(0))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        critical_section::with(|cs| self.now.borrow(cs).get())
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Time between `earlier` and `later`, zero if `later` is not after `earlier`.
#[inline]
pub fn elapsed_between(earlier: Instant, later: Instant) -> Duration {
    later.checked_duration_since(earlier).unwrap_or(NO_FADE)
}

/// Round a duration up to whole milliseconds.
#[inline]
pub fn ceil_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_micros().div_ceil(1000))
}

/// Progress of `at` through the span `start..end` as a ratio.
///
/// A zero-length span counts as complete.
#[allow(clippy::cast_precision_loss)]
pub fn progress_ratio(start: Instant, end: Instant, at: Instant) -> f32 {
    let span = elapsed_between(start, end).as_micros();
    if span == 0 {
        return 1.0;
    }
    elapsed_between(start, at).as_micros() as f32 / span as f32
}
