//! Fade evaluation over a light stack.
//!
//! The evaluator answers "what should this light show now, and for how much
//! longer (bounded by `max_fade`) will it keep changing?". Bounding the query
//! lets a caller ask what to send for the next hardware message without
//! knowing when the fade really ends.

use embassy_time::{Duration, Instant};

use crate::color::{OFF, Rgb, blend_ratio};
use crate::stack::StackEntry;
use crate::time::{NO_FADE, ceil_millis, elapsed_between, progress_ratio};

/// Value to output together with the fade that reaches it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeStep<T> {
    /// Value the output should reach at the end of `fade`
    pub value: T,
    /// Time to reach `value`; zero means set it immediately
    pub fade: Duration,
    /// `false` if the value keeps changing after `fade` elapsed
    pub done: bool,
}

impl<T> FadeStep<T> {
    /// A value that is not fading
    pub const fn settled(value: T) -> Self {
        Self {
            value,
            fade: NO_FADE,
            done: true,
        }
    }

    /// Transform the value, keeping the timing
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FadeStep<U> {
        FadeStep {
            value: f(self.value),
            fade: self.fade,
            done: self.done,
        }
    }
}

/// Evaluate a stack (or a suffix of one) at `now`.
///
/// Entries are visited top to bottom. Transparent fade-outs that are still
/// running are stacked on top of the first opaque entry below them and
/// resolved from the bottom up.
pub fn evaluate(stack: &[StackEntry], max_fade: Duration, now: Instant) -> FadeStep<Rgb> {
    let split = stack
        .iter()
        .position(|entry| !entry.is_transparent())
        .unwrap_or(stack.len());
    let (transparent, rest) = stack.split_at(split);

    let mut step = match rest.first() {
        Some(entry) => evaluate_opaque(entry, max_fade, now),
        None => FadeStep::settled(OFF),
    };

    for entry in transparent.iter().rev() {
        debug_assert!(
            entry.dest_time.is_some(),
            "transparent stack entry without a fade"
        );
        let Some(dest_time) = entry.dest_time else {
            continue;
        };
        if now >= dest_time {
            // fully faded out, the layer below shows through
            continue;
        }

        let window = if step.fade > NO_FADE {
            step.fade
        } else {
            max_fade
        };
        step = fade_toward(entry, step, dest_time, window, now);
    }

    step
}

fn evaluate_opaque(entry: &StackEntry, max_fade: Duration, now: Instant) -> FadeStep<Rgb> {
    let dest_color = entry.dest_color.unwrap_or(OFF);
    let Some(dest_time) = entry.dest_time else {
        return FadeStep::settled(dest_color);
    };
    if now >= dest_time {
        return FadeStep::settled(dest_color);
    }
    fade_toward(entry, FadeStep::settled(dest_color), dest_time, max_fade, now)
}

/// Step of `entry`'s fade toward `dest` within `window`.
fn fade_toward(
    entry: &StackEntry,
    dest: FadeStep<Rgb>,
    dest_time: Instant,
    window: Duration,
    now: Instant,
) -> FadeStep<Rgb> {
    let target_time = now + window;

    if target_time > dest_time {
        // the fade completes inside this window
        if !dest.done {
            return FadeStep {
                value: dest.value,
                fade: window,
                done: false,
            };
        }
        return FadeStep {
            value: dest.value,
            fade: ceil_millis(elapsed_between(now, dest_time)).max(dest.fade),
            done: true,
        };
    }

    debug_assert!(entry.start_color.is_some(), "fading stack entry without a start");
    let start_color = entry.start_color.unwrap_or(dest.value);
    let ratio = progress_ratio(entry.start_time, dest_time, target_time);

    FadeStep {
        value: blend_ratio(start_color, dest.value, ratio),
        fade: window,
        done: false,
    }
}
