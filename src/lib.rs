#![no_std]

//! Light output core for pinball machines.
//!
//! Every [`LightState`] owns a priority stack of color commands issued by
//! modes, shows and scripts, and evaluates the effective color and fade at any
//! point in time. A [`BatchScheduler`] shared by all lights of one hardware
//! channel collects lights whose output changed, groups hardware-sequential
//! lights with a common fade into batches, and hands them to a
//! [`HardwareChannel`].
//!
//! The crate targets a single cooperative executor: lights and schedulers are
//! shared by reference and mutate their state inside critical sections, and
//! no borrow is held across an `.await`. Code moving lights between threads
//! has to keep each scheduler and its lights confined to one task.

use core::fmt;

use embassy_time::Duration;

pub mod batch_scheduler;
pub mod color;
pub mod error;
pub mod fade;
pub mod filter;
pub mod light;
pub mod math8;
pub mod shared;
pub mod stack;
pub mod time;

pub use batch_scheduler::{BatchScheduler, BatchSchedulerConfig, FlushReport, LightSource};
pub use error::{Error, FlushError, Result};
pub use fade::FadeStep;
pub use filter::{FilterConfig, OutputFilter};
pub use light::{ChannelConfig, ChannelExtractor, ColorChannel, LightConfig, LightState};
pub use stack::{LightStack, StackEntry, StackKey};
pub use time::{Clock, ManualClock, SystemClock};

pub use color::Rgb;
pub use embassy_time::Instant;

/// Address of one hardware output channel
///
/// Ordering follows the hardware sequence: chain first, then index within the
/// chain. Physically adjacent outputs therefore sort next to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LightRef {
    /// Board, bus or serial chain the output sits on
    pub chain: u16,
    /// Position of the output within the chain
    pub index: u16,
}

impl LightRef {
    pub const fn new(chain: u16, index: u16) -> Self {
        Self { chain, index }
    }

    /// Check if `self` directly follows `prev` on the same chain
    pub const fn is_successor_of(self, prev: LightRef) -> bool {
        self.chain == prev.chain && prev.index < u16::MAX && self.index == prev.index + 1
    }
}

impl fmt::Display for LightRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.chain, self.index)
    }
}

/// One output update inside a hardware batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchEntry {
    pub light: LightRef,
    /// Target brightness (0-255)
    pub brightness: u8,
    /// Fade to reach `brightness`, shared by the whole batch
    pub fade: Duration,
}

/// Abstract light hardware channel
///
/// Implement this trait for each platform link (serial board, network
/// bridge...). Wire encoding, framing and reconnects are the implementor's
/// job.
pub trait HardwareChannel {
    /// Link failure reported by [`HardwareChannel::send_batch`]
    type Error;

    /// Check if `next` can share one message with `prev` placed before it
    fn is_successor(&self, prev: LightRef, next: LightRef) -> bool {
        next.is_successor_of(prev)
    }

    /// Write one batch of sequential outputs with a common fade
    fn send_batch(&mut self, batch: &[BatchEntry]) -> core::result::Result<(), Self::Error>;
}
