use core::fmt;

use crate::LightRef;

/// A specialized result type for light composer operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised at the light and scheduler API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The stack key does not fit into [`crate::stack::KEY_CAPACITY`] bytes.
    KeyTooLong,
    /// The light stack already holds [`crate::stack::MAX_STACK_DEPTH`] entries.
    StackFull,
    /// A light was configured with more than [`crate::light::MAX_CHANNELS`] channels.
    TooManyChannels,
    /// A configuration value is out of range.
    InvalidConfig(&'static str),
    /// Two hardware channels share the same light reference.
    DuplicateLightRef(LightRef),
    /// The scheduler dirty set is at capacity.
    DirtySetFull,
    /// The scheduler wake-up schedule is at capacity.
    ScheduleFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KeyTooLong => write!(f, "stack key is too long"),
            Error::StackFull => write!(f, "light stack is full"),
            Error::TooManyChannels => write!(f, "too many channels for one light"),
            Error::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
            Error::DuplicateLightRef(light) => {
                write!(f, "light reference {} is used more than once", light)
            }
            Error::DirtySetFull => write!(f, "dirty light set is full"),
            Error::ScheduleFull => write!(f, "dirty schedule is full"),
        }
    }
}

impl core::error::Error for Error {}

/// Failure of one flush iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushError<E> {
    /// The hardware channel rejected a batch.
    Hardware(E),
    /// The scheduler ran out of capacity while rescheduling lights.
    Scheduler(Error),
}

impl<E> From<Error> for FlushError<E> {
    fn from(err: Error) -> Self {
        Self::Scheduler(err)
    }
}

impl<E: fmt::Display> fmt::Display for FlushError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushError::Hardware(err) => write!(f, "hardware channel failed: {}", err),
            FlushError::Scheduler(err) => write!(f, "scheduler failed: {}", err),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> core::error::Error for FlushError<E> {}
