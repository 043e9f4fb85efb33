//! Global brightness factor
//!
//! Dims every light of the machine by the same factor before the values
//! reach hardware.

use super::Filter;
use crate::color::{Rgb, scale_color};

/// Brightness scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrightnessFactor {
    /// Scale factor (0-255 = 0.0-1.0)
    scale: u8,
}

impl BrightnessFactor {
    pub const fn new(scale: u8) -> Self {
        Self { scale }
    }

    /// Check if the factor changes anything
    pub const fn is_active(self) -> bool {
        self.scale != 255
    }
}

impl Filter for BrightnessFactor {
    fn apply(&self, color: Rgb) -> Rgb {
        if !self.is_active() {
            return color;
        }
        scale_color(color, self.scale)
    }
}
