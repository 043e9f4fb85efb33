//! Color correction filter
//!
//! Applies multiplicative color correction to each RGB channel.
//! Used to balance lights whose LEDs are not equally bright per channel.

use super::Filter;
use crate::color::Rgb;
use crate::math8::scale8;

/// Color correction profile
///
/// Applies per-channel multiplicative scaling to correct color output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorCorrection {
    /// Correction factors for each channel (0-255 = 0%-100%)
    factors: Rgb,
}

impl ColorCorrection {
    /// Create a new color correction from color
    pub const fn new(factors: Rgb) -> Self {
        Self { factors }
    }

    /// Check if correction is active
    pub const fn is_active(self) -> bool {
        self.factors.r != 255 || self.factors.g != 255 || self.factors.b != 255
    }
}

impl Filter for ColorCorrection {
    fn apply(&self, color: Rgb) -> Rgb {
        if !self.is_active() {
            return color;
        }

        Rgb {
            r: scale8(color.r, self.factors.r),
            g: scale8(color.g, self.factors.g),
            b: scale8(color.b, self.factors.b),
        }
    }
}
