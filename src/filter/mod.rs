//! Output filters applied between a light's evaluated color and its hardware
//! channels.

use crate::color::Rgb;

mod brightness;
mod color_correction;

pub use brightness::BrightnessFactor;
pub use color_correction::ColorCorrection;

pub(crate) trait Filter {
    /// Apply the filter to one color
    fn apply(&self, color: Rgb) -> Rgb;
}

#[derive(Debug, Clone, Copy)]
pub struct FilterConfig {
    /// Machine-wide brightness factor (0-255 = 0.0-1.0)
    pub brightness: u8,
    /// Per-channel color correction profile
    pub color_correction: Rgb,
}

impl FilterConfig {
    /// Filters that pass colors through unchanged.
    pub const IDENTITY: Self = Self {
        brightness: 255,
        color_correction: Rgb {
            r: 255,
            g: 255,
            b: 255,
        },
    };
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Output processor for one light
///
/// Brightness is applied before color correction, so the correction profile
/// always sees the dimmed color.
#[derive(Debug, Clone, Copy)]
pub struct OutputFilter {
    brightness: BrightnessFactor,
    color_correction: ColorCorrection,
}

impl OutputFilter {
    pub const fn new(config: &FilterConfig) -> Self {
        Self {
            brightness: BrightnessFactor::new(config.brightness),
            color_correction: ColorCorrection::new(config.color_correction),
        }
    }

    /// Apply all filters to an evaluated color
    pub fn apply(&self, color: Rgb) -> Rgb {
        self.color_correction.apply(self.brightness.apply(color))
    }
}

impl Default for OutputFilter {
    fn default() -> Self {
        Self::new(&FilterConfig::IDENTITY)
    }
}
