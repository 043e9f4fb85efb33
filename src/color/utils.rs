use crate::{
    color::Rgb,
    math8::{lerp8, scale8},
};

/// Linearly blend two RGB colors by a ratio (0.0 = all `start`, 1.0 = all `end`).
///
/// This is the fade interpolation used by light stacks; every channel moves
/// by the truncated fraction of its own distance.
#[inline]
pub fn blend_ratio(start: Rgb, end: Rgb, ratio: f32) -> Rgb {
    Rgb {
        r: lerp8(start.r, end.r, ratio),
        g: lerp8(start.g, end.g, ratio),
        b: lerp8(start.b, end.b, ratio),
    }
}

/// Scale every channel of a color by `brightness` (0-255 = 0.0-1.0)
#[inline]
pub fn scale_color(color: Rgb, brightness: u8) -> Rgb {
    if brightness == 255 {
        return color;
    }
    Rgb {
        r: scale8(color.r, brightness),
        g: scale8(color.g, brightness),
        b: scale8(color.b, brightness),
    }
}

/// Create an RGB color from a u32 value (0xRRGGBB format)
pub const fn rgb_from_u32(color: u32) -> Rgb {
    Rgb {
        r: ((color >> 16) & 0xFF) as u8,
        g: ((color >> 8) & 0xFF) as u8,
        b: (color & 0xFF) as u8,
    }
}
