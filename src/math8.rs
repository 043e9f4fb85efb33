/// Scale an 8-bit value by a factor (0-255 = 0.0-1.0)
///
/// Uses integer math so it stays cheap on the light update path.
#[inline]
#[allow(clippy::cast_lossless)]
pub const fn scale8(value: u8, scale: u8) -> u8 {
    ((value as u16 * (1 + scale as u16)) >> 8) as u8
}

/// Linear interpolation between two 8-bit values by a ratio.
///
/// The step is truncated toward zero, so `ratio = 0.5` between 255 and 0
/// yields 128 and between 0 and 255 yields 127. Ratios outside `0.0..=1.0`
/// are clamped.
#[inline]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless
)]
pub fn lerp8(a: u8, b: u8, ratio: f32) -> u8 {
    let ratio = ratio.clamp(0.0, 1.0);
    let delta = f32::from(b) - f32::from(a);
    let step = (delta * ratio) as i16;
    (a as i16 + step).clamp(0, 255) as u8
}
