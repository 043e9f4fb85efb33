use super::Rgb;
use super::utils::rgb_from_u32;

pub const OFF: Rgb = rgb_from_u32(0x00_0000);
pub const WHITE: Rgb = rgb_from_u32(0xFF_FFFF);
pub const RED: Rgb = rgb_from_u32(0xFF_0000);
pub const GREEN: Rgb = rgb_from_u32(0x00_8000);
pub const BLUE: Rgb = rgb_from_u32(0x00_00FF);

const NAMED_COLORS: [(&str, u32); 15] = [
    ("off", 0x00_0000),
    ("black", 0x00_0000),
    ("white", 0xFF_FFFF),
    ("red", 0xFF_0000),
    ("green", 0x00_8000),
    ("lime", 0x00_FF00),
    ("blue", 0x00_00FF),
    ("yellow", 0xFF_FF00),
    ("cyan", 0x00_FFFF),
    ("magenta", 0xFF_00FF),
    ("orange", 0xFF_A500),
    ("purple", 0x80_0080),
    ("pink", 0xFF_C0CB),
    ("gold", 0xFF_D700),
    ("aqua", 0x00_FFFF),
];

/// Look up a web color name (ASCII case-insensitive).
pub fn named_color(name: &str) -> Option<Rgb> {
    NAMED_COLORS
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|&(_, value)| rgb_from_u32(value))
}

/// Parse a color string as used by shows and config players.
///
/// Accepts a color name (`"red"`) or six hex digits with an optional `#`
/// (`"#ff8000"`), optionally followed by `%` and a brightness percentage
/// (`"white%50"`).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_color(value: &str) -> Option<Rgb> {
    let (value, percent) = match value.split_once('%') {
        Some((value, percent)) => (value, Some(percent.parse::<u16>().ok()?)),
        None => (value, None),
    };

    let color = named_color(value).or_else(|| parse_hex(value))?;
    let Some(percent) = percent else {
        return Some(color);
    };

    let apply = |channel: u8| (u32::from(channel) * u32::from(percent) / 100).min(255) as u8;
    Some(Rgb {
        r: apply(color.r),
        g: apply(color.g),
        b: apply(color.b),
    })
}

fn parse_hex(value: &str) -> Option<Rgb> {
    let digits = value.strip_prefix('#').unwrap_or(value);
    if digits.len() != 6 || !digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok().map(rgb_from_u32)
}
