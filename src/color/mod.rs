mod named;
mod utils;

use smart_leds::RGB8;

pub use named::{BLUE, GREEN, OFF, RED, WHITE, named_color, parse_color};
pub use utils::{blend_ratio, rgb_from_u32, scale_color};

pub type Rgb = RGB8;
