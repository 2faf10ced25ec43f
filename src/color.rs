//! Color utility functions shared across the crate.
//!
//! Parsing of user-configured hex colors and conversion between the
//! normalized float colors used by paints and 8-bit channel values.

use crate::annotation::Rgba;

/// Parse a hex color string into an [`Rgba`].
///
/// Accepts `#RRGGBB` and `#RRGGBBAA`, with or without the leading `#`.
/// Returns `None` for any other length or non-hex characters.
pub fn parse_hex_color(input: &str) -> Option<Rgba> {
    let hex = input.strip_prefix('#').unwrap_or(input);

    let channel = |i: usize| -> Option<f32> {
        let byte = u8::from_str_radix(hex.get(i..i + 2)?, 16).ok()?;
        Some(byte as f32 / 255.0)
    };

    match hex.len() {
        6 => Some(Rgba {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: 1.0,
        }),
        8 => Some(Rgba {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: channel(6)?,
        }),
        _ => None,
    }
}
