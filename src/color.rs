use std::{collections::BTreeMap, fmt::Write};

use hex::FromHex;
use serde::{de, Deserialize, Deserializer, Serializer};
use thiserror::Error;

use crate::models::Color;

pub const BLACK: Color = Color::new(0, 0, 0);
pub const WHITE: Color = Color::new(255, 255, 255);

#[derive(Debug, Error)]
pub enum ParseColorError {
    #[error("expected a #RRGGBB color, got '{0}'")]
    Format(String),
    #[error("invalid hex digits: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Parses `#RRGGBB` (the leading `#` is optional)
pub fn parse_hex(s: &str) -> Result<Color, ParseColorError> {
    let digits = s.trim().trim_start_matches('#');
    if digits.len() != 6 {
        return Err(ParseColorError::Format(s.to_owned()));
    }

    let [r, g, b] = <[u8; 3]>::from_hex(digits)?;
    Ok(Color::new(r, g, b))
}

pub fn to_hex(color: Color) -> String {
    format!("#{:02X}{:02X}{:02X}", color.red, color.green, color.blue)
}

/// Scales every channel by `factor`, truncating like the LED driver does
pub fn scale(color: Color, factor: f32) -> Color {
    let factor = factor.clamp(0.0, 1.0);
    let channel = |c: u8| (c as f32 * factor) as u8;
    Color::new(
        channel(color.red),
        channel(color.green),
        channel(color.blue),
    )
}

pub fn is_black(color: Color) -> bool {
    color == BLACK
}

pub fn write_ansi_truecolor(buf: &mut String, colors: impl Iterator<Item = Color>) {
    for led in colors {
        // ok: writing to a String never fails
        write!(
            buf,
            "\x1B[38;2;{red};{green};{blue}m█",
            red = led.red,
            green = led.green,
            blue = led.blue
        )
        .ok();
    }

    buf.push_str("\x1B[0m");
}

pub fn serialize_hex<S: Serializer>(color: &Color, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&to_hex(*color))
}

pub fn deserialize_hex<'de, D: Deserializer<'de>>(d: D) -> Result<Color, D::Error> {
    let s = String::deserialize(d)?;
    parse_hex(&s).map_err(de::Error::custom)
}

pub fn serialize_optional_hex<S: Serializer>(
    color: &Option<Color>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match color {
        Some(color) => serialize_hex(color, s),
        None => s.serialize_none(),
    }
}

pub fn deserialize_optional_hex<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<Color>, D::Error> {
    Option::<String>::deserialize(d)?
        .map(|s| parse_hex(&s).map_err(de::Error::custom))
        .transpose()
}

pub fn serialize_palette<S: Serializer>(
    palette: &BTreeMap<String, Color>,
    s: S,
) -> Result<S::Ok, S::Error> {
    s.collect_map(palette.iter().map(|(name, color)| (name, to_hex(*color))))
}

pub fn deserialize_palette<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<BTreeMap<String, Color>, D::Error> {
    BTreeMap::<String, String>::deserialize(d)?
        .into_iter()
        .map(|(name, s)| {
            parse_hex(&s)
                .map(|color| (name, color))
                .map_err(de::Error::custom)
        })
        .collect()
}
