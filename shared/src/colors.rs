use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::metric::MetricRange;

pub const DEFAULT_START_COLOR: Rgb = Rgb::new(0xd4, 0xf9, 0xd0);
pub const DEFAULT_END_COLOR: Rgb = Rgb::new(0x27, 0xe7, 0xb8);
/// Neutral fill for regions without a usable value. Never part of a gradient.
pub const NO_DATA_COLOR: Rgb = Rgb::new(0xd3, 0xd3, 0xd3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseColorError {
    #[error("color `{0}` must have 3 or 6 hex digits")]
    Length(String),
    #[error("color `{0}` contains a non-hex digit")]
    Digit(String),
}

impl FromStr for Rgb {
    type Err = ParseColorError;

    /// Accepts `#rrggbb` or `#rgb`, with or without the leading `#`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseColorError::Digit(raw.to_owned()));
        }
        let digit = |s: &str| {
            u8::from_str_radix(s, 16).map_err(|_| ParseColorError::Digit(raw.to_owned()))
        };
        match hex.len() {
            6 => Ok(Rgb::new(digit(&hex[0..2])?, digit(&hex[2..4])?, digit(&hex[4..6])?)),
            3 => {
                let r = digit(&hex[0..1])?;
                let g = digit(&hex[1..2])?;
                let b = digit(&hex[2..3])?;
                Ok(Rgb::new(r * 17, g * 17, b * 17))
            }
            _ => Err(ParseColorError::Length(raw.to_owned())),
        }
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Two-point gradient. There are no intermediate stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorStops {
    pub start_color: Rgb,
    pub end_color: Rgb,
}

impl Default for ColorStops {
    fn default() -> Self {
        Self {
            start_color: DEFAULT_START_COLOR,
            end_color: DEFAULT_END_COLOR,
        }
    }
}

impl ColorStops {
    pub fn new(start_color: Rgb, end_color: Rgb) -> Self {
        Self {
            start_color,
            end_color,
        }
    }

    /// Color at position `t` along the gradient, `t` clamped to `[0, 1]`.
    pub fn at(&self, t: f64) -> Rgb {
        let (a, b) = (self.start_color, self.end_color);
        Rgb::new(lerp_u8(a.r, b.r, t), lerp_u8(a.g, b.g, t), lerp_u8(a.b, b.b, t))
    }

    pub fn midpoint(&self) -> Rgb {
        self.at(0.5)
    }
}

fn lerp_u8(a: u8, b: u8, t: f64) -> u8 {
    let t = t.clamp(0.0, 1.0);
    let value = a as f64 + (b as f64 - a as f64) * t;
    value.round().clamp(0.0, 255.0) as u8
}

/// Fill for a single region: a gradient color or the no-data sentinel.
///
/// Serializes as a hex string, or `null` for no data, so renderers cannot
/// mistake the sentinel for an endpoint color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionColor {
    Gradient(Rgb),
    NoData,
}

impl RegionColor {
    pub fn is_no_data(&self) -> bool {
        matches!(self, RegionColor::NoData)
    }

    pub fn gradient(&self) -> Option<Rgb> {
        match self {
            RegionColor::Gradient(color) => Some(*color),
            RegionColor::NoData => None,
        }
    }

    /// Color to actually paint, substituting the neutral fill for no data.
    pub fn display_color(&self) -> Rgb {
        self.gradient().unwrap_or(NO_DATA_COLOR)
    }
}

impl Serialize for RegionColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.gradient().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RegionColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<Rgb>::deserialize(deserializer)?
            .map(RegionColor::Gradient)
            .unwrap_or(RegionColor::NoData))
    }
}

/// Maps a metric value onto the gradient.
///
/// Pure: the same `(value, range, stops)` always yields the same color.
pub fn color_for(
    value: Option<f64>,
    range: Option<MetricRange>,
    stops: &ColorStops,
) -> RegionColor {
    let (Some(value), Some(range)) = (value.filter(|v| v.is_finite()), range) else {
        return RegionColor::NoData;
    };

    if range.is_degenerate() {
        return RegionColor::Gradient(stops.midpoint());
    }

    let span = range.max - range.min;
    let t = if span.is_finite() {
        (value - range.min) / span
    } else {
        // Halved operands keep spans wider than f64::MAX finite.
        (value / 2.0 - range.min / 2.0) / (range.max / 2.0 - range.min / 2.0)
    };
    RegionColor::Gradient(stops.at(t.clamp(0.0, 1.0)))
}
