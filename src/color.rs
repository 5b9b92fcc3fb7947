//! Colors and color arguments.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::Error;

/// Named colors accepted on the command line.
pub(crate) const PALETTE: [(&str, Rgb); 10] = [
    ("blue", Rgb::new(0x00, 0x53, 0xf7)),
    ("cyan", Rgb::new(0x01, 0x4f, 0xfe)),
    ("yellow", Rgb::new(0xff, 0xf9, 0x4d)),
    ("magenta", Rgb::new(0xf7, 0x00, 0x93)),
    ("red", Rgb::new(0xff, 0x00, 0x00)),
    ("green", Rgb::new(0x00, 0xff, 0x00)),
    ("pure-blue", Rgb::new(0x00, 0x00, 0xff)),
    ("white", Rgb::new(0xff, 0xff, 0xff)),
    ("olive", Rgb::new(0x80, 0x80, 0x00)),
    ("teal", Rgb::new(0x00, 0x80, 0x80)),
];

/// RGB color.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub(crate) struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Look up a palette color by name, ignoring case.
    pub fn named(name: &str) -> Result<Self, Error> {
        PALETTE
            .iter()
            .find(|(palette_name, _)| palette_name.eq_ignore_ascii_case(name))
            .map(|(_, rgb)| *rgb)
            .ok_or_else(|| Error::UnknownColor(name.into()))
    }

    /// Channels in wire order.
    pub const fn to_bytes(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Parse `0xRRGGBB` or `#RRGGBB`.
    fn from_hex(s: &str) -> Option<Self> {
        let chars = s.strip_prefix("0x").or_else(|| s.strip_prefix('#'))?;
        if chars.len() != 6 {
            return None;
        }

        let mut color = u32::from_str_radix(chars, 16).ok()?;
        let b = (color & 0xff) as u8;
        color >>= 8;
        let g = (color & 0xff) as u8;
        color >>= 8;
        let r = color as u8;
        Some(Rgb { r, g, b })
    }

    /// Parse `R,G,B` decimal channels, clamping each to `0..=255`.
    fn from_triplet(s: &str) -> Option<Self> {
        let mut channels = s.split(',').map(|channel| channel.trim().parse::<i64>().ok());
        let r = channels.next()??;
        let g = channels.next()??;
        let b = channels.next()??;
        if channels.next().is_some() {
            return None;
        }

        let clamp = |channel: i64| channel.clamp(0, u8::MAX as i64) as u8;
        Some(Rgb { r: clamp(r), g: clamp(g), b: clamp(b) })
    }
}

impl Display for Rgb {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Color as given on the command line, before palette lookup.
#[derive(PartialEq, Eq, Debug, Clone)]
pub(crate) enum ColorArg {
    Named(String),
    Literal(Rgb),
}

impl ColorArg {
    /// Resolve into a concrete color.
    pub fn resolve(&self) -> Result<Rgb, Error> {
        match self {
            Self::Named(name) => Rgb::named(name),
            Self::Literal(rgb) => Ok(*rgb),
        }
    }
}

impl FromStr for ColorArg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let s = s.trim();

        if let Some(rgb) = Rgb::from_hex(s).or_else(|| Rgb::from_triplet(s)) {
            return Ok(Self::Literal(rgb));
        }

        // Anything that could not be a palette name is a malformed literal.
        let is_name = s.starts_with(|c: char| c.is_ascii_alphabetic())
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if is_name {
            Ok(Self::Named(s.to_ascii_lowercase()))
        } else {
            Err(Error::InvalidColor(s.into()))
        }
    }
}

impl Display for ColorArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::Literal(rgb) => write!(f, "{rgb}"),
        }
    }
}
