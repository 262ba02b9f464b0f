//! Shared value types: rationals for frame rates and material identifiers

use crate::error::{MrxError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Rational number for frame rates and timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub numerator: i32,
    pub denominator: i32,
}

impl Rational {
    /// Create new rational
    pub fn new(numerator: i32, denominator: i32) -> Self {
        Rational { numerator, denominator }
    }

    /// Convert to f64
    pub fn to_f64(&self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }

    /// How many edit units of `self` fall in one edit unit of `base`.
    pub fn ratio_to(&self, base: Rational) -> f64 {
        let base = base.to_f64();
        if base == 0.0 {
            0.0
        } else {
            self.to_f64() / base
        }
    }

    pub fn fps_25() -> Self {
        Rational::new(25, 1)
    }

    pub fn fps_29_97() -> Self {
        Rational::new(30000, 1001)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational::new(1, 1)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for Rational {
    type Err = MrxError;

    /// Accepts `"25/1"` or a bare integer `"25"`.
    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        let parse = |part: &str| {
            part.trim()
                .parse::<i32>()
                .map_err(|_| MrxError::config(format!("invalid frame rate '{}'", text)))
        };

        let rational = match text.split_once('/') {
            Some((num, den)) => Rational::new(parse(num)?, parse(den)?),
            None => Rational::new(parse(text)?, 1),
        };
        if rational.denominator == 0 || rational.numerator <= 0 {
            return Err(MrxError::config(format!("invalid frame rate '{}'", text)));
        }
        Ok(rational)
    }
}

impl Serialize for Rational {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rational {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Edit rate (typically same as frame rate for video)
pub type EditRate = Rational;

/// Frame rate as written in stream properties: a rational, or `static` for
/// unclocked data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRate {
    /// Clocked at the given rate
    Clocked(Rational),
    /// Unclocked
    Static,
}

impl FrameRate {
    /// The rate, if clocked.
    pub fn rate(&self) -> Option<Rational> {
        match self {
            FrameRate::Clocked(rate) => Some(*rate),
            FrameRate::Static => None,
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameRate::Clocked(rate) => write!(f, "{}", rate),
            FrameRate::Static => write!(f, "static"),
        }
    }
}

impl FromStr for FrameRate {
    type Err = MrxError;

    fn from_str(text: &str) -> Result<Self> {
        if text.trim().eq_ignore_ascii_case("static") {
            Ok(FrameRate::Static)
        } else {
            text.parse().map(FrameRate::Clocked)
        }
    }
}

impl Serialize for FrameRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FrameRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// UMID (Unique Material Identifier) - 32 bytes
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Umid(pub [u8; 32]);

impl Umid {
    /// Create zero UMID
    pub fn zero() -> Self {
        Umid([0; 32])
    }

    /// Generate a new random UMID
    pub fn generate() -> Self {
        use uuid::Uuid;

        let mut bytes = [0u8; 32];

        // Universal label (SMPTE 330M), then length 0x13
        bytes[0..12].copy_from_slice(&[
            0x06, 0x0A, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x05, 0x01, 0x01, 0x0D, 0x20,
        ]);
        bytes[12] = 0x13;

        // Material number
        bytes[16..32].copy_from_slice(Uuid::new_v4().as_bytes());

        Umid(bytes)
    }

    /// Check if this is a zero UMID
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Parse the hex text form produced by `Display`.
    pub fn parse(text: &str) -> Option<Self> {
        let digits: Vec<u8> = text.bytes().filter(|b| b.is_ascii_hexdigit()).collect();
        if digits.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, pair) in digits.chunks(2).enumerate() {
            bytes[i] = u8::from_str_radix(std::str::from_utf8(pair).ok()?, 16).ok()?;
        }
        Some(Umid(bytes))
    }
}

impl fmt::Display for Umid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::ul::dotted_hex(&self.0))
    }
}

impl fmt::Debug for Umid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UMID({})", self)
    }
}

impl Default for Umid {
    fn default() -> Self {
        Umid::zero()
    }
}

impl Serialize for Umid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Umid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Umid::parse(&text).ok_or_else(|| serde::de::Error::custom(format!("invalid UMID '{}'", text)))
    }
}
