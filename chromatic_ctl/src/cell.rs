//! Validated chromatic cell record and its component value types.
//!
//! A [`ChromaticCell`] is the atomic unit flowing between the codec, the
//! interpretive filter and the coupling engine. Domain constraints are
//! carried by the types themselves: [`Tone`] is always in `[0, 11]`, [`Hue`]
//! channels are `u8`, and [`Polarity`] is a closed enum. Untyped JSON input
//! is checked once at the boundary by [`ChromaticCell::from_json`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CtlError, CtlResult};

/// Number of tone classes on the cyclic tone domain.
pub const TONE_CLASSES: u8 = 12;

/// Tone class on the 12-point cyclic domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Tone(u8);

impl Tone {
    /// Normalise any integer onto the tone circle.
    pub fn new(value: i64) -> Self {
        Tone(value.rem_euclid(TONE_CLASSES as i64) as u8)
    }

    /// Round a real-valued position (halves to even) and normalise it onto
    /// the tone circle.
    pub fn from_f64(value: f64) -> Self {
        Tone::new(value.round_ties_even() as i64)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Shortest distance around the circle, in `[0, 6]`.
    pub fn cyclic_distance(self, other: Tone) -> u8 {
        let diff = (self.0 as i16 - other.0 as i16).unsigned_abs() as u8;
        diff.min(TONE_CLASSES - diff)
    }

    /// Signed shortest-arc offset from `self` to `other`, in `(-6, 6]`.
    pub fn signed_offset(self, other: Tone) -> i64 {
        let half = (TONE_CLASSES / 2) as i64;
        let raw = (other.0 as i64 - self.0 as i64).rem_euclid(TONE_CLASSES as i64);
        if raw > half {
            raw - TONE_CLASSES as i64
        } else {
            raw
        }
    }

    /// Move from `self` toward `target` along the shortest arc by `weight`
    /// (0 keeps `self`, 1 lands on `target`), rounding to a tone class.
    pub fn blend_toward(self, target: Tone, weight: f64) -> Tone {
        let offset = self.signed_offset(target) as f64;
        Tone::from_f64(self.0 as f64 + weight * offset)
    }

    /// Angle of the tone on the unit circle, in radians.
    pub fn angle(self) -> f64 {
        self.0 as f64 * std::f64::consts::TAU / TONE_CLASSES as f64
    }

    /// Nearest tone class for an angle in radians.
    pub fn from_angle(angle: f64) -> Tone {
        Tone::from_f64(angle * TONE_CLASSES as f64 / std::f64::consts::TAU)
    }
}

impl TryFrom<i64> for Tone {
    type Error = CtlError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..TONE_CLASSES as i64).contains(&value) {
            Ok(Tone(value as u8))
        } else {
            Err(CtlError::ValueDomain {
                index: 0,
                attribute: "tone",
                value: value.to_string(),
            })
        }
    }
}

impl From<Tone> for u8 {
    fn from(tone: Tone) -> Self {
        tone.0
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RGB hue triple; channels are clamped to `[0, 255]` by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hue(pub [u8; 3]);

impl Hue {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Hue([r, g, b])
    }

    /// Round and clamp real-valued channels.
    pub fn from_channels(channels: [f64; 3]) -> Self {
        Hue(channels.map(clamp_channel))
    }

    pub fn channels(self) -> [f64; 3] {
        self.0.map(f64::from)
    }

    /// Mean absolute per-channel difference, in `[0, 255]`.
    pub fn mean_distance(self, other: Hue) -> f64 {
        let total: f64 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (*a as f64 - *b as f64).abs())
            .sum();
        total / 3.0
    }

    /// Per-channel linear interpolation toward `target` by `weight`.
    pub fn lerp(self, target: Hue, weight: f64) -> Hue {
        let a = self.channels();
        let b = target.channels();
        Hue::from_channels([
            (1.0 - weight) * a[0] + weight * b[0],
            (1.0 - weight) * a[1] + weight * b[1],
            (1.0 - weight) * a[2] + weight * b[2],
        ])
    }
}

fn clamp_channel(value: f64) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, 255.0) as u8
    }
}

/// Structural polarity of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i8")]
pub enum Polarity {
    Negative,
    Neutral,
    #[default]
    Positive,
}

impl Polarity {
    pub fn value(self) -> i8 {
        match self {
            Polarity::Negative => -1,
            Polarity::Neutral => 0,
            Polarity::Positive => 1,
        }
    }

    /// Sign inversion; neutral stays neutral.
    pub fn flipped(self) -> Self {
        match self {
            Polarity::Negative => Polarity::Positive,
            Polarity::Neutral => Polarity::Neutral,
            Polarity::Positive => Polarity::Negative,
        }
    }
}

impl TryFrom<i64> for Polarity {
    type Error = CtlError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Polarity::Negative),
            0 => Ok(Polarity::Neutral),
            1 => Ok(Polarity::Positive),
            other => Err(CtlError::ValueDomain {
                index: 0,
                attribute: "polarity",
                value: other.to_string(),
            }),
        }
    }
}

impl From<Polarity> for i8 {
    fn from(polarity: Polarity) -> Self {
        polarity.value()
    }
}

/// Per-step severity marker. Ordered so that `max` escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintFlag {
    #[default]
    Ok,
    Warn,
    Violation,
}

impl ConstraintFlag {
    /// Raise the severity to at least `other`; never downgrades.
    pub fn escalate(&mut self, other: ConstraintFlag) {
        if other > *self {
            *self = other;
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "OK" => Some(ConstraintFlag::Ok),
            "WARN" => Some(ConstraintFlag::Warn),
            "VIOLATION" => Some(ConstraintFlag::Violation),
            _ => None,
        }
    }
}

/// Atomic record of tone, hue, intensity, polarity and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChromaticCell {
    pub tone: Tone,
    #[serde(alias = "rgb")]
    pub hue: Hue,
    pub intensity: f64,
    pub polarity: Polarity,
    pub timestamp: f64,
    /// Source symbol, kept for lossless reconstruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phoneme: Option<char>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coherence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint_flag: Option<ConstraintFlag>,
}

impl ChromaticCell {
    pub fn new(tone: Tone, hue: Hue, intensity: f64, polarity: Polarity, timestamp: f64) -> Self {
        Self {
            tone,
            hue,
            intensity,
            polarity,
            timestamp,
            phoneme: None,
            coherence: None,
            constraint_flag: None,
        }
    }

    pub fn with_phoneme(mut self, phoneme: char) -> Self {
        self.phoneme = Some(phoneme);
        self
    }

    pub fn with_coherence(mut self, coherence: f64) -> Self {
        self.coherence = Some(coherence);
        self
    }

    pub fn flag(&self) -> ConstraintFlag {
        self.constraint_flag.unwrap_or_default()
    }

    /// Check the numeric attributes the type system cannot enforce.
    pub fn validate(&self, index: usize) -> CtlResult<()> {
        if !self.intensity.is_finite() {
            return Err(domain(index, "intensity", self.intensity));
        }
        if !self.timestamp.is_finite() {
            return Err(domain(index, "timestamp", self.timestamp));
        }
        if let Some(coherence) = self.coherence {
            if !(0.0..=1.0).contains(&coherence) {
                return Err(domain(index, "coherence", coherence));
            }
        }
        Ok(())
    }

    /// Build a cell from an untyped JSON object.
    ///
    /// `tone`, `hue` (or `rgb`), `intensity` and `polarity` are required.
    /// An absent `timestamp` is filled with the sequence index.
    pub fn from_json(index: usize, value: &Value) -> CtlResult<Self> {
        let object = value
            .as_object()
            .ok_or(CtlError::MalformedCell { index, attribute: "cell" })?;

        let tone_raw = object
            .get("tone")
            .and_then(Value::as_i64)
            .ok_or(CtlError::MalformedCell { index, attribute: "tone" })?;
        let tone = Tone::try_from(tone_raw).map_err(|_| domain(index, "tone", tone_raw))?;

        let hue_values = object
            .get("hue")
            .or_else(|| object.get("rgb"))
            .and_then(Value::as_array)
            .filter(|channels| channels.len() == 3)
            .ok_or(CtlError::MalformedCell { index, attribute: "hue" })?;
        let mut hue = [0u8; 3];
        for (slot, channel) in hue.iter_mut().zip(hue_values) {
            let raw = channel
                .as_i64()
                .ok_or(CtlError::MalformedCell { index, attribute: "hue" })?;
            *slot = u8::try_from(raw).map_err(|_| domain(index, "hue", raw))?;
        }

        let intensity = object
            .get("intensity")
            .and_then(Value::as_f64)
            .ok_or(CtlError::MalformedCell { index, attribute: "intensity" })?;

        let polarity_raw = object
            .get("polarity")
            .and_then(Value::as_i64)
            .ok_or(CtlError::MalformedCell { index, attribute: "polarity" })?;
        let polarity =
            Polarity::try_from(polarity_raw).map_err(|_| domain(index, "polarity", polarity_raw))?;

        let timestamp = match object.get("timestamp") {
            None | Some(Value::Null) => index as f64,
            Some(raw) => raw
                .as_f64()
                .ok_or(CtlError::MalformedCell { index, attribute: "timestamp" })?,
        };

        let phoneme = match object.get("phoneme") {
            None | Some(Value::Null) => None,
            Some(raw) => {
                let text = raw
                    .as_str()
                    .ok_or(CtlError::MalformedCell { index, attribute: "phoneme" })?;
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(symbol), None) => Some(symbol),
                    _ => return Err(domain(index, "phoneme", format!("{text:?}"))),
                }
            }
        };

        let coherence = match object.get("coherence") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(
                raw.as_f64()
                    .ok_or(CtlError::MalformedCell { index, attribute: "coherence" })?,
            ),
        };

        let constraint_flag = match object.get("constraint_flag") {
            None | Some(Value::Null) => None,
            Some(raw) => {
                let text = raw
                    .as_str()
                    .ok_or(CtlError::MalformedCell { index, attribute: "constraint_flag" })?;
                Some(
                    ConstraintFlag::parse(text)
                        .ok_or_else(|| domain(index, "constraint_flag", text))?,
                )
            }
        };

        let cell = ChromaticCell {
            tone,
            hue: Hue(hue),
            intensity,
            polarity,
            timestamp,
            phoneme,
            coherence,
            constraint_flag,
        };
        cell.validate(index)?;
        Ok(cell)
    }
}

/// Parse a JSON array of cells, failing on the first malformed entry.
pub fn cells_from_json(value: &Value) -> CtlResult<Vec<ChromaticCell>> {
    let items = value
        .as_array()
        .ok_or(CtlError::MalformedCell { index: 0, attribute: "sequence" })?;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| ChromaticCell::from_json(index, item))
        .collect()
}

fn domain(index: usize, attribute: &'static str, value: impl fmt::Display) -> CtlError {
    CtlError::ValueDomain {
        index,
        attribute,
        value: value.to_string(),
    }
}
