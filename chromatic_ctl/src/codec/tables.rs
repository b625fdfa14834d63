//! Fixed phoneme → tone and tone → hue lookup tables.
//!
//! Tables are immutable values built once, either from the built-in
//! alphabet or from a TOML document, and handed to the [`Codec`](super::Codec)
//! explicitly.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::cell::{Hue, Tone, TONE_CLASSES};
use crate::error::{CtlError, CtlResult};

/// Symbol returned by the lossy reverse lookup when a tone has no phoneme.
pub const UNKNOWN_PHONEME: char = '?';

/// Twelve-step colour wheel, 30° apart, starting at red.
const BUILTIN_HUES: [Hue; 12] = [
    Hue::new(255, 0, 0),
    Hue::new(255, 128, 0),
    Hue::new(255, 255, 0),
    Hue::new(128, 255, 0),
    Hue::new(0, 255, 0),
    Hue::new(0, 255, 128),
    Hue::new(0, 255, 255),
    Hue::new(0, 128, 255),
    Hue::new(0, 0, 255),
    Hue::new(128, 0, 255),
    Hue::new(255, 0, 255),
    Hue::new(255, 0, 128),
];

#[derive(Debug, Clone, PartialEq)]
pub struct CodecTables {
    phoneme_to_tone: HashMap<char, Tone>,
    /// Phonemes per tone, in registration order.
    tone_to_phonemes: Vec<Vec<char>>,
    tone_to_hue: [Hue; 12],
}

#[derive(Debug, Deserialize)]
struct RawTables {
    #[serde(default)]
    phonemes: BTreeMap<String, i64>,
    #[serde(default)]
    hues: BTreeMap<String, [u8; 3]>,
}

impl CodecTables {
    /// Latin alphabet assigned cyclically (`a` → 0 … `l` → 11, `m` → 0 …)
    /// over the built-in colour wheel.
    pub fn builtin() -> Self {
        let entries = ('a'..='z')
            .enumerate()
            .map(|(idx, symbol)| (symbol, Tone::new(idx as i64)));
        Self::from_entries(entries, BUILTIN_HUES)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> CtlResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse a `[phonemes]` table (`symbol = tone`) and a `[hues]` table
    /// (`tone = [r, g, b]`). All twelve hue entries are required.
    pub fn from_toml_str(toml_str: &str) -> CtlResult<Self> {
        let raw: RawTables = toml::from_str(toml_str)?;

        let mut entries = Vec::with_capacity(raw.phonemes.len());
        for (key, tone) in &raw.phonemes {
            let mut chars = key.chars();
            let symbol = match (chars.next(), chars.next()) {
                (Some(symbol), None) => symbol,
                _ => {
                    return Err(CtlError::config(
                        format!("phonemes.{key}"),
                        "phoneme keys must be a single character",
                    ))
                }
            };
            let tone = Tone::try_from(*tone).map_err(|_| {
                CtlError::config(format!("phonemes.{key}"), format!("tone {tone} outside [0, 11]"))
            })?;
            entries.push((symbol, tone));
        }

        let mut hues = [Hue::default(); 12];
        for (tone, slot) in hues.iter_mut().enumerate() {
            let key = tone.to_string();
            let channels = raw.hues.get(&key).ok_or_else(|| {
                CtlError::config(format!("hues.{key}"), "every tone class needs a hue")
            })?;
            *slot = Hue(*channels);
        }

        Ok(Self::from_entries(entries, hues))
    }

    fn from_entries(entries: impl IntoIterator<Item = (char, Tone)>, hues: [Hue; 12]) -> Self {
        let mut phoneme_to_tone = HashMap::new();
        let mut tone_to_phonemes = vec![Vec::new(); TONE_CLASSES as usize];
        for (symbol, tone) in entries {
            if phoneme_to_tone.insert(symbol, tone).is_none() {
                tone_to_phonemes[tone.value() as usize].push(symbol);
            }
        }
        Self {
            phoneme_to_tone,
            tone_to_phonemes,
            tone_to_hue: hues,
        }
    }

    /// Tone for a phoneme; unknown symbols fall back to `codepoint mod 12`.
    pub fn tone_for(&self, phoneme: char) -> Tone {
        self.phoneme_to_tone
            .get(&phoneme)
            .copied()
            .unwrap_or_else(|| Tone::new(phoneme as i64))
    }

    pub fn hue_for(&self, tone: Tone) -> Hue {
        self.tone_to_hue[tone.value() as usize]
    }

    /// First registered phoneme for a tone (lossy reverse lookup).
    pub fn phoneme_for(&self, tone: Tone) -> char {
        self.tone_to_phonemes[tone.value() as usize]
            .first()
            .copied()
            .unwrap_or(UNKNOWN_PHONEME)
    }

    pub fn is_registered(&self, phoneme: char) -> bool {
        self.phoneme_to_tone.contains_key(&phoneme)
    }
}

impl Default for CodecTables {
    fn default() -> Self {
        Self::builtin()
    }
}
