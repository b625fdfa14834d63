//! Reversible text ↔ chromatic cell codec.
//!
//! Encoding runs four stages: text → phonemes → tones → hues → cells with
//! injected intensity, polarity and timestamp. Decoding reads tones back
//! from the cells and recovers each phoneme from the stored symbol, falling
//! back to a lossy reverse table lookup when none is stored.
//!
//! ```
//! use chromatic_ctl::Codec;
//!
//! let codec = Codec::default();
//! let cells = codec.encode("The quick brown fox").unwrap();
//! assert_eq!(codec.decode(&cells), "the quick brown fox");
//! ```

pub mod attributes;
pub mod tables;

pub use attributes::{is_negation_trigger, word_intensity, word_polarities};
pub use tables::{CodecTables, UNKNOWN_PHONEME};

use crate::cell::{ChromaticCell, Hue, Polarity, Tone};
use crate::config::CodecConfig;
use crate::error::{CtlError, CtlResult};

/// Intensity assigned to whitespace characters.
pub const WHITESPACE_INTENSITY: f64 = 1.0;

/// Encoder/decoder bound to one set of tables and polarity rules.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    tables: CodecTables,
    config: CodecConfig,
}

impl Codec {
    pub fn new(tables: CodecTables, config: CodecConfig) -> Self {
        Self { tables, config }
    }

    pub fn tables(&self) -> &CodecTables {
        &self.tables
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// One lowercased phoneme per input character.
    pub fn text_to_phonemes(&self, text: &str) -> Vec<char> {
        text_to_phonemes(text)
    }

    pub fn phonemes_to_tones(&self, phonemes: &[char]) -> Vec<Tone> {
        phonemes.iter().map(|p| self.tables.tone_for(*p)).collect()
    }

    pub fn tones_to_hues(&self, tones: &[Tone]) -> Vec<Hue> {
        tones.iter().map(|t| self.tables.hue_for(*t)).collect()
    }

    /// Combine per-character tones, hues and phonemes with word-derived
    /// intensity and polarity into cells. Timestamps are character indices.
    pub fn inject_attributes(
        &self,
        text: &str,
        tones: &[Tone],
        hues: &[Hue],
        phonemes: &[char],
    ) -> CtlResult<Vec<ChromaticCell>> {
        let expected = text.chars().count();
        for (context, got) in [
            ("inject_attributes tones", tones.len()),
            ("inject_attributes hues", hues.len()),
            ("inject_attributes phonemes", phonemes.len()),
        ] {
            if got != expected {
                return Err(CtlError::shape(context, expected, got));
            }
        }

        let attributes = self.character_attributes(text);
        let cells = tones
            .iter()
            .zip(hues)
            .zip(phonemes)
            .zip(attributes)
            .enumerate()
            .map(|(idx, (((tone, hue), phoneme), (intensity, polarity)))| {
                ChromaticCell::new(*tone, *hue, intensity, polarity, idx as f64)
                    .with_phoneme(*phoneme)
            })
            .collect();
        Ok(cells)
    }

    /// Word intensity and polarity broadcast to every character. Whitespace
    /// takes unit intensity and positive polarity.
    fn character_attributes(&self, text: &str) -> Vec<(f64, Polarity)> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let intensities: Vec<f64> = words.iter().map(|w| word_intensity(w)).collect();
        let polarities = word_polarities(&words, &self.config);

        let mut attributes = Vec::with_capacity(text.len());
        let mut word_idx = 0usize;
        let mut in_word = false;
        for ch in text.chars() {
            if ch.is_whitespace() {
                if in_word {
                    word_idx += 1;
                    in_word = false;
                }
                attributes.push((WHITESPACE_INTENSITY, Polarity::Positive));
            } else {
                in_word = true;
                let intensity = intensities
                    .get(word_idx)
                    .copied()
                    .unwrap_or(WHITESPACE_INTENSITY);
                let polarity = polarities
                    .get(word_idx)
                    .copied()
                    .unwrap_or(self.config.default_polarity);
                attributes.push((intensity, polarity));
            }
        }
        attributes
    }

    /// Full encoding pipeline: text → cells.
    pub fn encode(&self, text: &str) -> CtlResult<Vec<ChromaticCell>> {
        let phonemes = self.text_to_phonemes(text);
        let tones = self.phonemes_to_tones(&phonemes);
        let hues = self.tones_to_hues(&tones);
        self.inject_attributes(text, &tones, &hues, &phonemes)
    }

    pub fn encode_to_tones(&self, text: &str) -> Vec<Tone> {
        self.phonemes_to_tones(&self.text_to_phonemes(text))
    }

    pub fn encode_to_hues(&self, text: &str) -> Vec<Hue> {
        self.tones_to_hues(&self.encode_to_tones(text))
    }

    /// Tones are read directly from the cells, never re-derived from hue.
    pub fn cells_to_tones(&self, cells: &[ChromaticCell]) -> Vec<Tone> {
        cells.iter().map(|cell| cell.tone).collect()
    }

    /// Stored phoneme when present, else the first phoneme registered for
    /// the cell's tone.
    pub fn cells_to_phonemes(&self, cells: &[ChromaticCell]) -> Vec<char> {
        cells
            .iter()
            .map(|cell| {
                cell.phoneme
                    .unwrap_or_else(|| self.tables.phoneme_for(cell.tone))
            })
            .collect()
    }

    pub fn phonemes_to_text(&self, phonemes: &[char]) -> String {
        phonemes.iter().collect()
    }

    /// Full decoding pipeline: cells → text.
    pub fn decode(&self, cells: &[ChromaticCell]) -> String {
        self.phonemes_to_text(&self.cells_to_phonemes(cells))
    }

    pub fn decode_to_phonemes(&self, cells: &[ChromaticCell]) -> Vec<char> {
        self.cells_to_phonemes(cells)
    }

    pub fn decode_to_tones(&self, cells: &[ChromaticCell]) -> Vec<Tone> {
        self.cells_to_tones(cells)
    }
}

/// Lowercase each character independently. Characters whose lowercase form
/// expands to several characters are kept unchanged.
pub fn text_to_phonemes(text: &str) -> Vec<char> {
    text.chars()
        .map(|ch| {
            let mut lower = ch.to_lowercase();
            match (lower.next(), lower.next()) {
                (Some(single), None) => single,
                _ => ch,
            }
        })
        .collect()
}
