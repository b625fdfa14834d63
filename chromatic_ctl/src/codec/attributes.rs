//! Word-level intensity and polarity derivation.

use crate::cell::Polarity;
use crate::config::CodecConfig;

pub const MIN_WORD_INTENSITY: f64 = 0.5;
pub const MAX_WORD_INTENSITY: f64 = 2.0;

/// Intensity for a whitespace-delimited word.
///
/// Base 1.0, +0.3 for any uppercase letter, +0.2 for a trailing `!`, +0.1
/// when longer than seven characters, −0.1 when three or shorter, clamped to
/// `[0.5, 2.0]`.
pub fn word_intensity(word: &str) -> f64 {
    let length = word.chars().count();
    let mut intensity: f64 = 1.0;

    if word.chars().any(char::is_uppercase) {
        intensity += 0.3;
    }
    if word.ends_with('!') {
        intensity += 0.2;
    }
    if length > 7 {
        intensity += 0.1;
    }
    if length <= 3 {
        intensity -= 0.1;
    }

    intensity.clamp(MIN_WORD_INTENSITY, MAX_WORD_INTENSITY)
}

/// Whether a token opens a negation window.
pub fn is_negation_trigger(word: &str, config: &CodecConfig) -> bool {
    let lowered = word.to_lowercase();
    let normalised = lowered.trim_end_matches(&['.', ',', '!', '?'][..]);
    normalised.ends_with("n't") || config.not_words.iter().any(|w| w == normalised)
}

/// Polarity for each word of a token sequence.
///
/// A trigger inverts the default polarity for the following
/// `negation_window` tokens (and itself when `include_trigger` is set). A
/// token ending in `?` closes a question and takes `question_polarity`.
pub fn word_polarities(words: &[&str], config: &CodecConfig) -> Vec<Polarity> {
    let default = config.default_polarity;
    let mut countdown = 0usize;
    let mut polarities = Vec::with_capacity(words.len());

    for word in words {
        let trigger = is_negation_trigger(word, config);

        let mut polarity = if countdown > 0 {
            countdown -= 1;
            default.flipped()
        } else {
            default
        };
        if trigger && config.include_trigger {
            polarity = default.flipped();
        }
        if word.ends_with('?') {
            polarity = config.question_polarity;
        }
        polarities.push(polarity);

        if trigger {
            countdown = config.negation_window;
        }
    }

    polarities
}
