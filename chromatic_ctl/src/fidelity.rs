//! Round-trip fidelity metrics comparing an original and a reconstructed
//! cell sequence.

use serde::{Deserialize, Serialize};

use crate::cell::ChromaticCell;

/// Intensity assumed for cells missing from the shorter sequence.
const MISSING_INTENSITY_PENALTY: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FidelityReport {
    pub levenshtein_distance: usize,
    pub token_retention: f64,
    pub polarity_inversions: usize,
    pub intensity_loss: f64,
    pub temporal_drift: f64,
}

impl FidelityReport {
    pub fn measure(
        original_text: &str,
        reconstructed_text: &str,
        original: &[ChromaticCell],
        reconstructed: &[ChromaticCell],
    ) -> Self {
        Self {
            levenshtein_distance: levenshtein_distance(original_text, reconstructed_text),
            token_retention: token_retention(original, reconstructed),
            polarity_inversions: polarity_inversions(original, reconstructed),
            intensity_loss: intensity_loss(original, reconstructed),
            temporal_drift: temporal_drift(original, reconstructed),
        }
    }

    pub fn is_lossless(&self) -> bool {
        self.levenshtein_distance == 0
            && self.token_retention == 1.0
            && self.polarity_inversions == 0
            && self.intensity_loss == 0.0
            && self.temporal_drift == 0.0
    }
}

/// Character-level edit distance.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (long, short) = if a.len() >= b.len() { (&a, &b) } else { (&b, &a) };

    let mut previous: Vec<usize> = (0..=short.len()).collect();
    let mut current = Vec::with_capacity(short.len() + 1);
    for (i, c1) in long.iter().enumerate() {
        current.clear();
        current.push(i + 1);
        for (j, c2) in short.iter().enumerate() {
            let insertion = previous[j + 1] + 1;
            let deletion = current[j] + 1;
            let substitution = previous[j] + usize::from(c1 != c2);
            current.push(insertion.min(deletion).min(substitution));
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[short.len()]
}

/// Fraction of positions whose phonemes agree, over the longer length.
pub fn token_retention(original: &[ChromaticCell], reconstructed: &[ChromaticCell]) -> f64 {
    match (original.is_empty(), reconstructed.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }
    let matches = original
        .iter()
        .zip(reconstructed)
        .filter(|(a, b)| a.phoneme == b.phoneme)
        .count();
    matches as f64 / original.len().max(reconstructed.len()) as f64
}

/// Positions with differing polarity plus the length difference.
pub fn polarity_inversions(original: &[ChromaticCell], reconstructed: &[ChromaticCell]) -> usize {
    let mismatched = original
        .iter()
        .zip(reconstructed)
        .filter(|(a, b)| a.polarity != b.polarity)
        .count();
    mismatched + original.len().abs_diff(reconstructed.len())
}

/// Mean absolute intensity difference; each missing cell costs 1.0.
pub fn intensity_loss(original: &[ChromaticCell], reconstructed: &[ChromaticCell]) -> f64 {
    let longest = original.len().max(reconstructed.len());
    if original.is_empty() || reconstructed.is_empty() {
        return 0.0;
    }
    let paired: f64 = original
        .iter()
        .zip(reconstructed)
        .map(|(a, b)| (a.intensity - b.intensity).abs())
        .sum();
    let missing = original.len().abs_diff(reconstructed.len()) as f64 * MISSING_INTENSITY_PENALTY;
    (paired + missing) / longest as f64
}

/// Mean absolute timestamp difference over the paired prefix.
pub fn temporal_drift(original: &[ChromaticCell], reconstructed: &[ChromaticCell]) -> f64 {
    let paired = original.len().min(reconstructed.len());
    if paired == 0 {
        return 0.0;
    }
    let total: f64 = original
        .iter()
        .zip(reconstructed)
        .map(|(a, b)| (a.timestamp - b.timestamp).abs())
        .sum();
    total / paired as f64
}
