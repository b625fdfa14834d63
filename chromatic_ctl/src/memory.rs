//! Chromatic memory: decaying tone and hue attractor peaks.
//!
//! Peaks are reinforced by observed L cells, decay on every update and are
//! pruned once they fall below their minimum strength. The filter matches
//! incoming cells against the peaks to raise coherence and snaps its output
//! toward them.
//!
//! [`MemoryState`] is a plain value. Every update returns a new state; the
//! caller owns the current one and threads it through the sequence.

use serde::{Deserialize, Serialize};

use crate::cell::{ChromaticCell, Hue, Tone};
use crate::config::{HuePeakConfig, MatchingConfig, MemoryConfig, TonePeakConfig};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TonePeak {
    pub tone: Tone,
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HuePeak {
    pub hue: Hue,
    pub strength: f64,
}

/// Snapshot of the attractor peaks after `updates` observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    pub tone_peaks: Vec<TonePeak>,
    pub hue_peaks: Vec<HuePeak>,
    pub updates: u64,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tone_peaks.is_empty() && self.hue_peaks.is_empty()
    }

    /// Nearest tone peak by cyclic distance; ties keep the earliest peak.
    pub fn nearest_tone_peak(&self, tone: Tone) -> Option<(&TonePeak, u8)> {
        self.tone_peaks
            .iter()
            .map(|peak| (peak, peak.tone.cyclic_distance(tone)))
            .min_by_key(|(_, distance)| *distance)
    }

    /// Nearest hue peak by mean channel distance; ties keep the earliest peak.
    pub fn nearest_hue_peak(&self, hue: Hue) -> Option<(&HuePeak, f64)> {
        self.hue_peaks
            .iter()
            .map(|peak| (peak, peak.hue.mean_distance(hue)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn total_strength(&self) -> f64 {
        self.tone_peaks.iter().map(|p| p.strength).sum::<f64>()
            + self.hue_peaks.iter().map(|p| p.strength).sum::<f64>()
    }

    /// Method form of [`update_memory_state`].
    pub fn update(&self, observed: &ChromaticCell, config: &MemoryConfig, coherence: f64) -> Self {
        update_memory_state(self, observed, config, coherence)
    }
}

/// Decay, prune and reinforce the peaks with one observed L cell.
///
/// The reinforcement amount is scaled by
/// `1 + intensity_weight·intensity + coherence_bias·coherence`, so salient
/// and coherent observations leave stronger traces.
pub fn update_memory_state(
    state: &MemoryState,
    observed: &ChromaticCell,
    config: &MemoryConfig,
    coherence: f64,
) -> MemoryState {
    let matching = &config.matching;
    let boost =
        1.0 + matching.intensity_weight * observed.intensity + matching.coherence_bias * coherence;

    let mut tone_peaks = decay_tone_peaks(&state.tone_peaks, &config.tone);
    reinforce_tone(&mut tone_peaks, observed.tone, boost * config.tone.reinforce_gain, &config.tone);

    let mut hue_peaks = decay_hue_peaks(&state.hue_peaks, &config.hue);
    reinforce_hue(&mut hue_peaks, observed.hue, boost * config.hue.reinforce_gain, &config.hue);

    MemoryState {
        tone_peaks,
        hue_peaks,
        updates: state.updates + 1,
    }
}

fn decay_factor(decay: f64) -> f64 {
    (1.0 - decay).max(0.0)
}

fn decay_tone_peaks(peaks: &[TonePeak], config: &TonePeakConfig) -> Vec<TonePeak> {
    let factor = decay_factor(config.decay);
    peaks
        .iter()
        .map(|peak| TonePeak {
            tone: peak.tone,
            strength: peak.strength * factor,
        })
        .filter(|peak| peak.strength >= config.min_strength)
        .collect()
}

fn decay_hue_peaks(peaks: &[HuePeak], config: &HuePeakConfig) -> Vec<HuePeak> {
    let factor = decay_factor(config.decay);
    peaks
        .iter()
        .map(|peak| HuePeak {
            hue: peak.hue,
            strength: peak.strength * factor,
        })
        .filter(|peak| peak.strength >= config.min_strength)
        .collect()
}

fn reinforce_tone(peaks: &mut Vec<TonePeak>, tone: Tone, amount: f64, config: &TonePeakConfig) {
    let nearest = peaks
        .iter()
        .enumerate()
        .map(|(idx, peak)| (idx, peak.tone.cyclic_distance(tone)))
        .min_by_key(|(_, distance)| *distance);

    match nearest {
        Some((idx, distance)) if distance <= config.min_separation => {
            peaks[idx].strength += amount;
        }
        _ if peaks.len() < config.max_peaks => peaks.push(TonePeak {
            tone,
            strength: amount,
        }),
        _ => tracing::trace!(
            "tone peak capacity {} reached; observation at tone {} not stored",
            config.max_peaks,
            tone
        ),
    }
}

fn reinforce_hue(peaks: &mut Vec<HuePeak>, hue: Hue, amount: f64, config: &HuePeakConfig) {
    let nearest = peaks
        .iter()
        .enumerate()
        .map(|(idx, peak)| (idx, peak.hue.mean_distance(hue)))
        .min_by(|a, b| a.1.total_cmp(&b.1));

    match nearest {
        Some((idx, distance)) if distance <= config.min_distance => {
            peaks[idx].strength += amount;
        }
        _ if peaks.len() < config.max_peaks => peaks.push(HuePeak {
            hue,
            strength: amount,
        }),
        _ => tracing::trace!(
            "hue peak capacity {} reached; observation {:?} not stored",
            config.max_peaks,
            hue.0
        ),
    }
}

fn tone_match(tone: Tone, state: &MemoryState, matching: &MatchingConfig) -> Option<(TonePeak, u8)> {
    state
        .nearest_tone_peak(tone)
        .filter(|(peak, gap)| *gap <= matching.tone_tolerance && peak.strength >= matching.min_match_strength)
        .map(|(peak, gap)| (*peak, gap))
}

fn hue_match(hue: Hue, state: &MemoryState, matching: &MatchingConfig) -> Option<(HuePeak, f64)> {
    state
        .nearest_hue_peak(hue)
        .filter(|(peak, gap)| *gap <= matching.hue_tolerance && peak.strength >= matching.min_match_strength)
        .map(|(peak, gap)| (*peak, gap))
}

/// Weighted match score, or `None` when neither channel is within
/// tolerance of a sufficiently strong peak.
pub fn memory_match_score(cell: &ChromaticCell, state: &MemoryState, config: &MemoryConfig) -> Option<f64> {
    let matching = &config.matching;
    let tone = tone_match(cell.tone, state, matching);
    let hue = hue_match(cell.hue, state, matching);
    if tone.is_none() && hue.is_none() {
        return None;
    }

    let mut score = 0.0;
    if let Some((peak, gap)) = tone {
        let tolerance = f64::from(matching.tone_tolerance).max(1.0);
        score += peak.strength * (1.0 - f64::from(gap) / tolerance).max(0.0);
    }
    if let Some((peak, gap)) = hue {
        let tolerance = matching.hue_tolerance.max(1.0);
        score += peak.strength * (1.0 - gap / tolerance).max(0.0);
    }
    Some(score)
}

/// Whether a cell's tone and hue sit close enough to strong peaks.
pub fn match_to_memory_profile(cell: &ChromaticCell, state: &MemoryState, config: &MemoryConfig) -> bool {
    memory_match_score(cell, state, config)
        .map_or(false, |score| score >= config.matching.min_match_strength)
}

/// Matched tone peak, or the input tone.
pub fn snap_to_nearest_memory_tone(tone: Tone, state: &MemoryState, config: &MemoryConfig) -> Tone {
    tone_match(tone, state, &config.matching).map_or(tone, |(peak, _)| peak.tone)
}

/// Matched hue peak, or the input hue.
pub fn snap_to_nearest_memory_hue(hue: Hue, state: &MemoryState, config: &MemoryConfig) -> Hue {
    hue_match(hue, state, &config.matching).map_or(hue, |(peak, _)| peak.hue)
}
