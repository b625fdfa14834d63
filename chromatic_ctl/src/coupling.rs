//! Coupling engine binding the observation (L) and interpretation (R) streams.
//!
//! Pairwise disparities are normalised against reference maxima, shaped by
//! per-attribute exponents and combined into a disagreement score. The
//! coupled stream blends R toward L and tracks a rolling coherence.
//!
//! Streams of unequal length are truncated to the shorter one. Every entry
//! point validates both streams before pairing them.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cell::{ChromaticCell, ConstraintFlag, Polarity};
use crate::config::CouplingConfig;
use crate::error::CtlResult;

/// Disparity between one L cell and one R cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairDisparity {
    pub tone_error: f64,
    pub hue_error: f64,
    pub intensity_gap: f64,
    pub polarity_mismatch: bool,
    pub disagreement: f64,
    pub agreement: f64,
    pub coherence: f64,
}

/// Sequence-level means of [`PairDisparity`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CouplingMetrics {
    pub length: usize,
    pub tone_error: f64,
    pub hue_error: f64,
    pub intensity_gap: f64,
    /// Fraction of pairs whose polarities disagree.
    pub polarity_mismatch: f64,
    pub disagreement: f64,
    pub agreement: f64,
    pub coherence: f64,
}

impl Default for CouplingMetrics {
    fn default() -> Self {
        Self {
            length: 0,
            tone_error: 0.0,
            hue_error: 0.0,
            intensity_gap: 0.0,
            polarity_mismatch: 0.0,
            disagreement: 0.0,
            agreement: 1.0,
            coherence: 1.0,
        }
    }
}

/// One cell of the coupled stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoupledStep {
    #[serde(flatten)]
    pub cell: ChromaticCell,
    pub agreement: f64,
    /// Mean worst gap/threshold ratio over the preceding steps in the
    /// window; 0.0 at the first step.
    pub window_penalty: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoupledSummary {
    pub length: usize,
    pub mean_agreement: f64,
    pub mean_coherence: f64,
    pub warnings: usize,
    pub violations: usize,
}

/// Everything produced by one coupling pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingSnapshot {
    pub metrics: CouplingMetrics,
    pub per_step: Vec<PairDisparity>,
    pub coupled: Vec<CoupledStep>,
    pub summary: CoupledSummary,
}

fn normalise(value: f64, reference: f64) -> f64 {
    if reference > 0.0 {
        (value / reference).min(1.0)
    } else {
        0.0
    }
}

fn ratio(value: f64, threshold: f64) -> f64 {
    value / threshold.max(f64::EPSILON)
}

pub fn pair_disparity(l: &ChromaticCell, r: &ChromaticCell, config: &CouplingConfig) -> PairDisparity {
    let reference = &config.reference;
    let shape = &config.nonlinear;

    let tone_error = f64::from(l.tone.cyclic_distance(r.tone));
    let hue_error = l.hue.mean_distance(r.hue);
    let intensity_gap = (l.intensity - r.intensity).abs();
    let polarity_mismatch = l.polarity != r.polarity;

    let terms = [
        normalise(tone_error, reference.tone_max).powf(shape.tone_exponent),
        normalise(hue_error, reference.hue_max).powf(shape.hue_exponent),
        normalise(intensity_gap, reference.intensity_max).powf(shape.intensity_exponent),
        if polarity_mismatch { 1.0 } else { 0.0 },
    ];
    let weights = config.weights.normalised();
    let disagreement = terms
        .iter()
        .zip(weights.iter())
        .map(|(term, weight)| term * weight)
        .sum::<f64>()
        .clamp(0.0, 1.0);
    let agreement = 1.0 - disagreement;

    let penalty = if polarity_mismatch { shape.polarity_penalty } else { 0.0 };
    let coherence = (agreement.powf(shape.coherence_curve) - penalty).max(0.0);

    PairDisparity {
        tone_error,
        hue_error,
        intensity_gap,
        polarity_mismatch,
        disagreement,
        agreement,
        coherence,
    }
}

fn validated<'a>(
    l_sequence: &'a [ChromaticCell],
    r_sequence: &'a [ChromaticCell],
) -> CtlResult<impl Iterator<Item = (&'a ChromaticCell, &'a ChromaticCell)>> {
    for (index, cell) in l_sequence.iter().enumerate() {
        cell.validate(index)?;
    }
    for (index, cell) in r_sequence.iter().enumerate() {
        cell.validate(index)?;
    }
    if l_sequence.len() != r_sequence.len() {
        tracing::debug!(
            "coupling streams differ in length (L={}, R={}); truncating to {}",
            l_sequence.len(),
            r_sequence.len(),
            l_sequence.len().min(r_sequence.len())
        );
    }
    Ok(l_sequence.iter().zip(r_sequence.iter()))
}

/// Per-pair disparities over the truncated streams.
pub fn pair_disparities(
    l_sequence: &[ChromaticCell],
    r_sequence: &[ChromaticCell],
    config: &CouplingConfig,
) -> CtlResult<Vec<PairDisparity>> {
    Ok(validated(l_sequence, r_sequence)?
        .map(|(l, r)| pair_disparity(l, r, config))
        .collect())
}

fn mean_of(disparities: &[PairDisparity]) -> CouplingMetrics {
    if disparities.is_empty() {
        return CouplingMetrics::default();
    }
    let n = disparities.len() as f64;
    let mean = |f: fn(&PairDisparity) -> f64| disparities.iter().map(f).sum::<f64>() / n;
    CouplingMetrics {
        length: disparities.len(),
        tone_error: mean(|d| d.tone_error),
        hue_error: mean(|d| d.hue_error),
        intensity_gap: mean(|d| d.intensity_gap),
        polarity_mismatch: mean(|d| if d.polarity_mismatch { 1.0 } else { 0.0 }),
        disagreement: mean(|d| d.disagreement),
        agreement: mean(|d| d.agreement),
        coherence: mean(|d| d.coherence),
    }
}

/// Mean disparities; empty input yields zero disparities and unit agreement.
pub fn aggregate_metrics(
    l_sequence: &[ChromaticCell],
    r_sequence: &[ChromaticCell],
    config: &CouplingConfig,
) -> CtlResult<CouplingMetrics> {
    Ok(mean_of(&pair_disparities(l_sequence, r_sequence, config)?))
}

/// Blend R toward L step by step.
///
/// Each step starts from R's own coherence (`coherence.initial` when R
/// carries none) and applies `− decay + boost·agreement` plus a windowed
/// gain, or minus a windowed penalty once the preceding gaps exceed their
/// thresholds on average. Flags count threshold breaches: one is a
/// warning, more is a violation.
pub fn apply_coupling(
    l_sequence: &[ChromaticCell],
    r_sequence: &[ChromaticCell],
    config: &CouplingConfig,
) -> CtlResult<Vec<CoupledStep>> {
    Ok(validated(l_sequence, r_sequence)?
        .scan(CouplingWindow::new(config), |window, (l, r)| {
            Some(window.couple(l, r, &pair_disparity(l, r, config), config))
        })
        .collect())
}

/// Worst gap/threshold ratios of the most recent steps.
struct CouplingWindow {
    ratios: VecDeque<f64>,
    capacity: usize,
}

impl CouplingWindow {
    fn new(config: &CouplingConfig) -> Self {
        let capacity = config.coherence.window.max(1);
        Self {
            ratios: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn mean(&self) -> f64 {
        if self.ratios.is_empty() {
            0.0
        } else {
            self.ratios.iter().sum::<f64>() / self.ratios.len() as f64
        }
    }

    fn push(&mut self, ratio: f64) {
        if self.ratios.len() == self.capacity {
            self.ratios.pop_front();
        }
        self.ratios.push_back(ratio);
    }

    fn couple(
        &mut self,
        l: &ChromaticCell,
        r: &ChromaticCell,
        disparity: &PairDisparity,
        config: &CouplingConfig,
    ) -> CoupledStep {
        let blend = &config.blend;
        let thresholds = &config.thresholds;
        let coherence_cfg = &config.coherence;

        let tone = r.tone.blend_toward(l.tone, blend.tone_weight);
        let hue = r.hue.lerp(l.hue, blend.hue_weight);
        let intensity = (1.0 - blend.intensity_weight) * r.intensity + blend.intensity_weight * l.intensity;

        let polarity = resolve_polarity(l.polarity, r.polarity, disparity.agreement, config);

        let worst_ratio = ratio(disparity.tone_error, thresholds.tone_error_max)
            .max(ratio(disparity.hue_error, thresholds.hue_error_max))
            .max(ratio(disparity.intensity_gap, thresholds.intensity_gap_max));
        let prior = !self.ratios.is_empty();
        let window_penalty = self.mean();
        self.push(worst_ratio);

        let windowed = if !prior {
            0.0
        } else if window_penalty <= 1.0 {
            coherence_cfg.window_gain * (1.0 - window_penalty)
        } else {
            -coherence_cfg.window_penalty * (window_penalty - 1.0)
        };
        let base = r.coherence.unwrap_or(coherence_cfg.initial);
        let coherence = (base - coherence_cfg.decay
            + coherence_cfg.boost_on_agreement * disparity.agreement
            + windowed)
            .clamp(coherence_cfg.min_coherence, 1.0);

        let breaches = [
            disparity.tone_error > thresholds.tone_error_max,
            disparity.hue_error > thresholds.hue_error_max,
            disparity.intensity_gap > thresholds.intensity_gap_max,
            disparity.agreement < thresholds.agreement_min,
            window_penalty > 1.0,
        ]
        .into_iter()
        .filter(|breached| *breached)
        .count();
        let flag = match breaches {
            0 => ConstraintFlag::Ok,
            1 => ConstraintFlag::Warn,
            _ => ConstraintFlag::Violation,
        };

        let cell = ChromaticCell {
            tone,
            hue,
            intensity,
            polarity,
            timestamp: l.timestamp,
            phoneme: None,
            coherence: Some(coherence),
            constraint_flag: Some(flag),
        };
        CoupledStep {
            cell,
            agreement: disparity.agreement,
            window_penalty,
        }
    }
}

/// Prefer L's polarity on disagreement; invert it as well when agreement
/// falls below the minimum.
fn resolve_polarity(l: Polarity, r: Polarity, agreement: f64, config: &CouplingConfig) -> Polarity {
    let rules = &config.polarity;
    if !rules.prefer_consensus || l == r {
        return r;
    }
    if rules.flip_if_conflict && agreement < config.thresholds.agreement_min {
        l.flipped()
    } else {
        l
    }
}

pub fn summarize_coupled(coupled: &[CoupledStep]) -> CoupledSummary {
    if coupled.is_empty() {
        return CoupledSummary::default();
    }
    let n = coupled.len() as f64;
    CoupledSummary {
        length: coupled.len(),
        mean_agreement: coupled.iter().map(|s| s.agreement).sum::<f64>() / n,
        mean_coherence: coupled
            .iter()
            .map(|s| s.cell.coherence.unwrap_or(0.0))
            .sum::<f64>()
            / n,
        warnings: coupled
            .iter()
            .filter(|s| s.cell.flag() == ConstraintFlag::Warn)
            .count(),
        violations: coupled
            .iter()
            .filter(|s| s.cell.flag() == ConstraintFlag::Violation)
            .count(),
    }
}

/// Disparities, aggregate metrics, coupled stream and its summary in one pass.
pub fn process_coupling_sequence(
    l_sequence: &[ChromaticCell],
    r_sequence: &[ChromaticCell],
    config: &CouplingConfig,
) -> CtlResult<CouplingSnapshot> {
    let per_step = pair_disparities(l_sequence, r_sequence, config)?;
    let metrics = mean_of(&per_step);
    let mut window = CouplingWindow::new(config);
    let coupled: Vec<CoupledStep> = l_sequence
        .iter()
        .zip(r_sequence.iter())
        .zip(per_step.iter())
        .map(|((l, r), disparity)| window.couple(l, r, disparity, config))
        .collect();
    let summary = summarize_coupled(&coupled);
    Ok(CouplingSnapshot {
        metrics,
        per_step,
        coupled,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Hue, Tone};
    use crate::error::CtlError;

    fn cell(tone: i64, hue: [u8; 3], intensity: f64, polarity: Polarity) -> ChromaticCell {
        ChromaticCell::new(Tone::new(tone), Hue(hue), intensity, polarity, 0.0)
    }

    #[test]
    fn identical_pair_has_full_agreement() {
        let config = CouplingConfig::default();
        let c = cell(5, [10, 20, 30], 1.2, Polarity::Negative);
        let d = pair_disparity(&c, &c, &config);
        assert_eq!(d.tone_error, 0.0);
        assert_eq!(d.hue_error, 0.0);
        assert_eq!(d.intensity_gap, 0.0);
        assert!(!d.polarity_mismatch);
        assert_eq!(d.agreement, 1.0);
        assert_eq!(d.coherence, 1.0);
    }

    #[test]
    fn disparities_saturate_at_reference_maxima() {
        let config = CouplingConfig::default();
        let l = cell(0, [0, 0, 0], 0.0, Polarity::Positive);
        let r = cell(6, [255, 255, 255], 10.0, Polarity::Negative);
        let d = pair_disparity(&l, &r, &config);
        assert_eq!(d.tone_error, 6.0);
        assert!((d.disagreement - 1.0).abs() < 1e-12);
        assert!(d.agreement.abs() < 1e-12);
        assert_eq!(d.coherence, 0.0);
    }

    #[test]
    fn polarity_mismatch_penalises_coherence() {
        let config = CouplingConfig::default();
        let l = cell(3, [0, 0, 0], 1.0, Polarity::Positive);
        let r = cell(3, [0, 0, 0], 1.0, Polarity::Negative);
        let d = pair_disparity(&l, &r, &config);
        let w = config.weights.normalised();
        assert!((d.agreement - (1.0 - w[3])).abs() < 1e-12);
        let expected = d.agreement.powf(config.nonlinear.coherence_curve) - config.nonlinear.polarity_penalty;
        assert!((d.coherence - expected).abs() < 1e-12);
    }

    #[test]
    fn empty_streams_yield_neutral_metrics() {
        let metrics = aggregate_metrics(&[], &[], &CouplingConfig::default()).unwrap();
        assert_eq!(metrics, CouplingMetrics::default());
        assert_eq!(metrics.agreement, 1.0);
        assert_eq!(metrics.coherence, 1.0);
    }

    #[test]
    fn unequal_streams_truncate_to_shorter() {
        let config = CouplingConfig::default();
        let l = vec![cell(1, [0, 0, 0], 1.0, Polarity::Positive); 5];
        let r = vec![cell(1, [0, 0, 0], 1.0, Polarity::Positive); 3];
        assert_eq!(aggregate_metrics(&l, &r, &config).unwrap().length, 3);
        assert_eq!(apply_coupling(&l, &r, &config).unwrap().len(), 3);
        assert_eq!(process_coupling_sequence(&r, &l, &config).unwrap().coupled.len(), 3);
    }

    #[test]
    fn coupling_blends_toward_observation() {
        let config = CouplingConfig::default();
        let l = vec![cell(4, [200, 0, 0], 2.0, Polarity::Positive)];
        let r = vec![cell(2, [100, 0, 0], 1.0, Polarity::Positive)];
        let coupled = apply_coupling(&l, &r, &config).unwrap();
        let step = &coupled[0];
        // 2 + 0.55·2 = 3.1
        assert_eq!(step.cell.tone.value(), 3);
        assert_eq!(step.cell.hue, Hue::new(125, 0, 0));
        assert!((step.cell.intensity - 1.2).abs() < 1e-12);
        assert_eq!(step.cell.flag(), ConstraintFlag::Ok);
    }

    #[test]
    fn polarity_conflict_prefers_observation() {
        let config = CouplingConfig::default();
        let l = cell(0, [0, 0, 0], 1.0, Polarity::Negative);
        let r = cell(0, [0, 0, 0], 1.0, Polarity::Positive);
        let coupled = apply_coupling(&[l], &[r], &config).unwrap();
        assert_eq!(coupled[0].cell.polarity, Polarity::Negative);
    }

    #[test]
    fn contradiction_reversal_below_agreement_minimum() {
        let config = CouplingConfig::default();
        let l = cell(0, [0, 0, 0], 0.0, Polarity::Negative);
        let r = cell(6, [255, 255, 255], 3.0, Polarity::Positive);
        let coupled = apply_coupling(&[l], &[r], &config).unwrap();
        assert_eq!(coupled[0].cell.polarity, Polarity::Positive);
        assert_eq!(coupled[0].cell.flag(), ConstraintFlag::Violation);
    }

    #[test]
    fn coherence_stays_within_bounds_under_sustained_disagreement() {
        let config = CouplingConfig::default();
        let l = vec![cell(0, [0, 0, 0], 0.0, Polarity::Negative); 20];
        let r = vec![cell(6, [255, 255, 255], 3.0, Polarity::Positive).with_coherence(0.4); 20];
        let coupled = apply_coupling(&l, &r, &config).unwrap();
        let last = coupled.last().and_then(|s| s.cell.coherence).unwrap();
        assert!((last - config.coherence.min_coherence).abs() < 1e-12);
        for step in &coupled {
            let c = step.cell.coherence.unwrap();
            assert!((config.coherence.min_coherence..=1.0).contains(&c));
        }
    }

    #[test]
    fn breach_count_sets_flag() {
        let mut config = CouplingConfig::default();
        config.thresholds.agreement_min = 0.95;
        // Only the polarities differ: agreement 0.9 is the single breach.
        let l = cell(0, [0, 0, 0], 1.0, Polarity::Positive);
        let r = cell(0, [0, 0, 0], 1.0, Polarity::Negative);
        let coupled = apply_coupling(&[l], &[r], &config).unwrap();
        assert_eq!(coupled[0].cell.flag(), ConstraintFlag::Warn);

        // Tone gap 5 exceeds 4; the next step sees a window mean of 1.25.
        let config = CouplingConfig::default();
        let l = vec![cell(0, [0, 0, 0], 1.0, Polarity::Positive); 2];
        let r = vec![cell(5, [0, 0, 0], 1.0, Polarity::Positive); 2];
        let coupled = apply_coupling(&l, &r, &config).unwrap();
        assert_eq!(coupled[0].window_penalty, 0.0);
        assert_eq!(coupled[0].cell.flag(), ConstraintFlag::Warn);
        assert!((coupled[1].window_penalty - 1.25).abs() < 1e-12);
        assert_eq!(coupled[1].cell.flag(), ConstraintFlag::Violation);
    }

    #[test]
    fn single_step_window_does_not_count_current_gap() {
        let mut config = CouplingConfig::default();
        config.coherence.window = 1;
        let l = cell(0, [0, 0, 0], 1.0, Polarity::Positive);
        let r = cell(5, [0, 0, 0], 1.0, Polarity::Positive);
        let coupled = apply_coupling(&[l], &[r], &config).unwrap();
        assert_eq!(coupled[0].cell.flag(), ConstraintFlag::Warn);
    }

    #[test]
    fn coupled_coherence_starts_from_interpretation() {
        let config = CouplingConfig::default();
        let l = vec![cell(0, [0, 0, 0], 1.0, Polarity::Positive); 3];
        let r_at = |coherence: f64| {
            vec![cell(2, [40, 0, 0], 1.4, Polarity::Positive).with_coherence(coherence); 3]
        };

        let low = apply_coupling(&l, &r_at(0.4), &config).unwrap();
        let high = apply_coupling(&l, &r_at(1.0), &config).unwrap();
        for (a, b) in low.iter().zip(&high) {
            let (a, b) = (a.cell.coherence.unwrap(), b.cell.coherence.unwrap());
            assert!(a < b, "{a} should sit below {b}");
        }

        let bare = vec![cell(2, [40, 0, 0], 1.4, Polarity::Positive); 3];
        assert_eq!(apply_coupling(&l, &bare, &config).unwrap(), high);
    }

    #[test]
    fn non_finite_intensity_is_rejected() {
        let config = CouplingConfig::default();
        let mut l = vec![cell(0, [0, 0, 0], 1.0, Polarity::Positive); 3];
        l[1].intensity = f64::NAN;
        let r = vec![cell(0, [0, 0, 0], 1.0, Polarity::Positive); 3];

        for err in [
            apply_coupling(&l, &r, &config).unwrap_err(),
            aggregate_metrics(&r, &l, &config).unwrap_err(),
            process_coupling_sequence(&l, &r, &config).unwrap_err(),
        ] {
            assert!(
                matches!(err, CtlError::ValueDomain { index: 1, attribute: "intensity", .. }),
                "unexpected error: {err}"
            );
        }
    }

    #[test]
    fn snapshot_summary_matches_coupled_stream() {
        let config = CouplingConfig::default();
        let l: Vec<ChromaticCell> = (0..6).map(|i| cell(i, [0, 0, 0], 1.0, Polarity::Positive)).collect();
        let r: Vec<ChromaticCell> = (0..6).map(|i| cell(i + 1, [0, 0, 0], 1.0, Polarity::Positive)).collect();
        let snapshot = process_coupling_sequence(&l, &r, &config).unwrap();
        assert_eq!(snapshot.per_step.len(), 6);
        assert_eq!(snapshot.summary, summarize_coupled(&snapshot.coupled));
        assert_eq!(snapshot.coupled, apply_coupling(&l, &r, &config).unwrap());
        assert_eq!(snapshot.metrics, aggregate_metrics(&l, &r, &config).unwrap());
    }
}
