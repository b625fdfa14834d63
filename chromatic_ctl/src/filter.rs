//! Interpretive filter producing the R stream from the L stream.
//!
//! Each R cell is derived from the previous R cell and the two most recent L
//! cells through a fixed sequence of toggleable stages: tone smoothing, tone
//! prediction, hue expectation, intensity integration, polarity integration,
//! coherence and memory integration, memory snapping and finally the
//! constraint checks that set the cell's [`ConstraintFlag`].

use serde::{Deserialize, Serialize};

use crate::cell::{ChromaticCell, ConstraintFlag, Polarity, Tone};
use crate::config::{FilterConfig, MemoryConfig};
use crate::error::CtlResult;
use crate::memory::{
    match_to_memory_profile, snap_to_nearest_memory_hue, snap_to_nearest_memory_tone,
    update_memory_state, MemoryState,
};

/// Result of a single filter step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub cell: ChromaticCell,
    /// Memory after reinforcement with the current L cell.
    pub memory: MemoryState,
    pub memory_matched: bool,
}

/// R stream plus the memory state left after the last step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRun {
    pub cells: Vec<ChromaticCell>,
    pub memory: MemoryState,
}

impl FilterRun {
    pub fn summary(&self) -> FilterSummary {
        FilterSummary::from_cells(&self.cells)
    }
}

/// Aggregate behaviour of an R stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub length: usize,
    pub mean_tone: f64,
    pub mean_intensity: f64,
    /// Mean over the cells that carry a coherence value.
    pub mean_coherence: f64,
    pub warnings: usize,
    pub violations: usize,
}

impl FilterSummary {
    pub fn from_cells(cells: &[ChromaticCell]) -> Self {
        if cells.is_empty() {
            return Self::default();
        }
        let length = cells.len();
        let n = length as f64;
        let coherences: Vec<f64> = cells.iter().filter_map(|c| c.coherence).collect();
        let mean_coherence = if coherences.is_empty() {
            0.0
        } else {
            coherences.iter().sum::<f64>() / coherences.len() as f64
        };
        Self {
            length,
            mean_tone: cells.iter().map(|c| f64::from(c.tone.value())).sum::<f64>() / n,
            mean_intensity: cells.iter().map(|c| c.intensity).sum::<f64>() / n,
            mean_coherence,
            warnings: cells.iter().filter(|c| c.flag() == ConstraintFlag::Warn).count(),
            violations: cells
                .iter()
                .filter(|c| c.flag() == ConstraintFlag::Violation)
                .count(),
        }
    }
}

/// Number of sign changes between consecutive entries.
pub fn count_flips(history: &[Polarity]) -> usize {
    history.windows(2).filter(|pair| pair[0] != pair[1]).count()
}

#[derive(Debug, Clone, Default)]
pub struct InterpretiveFilter {
    config: FilterConfig,
    memory: MemoryConfig,
}

impl InterpretiveFilter {
    pub fn new(config: FilterConfig, memory: MemoryConfig) -> Self {
        Self { config, memory }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn memory_config(&self) -> &MemoryConfig {
        &self.memory
    }

    /// R[0] from L[0]: tone and hue copied, unit intensity, positive
    /// polarity, default coherence (0.0 when the coherence field is off).
    pub fn init_cell(&self, first: &ChromaticCell) -> ChromaticCell {
        let field = &self.config.coherence_field;
        let coherence = if field.enabled { field.default_value } else { 0.0 };
        ChromaticCell {
            tone: first.tone,
            hue: first.hue,
            intensity: 1.0,
            polarity: Polarity::Positive,
            timestamp: first.timestamp,
            phoneme: None,
            coherence: Some(coherence),
            constraint_flag: Some(ConstraintFlag::Ok),
        }
    }

    /// Compute R[i] from R[i-1], L[i-1] and L[i].
    ///
    /// `flip_history` holds the R polarities emitted so far. The returned
    /// memory has been reinforced with `l_curr` at the new coherence.
    pub fn step(
        &self,
        prev_r: &ChromaticCell,
        l_prev: &ChromaticCell,
        l_curr: &ChromaticCell,
        flip_history: &[Polarity],
        memory: &MemoryState,
    ) -> StepOutcome {
        let cfg = &self.config;
        let mut r = prev_r.clone();
        let mut flag = ConstraintFlag::Ok;

        let smoothed = if cfg.smoothing.enabled {
            prev_r.tone.blend_toward(l_curr.tone, 1.0 - cfg.smoothing.lambda)
        } else {
            prev_r.tone
        };
        r.tone = if cfg.prediction.enabled {
            let trend = if cfg.prediction.cyclic_trend {
                l_prev.tone.signed_offset(l_curr.tone)
            } else {
                i64::from(l_curr.tone.value()) - i64::from(l_prev.tone.value())
            };
            Tone::from_f64(f64::from(smoothed.value()) + cfg.prediction.alpha * trend as f64)
        } else {
            smoothed
        };

        if cfg.hue_expectation.enabled {
            r.hue = prev_r.hue.lerp(l_curr.hue, cfg.hue_expectation.weight);
        }

        if cfg.intensity_integration.enabled {
            let beta = cfg.intensity_integration.beta;
            r.intensity = beta * prev_r.intensity + (1.0 - beta) * l_curr.intensity;
        }

        let polarity = &cfg.polarity_integration;
        if polarity.enabled && polarity.flip_on_input_change && l_curr.polarity != l_prev.polarity {
            r.polarity = prev_r.polarity.flipped();
        }

        r.timestamp = l_curr.timestamp;

        let memory_enabled = cfg.memory_integration.enabled;
        let memory_matched = memory_enabled && match_to_memory_profile(l_curr, memory, &self.memory);

        if cfg.coherence_field.enabled {
            let mut coherence = prev_r.coherence.unwrap_or(cfg.coherence_field.default_value);
            if memory_matched {
                coherence += cfg.memory_integration.coherence_gain;
            }
            let coherence = coherence.clamp(0.0, 1.0);
            r.coherence = Some(coherence);
            r.intensity += coherence * cfg.memory_integration.intensity_gain;
        }

        if memory_enabled {
            r.tone = snap_to_nearest_memory_tone(r.tone, memory, &self.memory);
            r.hue = snap_to_nearest_memory_hue(r.hue, memory, &self.memory);
        }

        if cfg.tone_constraints.enabled {
            let jump = (i16::from(r.tone.value()) - i16::from(prev_r.tone.value())).unsigned_abs();
            if jump > u16::from(cfg.tone_constraints.max_jump) {
                tracing::debug!(
                    "tone jump {} exceeds {} at t={}; reverting to tone {}",
                    jump,
                    cfg.tone_constraints.max_jump,
                    r.timestamp,
                    prev_r.tone
                );
                r.tone = prev_r.tone;
                flag.escalate(ConstraintFlag::Warn);
            }
        }

        if cfg.intensity_constraints.enabled && r.intensity > cfg.intensity_integration.max_value {
            tracing::debug!(
                "intensity {:.3} exceeds ceiling {} at t={}; saturating",
                r.intensity,
                cfg.intensity_integration.max_value,
                r.timestamp
            );
            r.intensity *= cfg.intensity_constraints.saturation_factor;
            flag.escalate(ConstraintFlag::Warn);
        }

        if polarity.enabled {
            let start = flip_history.len().saturating_sub(polarity.flip_window);
            let flips = count_flips(&flip_history[start..]);
            if flips > polarity.max_flips_per_window {
                tracing::debug!(
                    "{} polarity flips in trailing window of {} at t={}; resetting polarity",
                    flips,
                    polarity.flip_window,
                    r.timestamp
                );
                r.polarity = Polarity::Positive;
                flag.escalate(ConstraintFlag::Violation);
            }
        }

        r.constraint_flag = Some(flag);

        let coherence = r.coherence.unwrap_or(0.0);
        let memory = update_memory_state(memory, l_curr, &self.memory, coherence);

        StepOutcome {
            cell: r,
            memory,
            memory_matched,
        }
    }

    /// Filter a whole L stream starting from empty memory.
    pub fn run(&self, l_sequence: &[ChromaticCell]) -> CtlResult<FilterRun> {
        self.run_with_memory(l_sequence, MemoryState::new())
    }

    /// Filter a whole L stream, continuing from an existing memory state.
    ///
    /// Memory is reinforced with L[0] before the first step. Input cells with
    /// non-finite intensity or timestamp are rejected.
    pub fn run_with_memory(
        &self,
        l_sequence: &[ChromaticCell],
        memory: MemoryState,
    ) -> CtlResult<FilterRun> {
        for (index, cell) in l_sequence.iter().enumerate() {
            cell.validate(index)?;
        }

        let Some(first) = l_sequence.first() else {
            return Ok(FilterRun {
                cells: Vec::new(),
                memory,
            });
        };

        let mut prev = self.init_cell(first);
        let mut memory =
            update_memory_state(&memory, first, &self.memory, prev.coherence.unwrap_or(0.0));
        let mut flip_history = Vec::with_capacity(l_sequence.len());
        flip_history.push(prev.polarity);

        let mut cells = Vec::with_capacity(l_sequence.len());
        for pair in l_sequence.windows(2) {
            let outcome = self.step(&prev, &pair[0], &pair[1], &flip_history, &memory);
            cells.push(prev);
            flip_history.push(outcome.cell.polarity);
            memory = outcome.memory;
            prev = outcome.cell;
        }
        cells.push(prev);

        tracing::trace!(
            "filtered {} cells; memory holds {} tone and {} hue peaks (total strength {:.3})",
            cells.len(),
            memory.tone_peaks.len(),
            memory.hue_peaks.len(),
            memory.total_strength()
        );

        Ok(FilterRun { cells, memory })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Hue;
    use crate::error::CtlError;

    fn l_cell(tone: i64, intensity: f64, polarity: Polarity, timestamp: f64) -> ChromaticCell {
        ChromaticCell::new(Tone::new(tone), Hue::new(30, 60, 90), intensity, polarity, timestamp)
    }

    #[test]
    fn init_copies_tone_and_hue() {
        let filter = InterpretiveFilter::default();
        let l0 = l_cell(7, 1.8, Polarity::Negative, 3.0);
        let r0 = filter.init_cell(&l0);
        assert_eq!(r0.tone, l0.tone);
        assert_eq!(r0.hue, l0.hue);
        assert_eq!(r0.intensity, 1.0);
        assert_eq!(r0.polarity, Polarity::Positive);
        assert_eq!(r0.timestamp, 3.0);
        assert_eq!(r0.coherence, Some(1.0));
        assert_eq!(r0.flag(), ConstraintFlag::Ok);
    }

    #[test]
    fn init_without_coherence_field_uses_zero() {
        let mut config = FilterConfig::default();
        config.coherence_field.enabled = false;
        let filter = InterpretiveFilter::new(config, MemoryConfig::default());
        assert_eq!(filter.init_cell(&l_cell(0, 1.0, Polarity::Positive, 0.0)).coherence, Some(0.0));
    }

    #[test]
    fn smoothing_and_prediction_move_toward_input() {
        let filter = InterpretiveFilter::default();
        let l_prev = l_cell(2, 1.0, Polarity::Positive, 0.0);
        let l_curr = l_cell(8, 1.0, Polarity::Positive, 1.0);
        let r_prev = filter.init_cell(&l_prev);

        let outcome = filter.step(&r_prev, &l_prev, &l_curr, &[r_prev.polarity], &MemoryState::new());
        assert_eq!(outcome.cell.tone.value(), 6);
        assert_eq!(outcome.cell.flag(), ConstraintFlag::Ok);
        assert!(outcome.cell.intensity > r_prev.intensity);
        assert_eq!(outcome.cell.timestamp, 1.0);
        assert_eq!(outcome.memory.updates, 1);
    }

    #[test]
    fn cyclic_trend_follows_shortest_arc() {
        let mut config = FilterConfig::default();
        config.smoothing.enabled = false;
        config.prediction.alpha = 1.0;
        config.prediction.cyclic_trend = true;
        config.tone_constraints.enabled = false;
        let filter = InterpretiveFilter::new(config, MemoryConfig::default());
        let l_prev = l_cell(11, 1.0, Polarity::Positive, 0.0);
        let l_curr = l_cell(1, 1.0, Polarity::Positive, 1.0);
        let r_prev = filter.init_cell(&l_prev);
        let outcome = filter.step(&r_prev, &l_prev, &l_curr, &[], &MemoryState::new());
        assert_eq!(outcome.cell.tone.value(), 1);
    }

    #[test]
    fn memory_match_boosts_intensity() {
        let filter = InterpretiveFilter::default();
        let l_prev = l_cell(4, 1.0, Polarity::Negative, 0.0);
        let l_curr = l_cell(4, 1.1, Polarity::Positive, 1.0);
        let r_prev = filter.init_cell(&l_prev);
        let memory = update_memory_state(
            &MemoryState::new(),
            &l_prev,
            filter.memory_config(),
            r_prev.coherence.unwrap_or(1.0),
        );

        let outcome = filter.step(&r_prev, &l_prev, &l_curr, &[r_prev.polarity], &memory);
        assert!(outcome.memory_matched);
        assert!(outcome.cell.intensity > r_prev.intensity);
        assert_eq!(outcome.cell.coherence, Some(1.0));
        assert_eq!(outcome.cell.polarity, Polarity::Negative);
    }

    #[test]
    fn intensity_saturation_warns() {
        let mut config = FilterConfig::default();
        config.intensity_integration.beta = 0.0;
        let filter = InterpretiveFilter::new(config, MemoryConfig::default());
        let l_prev = l_cell(0, 1.0, Polarity::Positive, 0.0);
        let l_curr = l_cell(0, 3.5, Polarity::Positive, 1.0);
        let r_prev = filter.init_cell(&l_prev);
        let outcome = filter.step(&r_prev, &l_prev, &l_curr, &[], &MemoryState::new());
        assert_eq!(outcome.cell.flag(), ConstraintFlag::Warn);
        assert!((outcome.cell.intensity - 3.6 * 0.5).abs() < 1e-9);
    }

    #[test]
    fn flips_are_counted_within_trailing_window_only() {
        let mut config = FilterConfig::default();
        config.polarity_integration.flip_window = 3;
        config.polarity_integration.max_flips_per_window = 1;
        let filter = InterpretiveFilter::new(config, MemoryConfig::default());
        let l = l_cell(0, 1.0, Polarity::Positive, 0.0);
        let r_prev = filter.init_cell(&l);
        use Polarity::{Negative as N, Positive as P};

        let quiet = filter.step(&r_prev, &l, &l, &[P, N, P, N, N, N], &MemoryState::new());
        assert_eq!(quiet.cell.flag(), ConstraintFlag::Ok);
        let noisy = filter.step(&r_prev, &l, &l, &[P, P, P, N, P, N], &MemoryState::new());
        assert_eq!(noisy.cell.flag(), ConstraintFlag::Violation);
    }

    #[test]
    fn run_preserves_length_and_flags_every_cell() {
        let filter = InterpretiveFilter::default();
        let l: Vec<ChromaticCell> = (0..10)
            .map(|i| {
                let polarity = if i % 3 == 0 { Polarity::Negative } else { Polarity::Positive };
                l_cell(i, 1.0 + 0.1 * i as f64, polarity, i as f64)
            })
            .collect();
        let run = filter.run(&l).unwrap();
        assert_eq!(run.cells.len(), l.len());
        assert_eq!(run.memory.updates, l.len() as u64);
        assert!(run.cells.iter().all(|c| c.constraint_flag.is_some()));
        for (r, l) in run.cells.iter().zip(&l) {
            assert_eq!(r.timestamp, l.timestamp);
        }
        assert_eq!(run.summary().length, 10);
    }

    #[test]
    fn run_on_empty_input_keeps_memory() {
        let filter = InterpretiveFilter::default();
        let run = filter.run(&[]).unwrap();
        assert!(run.cells.is_empty());
        assert_eq!(run.memory, MemoryState::new());
    }

    #[test]
    fn run_rejects_non_finite_intensity() {
        let filter = InterpretiveFilter::default();
        let l = vec![
            l_cell(0, 1.0, Polarity::Positive, 0.0),
            l_cell(1, f64::NAN, Polarity::Positive, 1.0),
        ];
        match filter.run(&l) {
            Err(CtlError::ValueDomain { index, attribute, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(attribute, "intensity");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn summary_counts_flags() {
        let mut cells = vec![l_cell(0, 1.0, Polarity::Positive, 0.0); 3];
        cells[1].constraint_flag = Some(ConstraintFlag::Warn);
        cells[2].constraint_flag = Some(ConstraintFlag::Violation);
        cells[2].coherence = Some(0.5);
        let summary = FilterSummary::from_cells(&cells);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.violations, 1);
        assert_eq!(summary.mean_coherence, 0.5);
        assert_eq!(summary.mean_intensity, 1.0);
    }
}
