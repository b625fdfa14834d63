//! Multi-fiber assembly: several interpretive filters over one L stream.
//!
//! Each fiber owns its filter configuration and an isolated memory state.
//! Fibers never read each other's state, so they run in parallel on the
//! rayon pool and only meet again at aggregation.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cell::{ChromaticCell, ConstraintFlag, Hue, Polarity, Tone};
use crate::config::{CouplingConfig, FiberConfig, PipelineConfig};
use crate::coupling::{aggregate_metrics, process_coupling_sequence, CouplingMetrics, CouplingSnapshot};
use crate::error::{CtlError, CtlResult};
use crate::filter::{FilterSummary, InterpretiveFilter};
use crate::memory::MemoryState;

/// Name given to the single fiber built from the top-level filter section.
pub const PRIMARY_FIBER: &str = "primary";

/// Resultant length below which a circular tone mean is undefined.
const MIN_RESULTANT: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct Fiber {
    name: String,
    filter: InterpretiveFilter,
}

impl Fiber {
    pub fn new(name: impl Into<String>, filter: InterpretiveFilter) -> Self {
        Self {
            name: name.into(),
            filter,
        }
    }

    pub fn from_config(config: &FiberConfig) -> Self {
        Self::new(
            config.name.clone(),
            InterpretiveFilter::new(config.filter.clone(), config.memory.clone()),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(&self, l_sequence: &[ChromaticCell]) -> CtlResult<FiberOutput> {
        let run = self.filter.run(l_sequence)?;
        let summary = run.summary();
        tracing::debug!(
            "fiber '{}' produced {} cells ({} warnings, {} violations)",
            self.name,
            summary.length,
            summary.warnings,
            summary.violations
        );
        Ok(FiberOutput {
            name: self.name.clone(),
            cells: run.cells,
            memory: run.memory,
            summary,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiberOutput {
    pub name: String,
    pub cells: Vec<ChromaticCell>,
    pub memory: MemoryState,
    pub summary: FilterSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiberMetrics {
    pub name: String,
    pub metrics: CouplingMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiberSnapshot {
    pub name: String,
    pub snapshot: CouplingSnapshot,
}

/// Output of [`MultiFiberAssembly::run_full`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyRun {
    pub fibers: Vec<FiberOutput>,
    pub weights: Vec<f64>,
    pub aggregated: Vec<ChromaticCell>,
    /// Empty when the assembly has no coupling configuration.
    pub fiber_metrics: Vec<FiberMetrics>,
    pub aggregate_metrics: Option<CouplingMetrics>,
}

#[derive(Debug, Clone)]
pub struct MultiFiberAssembly {
    fibers: Vec<Fiber>,
    weights: Option<Vec<f64>>,
    coupling: Option<CouplingConfig>,
}

impl MultiFiberAssembly {
    pub fn new(fibers: Vec<Fiber>, weights: Option<Vec<f64>>, coupling: Option<CouplingConfig>) -> Self {
        Self {
            fibers,
            weights,
            coupling,
        }
    }

    /// Build from the `fibers` section, falling back to one fiber over the
    /// top-level filter and memory sections when none are listed.
    pub fn from_config(config: &PipelineConfig) -> CtlResult<Self> {
        config.validate()?;
        let fibers = if config.fibers.is_empty() {
            vec![Fiber::new(
                PRIMARY_FIBER,
                InterpretiveFilter::new(config.filter.clone(), config.memory.clone()),
            )]
        } else {
            config.fibers.iter().map(Fiber::from_config).collect()
        };
        Ok(Self::new(
            fibers,
            config.fiber_weights.clone(),
            Some(config.coupling.clone()),
        ))
    }

    pub fn fibers(&self) -> &[Fiber] {
        &self.fibers
    }

    pub fn resolved_weights(&self) -> Vec<f64> {
        normalize_weights(self.weights.as_deref(), self.fibers.len())
    }

    /// Run every fiber against the shared L stream in parallel.
    pub fn run_fibers(&self, l_sequence: &[ChromaticCell]) -> CtlResult<Vec<FiberOutput>> {
        self.fibers
            .par_iter()
            .map(|fiber| fiber.run(l_sequence))
            .collect()
    }

    pub fn aggregate(&self, outputs: &[FiberOutput]) -> CtlResult<Vec<ChromaticCell>> {
        let streams: Vec<&[ChromaticCell]> = outputs.iter().map(|o| o.cells.as_slice()).collect();
        aggregate_states(&streams, &self.resolved_weights())
    }

    /// Coupling metrics of each fiber against L; empty without coupling config.
    pub fn summarize_fibers(
        &self,
        l_sequence: &[ChromaticCell],
        outputs: &[FiberOutput],
    ) -> CtlResult<Vec<FiberMetrics>> {
        match &self.coupling {
            Some(coupling) => summarize_fibers(l_sequence, outputs, coupling),
            None => Ok(Vec::new()),
        }
    }

    pub fn compare_aggregated_to_l(
        &self,
        l_sequence: &[ChromaticCell],
        aggregated: &[ChromaticCell],
    ) -> CtlResult<Option<CouplingMetrics>> {
        self.coupling
            .as_ref()
            .map(|coupling| aggregate_metrics(l_sequence, aggregated, coupling))
            .transpose()
    }

    pub fn couple_fiber_snapshots(
        &self,
        l_sequence: &[ChromaticCell],
        outputs: &[FiberOutput],
    ) -> CtlResult<Vec<FiberSnapshot>> {
        match &self.coupling {
            Some(coupling) => couple_fiber_snapshots(l_sequence, outputs, coupling),
            None => Ok(Vec::new()),
        }
    }

    /// Run fibers, aggregate them and compute the coupling summaries.
    pub fn run_full(&self, l_sequence: &[ChromaticCell]) -> CtlResult<AssemblyRun> {
        let fibers = self.run_fibers(l_sequence)?;
        let aggregated = self.aggregate(&fibers)?;
        let fiber_metrics = self.summarize_fibers(l_sequence, &fibers)?;
        let aggregate_metrics = self.compare_aggregated_to_l(l_sequence, &aggregated)?;
        Ok(AssemblyRun {
            fibers,
            weights: self.resolved_weights(),
            aggregated,
            fiber_metrics,
            aggregate_metrics,
        })
    }
}

/// Uniform weights when absent, mismatched in count or without positive
/// mass; otherwise negatives are clamped to zero and the rest normalised.
pub fn normalize_weights(weights: Option<&[f64]>, count: usize) -> Vec<f64> {
    let count = count.max(1);
    let uniform = vec![1.0 / count as f64; count];
    let Some(weights) = weights.filter(|w| w.len() == count) else {
        return uniform;
    };
    let clamped: Vec<f64> = weights
        .iter()
        .map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 })
        .collect();
    let total: f64 = clamped.iter().sum();
    if total <= 0.0 {
        return uniform;
    }
    clamped.into_iter().map(|w| w / total).collect()
}

/// Combine equal-length fiber streams cell by cell.
pub fn aggregate_states(streams: &[&[ChromaticCell]], weights: &[f64]) -> CtlResult<Vec<ChromaticCell>> {
    let Some(first) = streams.first() else {
        return Ok(Vec::new());
    };
    let expected = first.len();
    if let Some(other) = streams.iter().find(|s| s.len() != expected) {
        return Err(CtlError::shape("fiber aggregation", expected, other.len()));
    }
    if weights.len() != streams.len() {
        return Err(CtlError::shape("fiber weights", streams.len(), weights.len()));
    }

    let mut aggregated = Vec::with_capacity(expected);
    let mut column = Vec::with_capacity(streams.len());
    for idx in 0..expected {
        column.clear();
        column.extend(streams.iter().map(|stream| &stream[idx]));
        aggregated.push(aggregate_cells(&column, weights));
    }
    Ok(aggregated)
}

fn aggregate_cells(cells: &[&ChromaticCell], weights: &[f64]) -> ChromaticCell {
    let first = cells[0];

    let (sin, cos) = cells.iter().zip(weights).fold((0.0, 0.0), |(s, c), (cell, w)| {
        let angle = cell.tone.angle();
        (s + w * angle.sin(), c + w * angle.cos())
    });
    let tone = if sin.hypot(cos) < MIN_RESULTANT {
        first.tone
    } else {
        Tone::from_angle(sin.atan2(cos))
    };

    let mut hue = [0.0; 3];
    let mut intensity = 0.0;
    let mut vote = 0.0;
    let mut coherence = (0.0, 0.0);
    let mut flag = ConstraintFlag::Ok;
    for (cell, w) in cells.iter().zip(weights) {
        for (acc, channel) in hue.iter_mut().zip(cell.hue.channels()) {
            *acc += w * channel;
        }
        intensity += w * cell.intensity;
        vote += w * f64::from(cell.polarity.value());
        if let Some(value) = cell.coherence {
            coherence.0 += w * value;
            coherence.1 += w;
        }
        flag.escalate(cell.flag());
    }

    let polarity = if cells.iter().all(|c| c.polarity == first.polarity) {
        first.polarity
    } else if vote >= 0.0 {
        Polarity::Positive
    } else {
        Polarity::Negative
    };
    let coherence = (coherence.1 > 0.0).then(|| coherence.0 / coherence.1);

    ChromaticCell {
        tone,
        hue: Hue::from_channels(hue),
        intensity,
        polarity,
        timestamp: first.timestamp,
        phoneme: first.phoneme,
        coherence,
        constraint_flag: Some(flag),
    }
}

pub fn summarize_fibers(
    l_sequence: &[ChromaticCell],
    outputs: &[FiberOutput],
    coupling: &CouplingConfig,
) -> CtlResult<Vec<FiberMetrics>> {
    outputs
        .iter()
        .map(|output| {
            Ok(FiberMetrics {
                name: output.name.clone(),
                metrics: aggregate_metrics(l_sequence, &output.cells, coupling)?,
            })
        })
        .collect()
}

pub fn couple_fiber_snapshots(
    l_sequence: &[ChromaticCell],
    outputs: &[FiberOutput],
    coupling: &CouplingConfig,
) -> CtlResult<Vec<FiberSnapshot>> {
    outputs
        .iter()
        .map(|output| {
            Ok(FiberSnapshot {
                name: output.name.clone(),
                snapshot: process_coupling_sequence(l_sequence, &output.cells, coupling)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterConfig, MemoryConfig};

    fn r_cell(tone: i64, hue: [u8; 3], intensity: f64, polarity: Polarity) -> ChromaticCell {
        ChromaticCell::new(Tone::new(tone), Hue(hue), intensity, polarity, tone as f64)
            .with_coherence(0.5)
    }

    fn l_stream() -> Vec<ChromaticCell> {
        (0..8)
            .map(|i| {
                let polarity = if i % 3 == 0 { Polarity::Negative } else { Polarity::Positive };
                ChromaticCell::new(Tone::new(i * 2), Hue::new(30, 60, 90), 1.0, polarity, i as f64)
            })
            .collect()
    }

    #[test]
    fn weights_fall_back_to_uniform() {
        assert_eq!(normalize_weights(None, 4), vec![0.25; 4]);
        assert_eq!(normalize_weights(Some(&[1.0, 2.0][..]), 3), vec![1.0 / 3.0; 3]);
        assert_eq!(normalize_weights(Some(&[0.0, -1.0][..]), 2), vec![0.5, 0.5]);
        assert_eq!(normalize_weights(Some(&[3.0, -1.0, 1.0][..]), 3), vec![0.75, 0.0, 0.25]);
        assert_eq!(normalize_weights(None, 0), vec![1.0]);
    }

    #[test]
    fn circular_mean_wraps_across_zero() {
        let a = [r_cell(11, [0, 0, 0], 1.0, Polarity::Positive)];
        let b = [r_cell(1, [0, 0, 0], 1.0, Polarity::Positive)];
        let aggregated = aggregate_states(&[&a[..], &b[..]], &[0.5, 0.5]).unwrap();
        assert_eq!(aggregated[0].tone.value(), 0);
    }

    #[test]
    fn opposite_tones_keep_first_fiber() {
        let a = [r_cell(3, [0, 0, 0], 1.0, Polarity::Positive)];
        let b = [r_cell(9, [0, 0, 0], 1.0, Polarity::Positive)];
        let aggregated = aggregate_states(&[&a[..], &b[..]], &[0.5, 0.5]).unwrap();
        assert_eq!(aggregated[0].tone.value(), 3);
    }

    #[test]
    fn polarity_vote_ties_favour_positive() {
        let a = [r_cell(0, [0, 0, 0], 1.0, Polarity::Positive)];
        let b = [r_cell(0, [0, 0, 0], 1.0, Polarity::Negative)];
        let tied = aggregate_states(&[&a[..], &b[..]], &[0.5, 0.5]).unwrap();
        assert_eq!(tied[0].polarity, Polarity::Positive);
        let outvoted = aggregate_states(&[&a[..], &b[..]], &[0.25, 0.75]).unwrap();
        assert_eq!(outvoted[0].polarity, Polarity::Negative);
    }

    #[test]
    fn aggregation_takes_worst_flag_and_weighted_means() {
        let a = [r_cell(0, [0, 100, 200], 1.0, Polarity::Positive)];
        let mut b = [r_cell(0, [100, 100, 0], 3.0, Polarity::Positive)];
        b[0].constraint_flag = Some(ConstraintFlag::Warn);
        let aggregated = aggregate_states(&[&a[..], &b[..]], &[0.5, 0.5]).unwrap();
        assert_eq!(aggregated[0].hue, Hue::new(50, 100, 100));
        assert_eq!(aggregated[0].intensity, 2.0);
        assert_eq!(aggregated[0].coherence, Some(0.5));
        assert_eq!(aggregated[0].flag(), ConstraintFlag::Warn);
    }

    #[test]
    fn unequal_fiber_lengths_are_rejected() {
        let a = vec![r_cell(0, [0, 0, 0], 1.0, Polarity::Positive); 3];
        let b = vec![r_cell(0, [0, 0, 0], 1.0, Polarity::Positive); 2];
        let err = aggregate_states(&[&a[..], &b[..]], &[0.5, 0.5]).unwrap_err();
        assert!(matches!(err, CtlError::SequenceShape { expected: 3, got: 2, .. }));
    }

    #[test]
    fn fibers_keep_isolated_memory() {
        let mut fast = FiberConfig::new("fast", FilterConfig::default(), MemoryConfig::default());
        fast.memory.tone.decay = 0.5;
        let slow = FiberConfig::new("slow", FilterConfig::default(), MemoryConfig::default());
        let assembly = MultiFiberAssembly::new(
            vec![Fiber::from_config(&fast), Fiber::from_config(&slow)],
            None,
            None,
        );
        let outputs = assembly.run_fibers(&l_stream()).unwrap();
        assert_eq!(outputs[0].name, "fast");
        assert_eq!(outputs[1].name, "slow");
        assert_ne!(outputs[0].memory, outputs[1].memory);
        assert_eq!(outputs[0].memory.updates, 8);
        assert_eq!(outputs[1].memory.updates, 8);
    }

    #[test]
    fn run_full_without_coupling_skips_metrics() {
        let filter = InterpretiveFilter::new(FilterConfig::default(), MemoryConfig::default());
        let assembly = MultiFiberAssembly::new(vec![Fiber::new("only", filter)], None, None);
        let run = assembly.run_full(&l_stream()).unwrap();
        assert_eq!(run.aggregated.len(), 8);
        assert!(run.fiber_metrics.is_empty());
        assert!(run.aggregate_metrics.is_none());
        assert_eq!(run.weights, vec![1.0]);
    }

    #[test]
    fn from_config_without_fibers_builds_primary() {
        let assembly = MultiFiberAssembly::from_config(&PipelineConfig::default()).unwrap();
        assert_eq!(assembly.fibers().len(), 1);
        assert_eq!(assembly.fibers()[0].name(), PRIMARY_FIBER);
        let l = l_stream();
        let run = assembly.run_full(&l).unwrap();
        assert_eq!(run.fiber_metrics.len(), 1);
        assert!(run.aggregate_metrics.is_some());
        let snapshots = assembly.couple_fiber_snapshots(&l, &run.fibers).unwrap();
        assert_eq!(snapshots[0].snapshot.coupled.len(), l.len());
    }
}
