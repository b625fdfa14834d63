//! End-to-end transduction: text → L stream → R stream → coupled stream.

use serde::{Deserialize, Serialize};

use crate::cell::ChromaticCell;
use crate::codec::{Codec, CodecTables};
use crate::config::{CouplingConfig, PipelineConfig};
use crate::coupling::{process_coupling_sequence, CouplingSnapshot};
use crate::error::CtlResult;
use crate::fidelity::FidelityReport;
use crate::fiber::{AssemblyRun, MultiFiberAssembly};
use crate::filter::{FilterRun, FilterSummary, InterpretiveFilter};

/// Serialisable record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub input: String,
    /// `decode(encode(input))`.
    pub decoded: String,
    /// R stream read back through the reverse tone table.
    pub interpreted: String,
    pub observation: Vec<ChromaticCell>,
    pub interpretation: FilterRun,
    pub filter_summary: FilterSummary,
    pub coupling: CouplingSnapshot,
    /// Original cells against the re-encoded decoded text.
    pub fidelity: FidelityReport,
    /// Present when the configuration lists fibers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fibers: Option<AssemblyRun>,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    codec: Codec,
    filter: InterpretiveFilter,
    coupling: CouplingConfig,
    assembly: Option<MultiFiberAssembly>,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig, tables: CodecTables) -> CtlResult<Self> {
        config.validate()?;
        let assembly = if config.fibers.is_empty() {
            None
        } else {
            Some(MultiFiberAssembly::from_config(config)?)
        };
        Ok(Self {
            codec: Codec::new(tables, config.codec.clone()),
            filter: InterpretiveFilter::new(config.filter.clone(), config.memory.clone()),
            coupling: config.coupling.clone(),
            assembly,
        })
    }

    /// Built-in tables with the given configuration.
    pub fn from_config(config: &PipelineConfig) -> CtlResult<Self> {
        Self::new(config, CodecTables::builtin())
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn run(&self, text: &str) -> CtlResult<PipelineReport> {
        let observation = self.codec.encode(text)?;
        let decoded = self.codec.decode(&observation);
        let reencoded = self.codec.encode(&decoded)?;
        let fidelity =
            FidelityReport::measure(&text.to_lowercase(), &decoded, &observation, &reencoded);

        let interpretation = self.filter.run(&observation)?;
        let interpreted = self.codec.decode(&interpretation.cells);
        let filter_summary = interpretation.summary();
        let coupling = process_coupling_sequence(&observation, &interpretation.cells, &self.coupling)?;

        let fibers = match &self.assembly {
            Some(assembly) => Some(assembly.run_full(&observation)?),
            None => None,
        };

        tracing::debug!(
            "pipeline processed {} characters: agreement {:.3}, {} warnings, {} violations",
            observation.len(),
            coupling.summary.mean_agreement,
            coupling.summary.warnings,
            coupling.summary.violations
        );

        Ok(PipelineReport {
            input: text.to_string(),
            decoded,
            interpreted,
            observation,
            interpretation,
            filter_summary,
            coupling,
            fidelity,
            fibers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FiberConfig, FilterConfig, MemoryConfig};

    #[test]
    fn report_covers_every_stage() {
        let pipeline = Pipeline::from_config(&PipelineConfig::default()).unwrap();
        let report = pipeline.run("The quick brown fox").unwrap();
        assert_eq!(report.decoded, "the quick brown fox");
        assert_eq!(report.observation.len(), 19);
        assert_eq!(report.interpretation.cells.len(), 19);
        assert_eq!(report.interpreted.chars().count(), 19);
        assert_eq!(report.coupling.coupled.len(), 19);
        assert_eq!(report.filter_summary.length, 19);
        assert_eq!(report.fidelity.levenshtein_distance, 0);
        assert!(report.fibers.is_none());
    }

    #[test]
    fn lowercasing_shows_up_as_intensity_loss() {
        let pipeline = Pipeline::from_config(&PipelineConfig::default()).unwrap();
        let report = pipeline.run("LOUD words").unwrap();
        assert_eq!(report.fidelity.token_retention, 1.0);
        assert!(report.fidelity.intensity_loss > 0.0);
        assert_eq!(report.fidelity.temporal_drift, 0.0);
    }

    #[test]
    fn configured_fibers_are_run() {
        let mut config = PipelineConfig::default();
        config.fibers = vec![
            FiberConfig::new("a", FilterConfig::default(), MemoryConfig::default()),
            FiberConfig::new("b", FilterConfig::default(), MemoryConfig::default()),
        ];
        let pipeline = Pipeline::from_config(&config).unwrap();
        let report = pipeline.run("not bad at all").unwrap();
        let fibers = report.fibers.unwrap();
        assert_eq!(fibers.fibers.len(), 2);
        assert_eq!(fibers.aggregated, report.interpretation.cells);
    }

    #[test]
    fn empty_text_produces_empty_report() {
        let pipeline = Pipeline::from_config(&PipelineConfig::default()).unwrap();
        let report = pipeline.run("").unwrap();
        assert!(report.observation.is_empty());
        assert_eq!(report.coupling.metrics.agreement, 1.0);
        assert!(report.fidelity.is_lossless());
    }
}
