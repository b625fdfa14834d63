//! # Chromatic Transduction Layer
//!
//! A deterministic, reversible transducer that maps text into chromatic
//! cells (tone, hue, intensity, polarity, timestamp) and back, plus an
//! interpretive filter that tracks the observation stream with a decaying
//! associative memory and a coupling engine that scores how well the two
//! streams agree.
//!
//! ## Quick Start
//!
//! ```rust
//! use chromatic_ctl::{Codec, InterpretiveFilter, CouplingConfig, aggregate_metrics};
//!
//! let codec = Codec::default();
//! let observation = codec.encode("Do NOT stop now!").unwrap();
//! assert_eq!(codec.decode(&observation), "do not stop now!");
//!
//! let run = InterpretiveFilter::default().run(&observation).unwrap();
//! let metrics = aggregate_metrics(&observation, &run.cells, &CouplingConfig::default()).unwrap();
//! assert!((0.0..=1.0).contains(&metrics.agreement));
//! ```
//!
//! ## Core Modules
//!
//! - [`codec`] - Text ↔ cell encoding with fixed lookup tables
//! - [`memory`] - Decaying tone and hue attractor peaks
//! - [`filter`] - Interpretive ("Tensor R") filter
//! - [`coupling`] - L/R disparity metrics and coupled stream
//! - [`fiber`] - Parallel multi-fiber assembly
//! - [`config`] - Typed configuration via TOML or JSON
//! - [`pipeline`] - End-to-end report
//! - [`export`] - JSON line-delimited metric export

pub mod cell;
pub mod codec;
pub mod config;
pub mod coupling;
pub mod error;
pub mod export;
pub mod fiber;
pub mod fidelity;
pub mod filter;
pub mod memory;
pub mod pipeline;

pub use cell::{cells_from_json, ChromaticCell, ConstraintFlag, Hue, Polarity, Tone, TONE_CLASSES};
pub use codec::{word_intensity, word_polarities, Codec, CodecTables};
pub use config::{
    CodecConfig, CouplingConfig, FiberConfig, FilterConfig, MemoryConfig, PipelineConfig,
};
pub use coupling::{
    aggregate_metrics, apply_coupling, pair_disparity, process_coupling_sequence,
    summarize_coupled, CoupledStep, CoupledSummary, CouplingMetrics, CouplingSnapshot,
    PairDisparity,
};
pub use error::{CtlError, CtlResult};
pub use export::export_report;
pub use fiber::{
    aggregate_states, normalize_weights, AssemblyRun, Fiber, FiberOutput, MultiFiberAssembly,
};
pub use fidelity::FidelityReport;
pub use filter::{FilterRun, FilterSummary, InterpretiveFilter, StepOutcome};
pub use memory::{
    match_to_memory_profile, snap_to_nearest_memory_hue, snap_to_nearest_memory_tone,
    update_memory_state, HuePeak, MemoryState, TonePeak,
};
pub use pipeline::{Pipeline, PipelineReport};
