//! Transduction configuration loaded from TOML or JSON with documented defaults.
//!
//! Every section mirrors one component and every key has a default, so an
//! empty document yields [`PipelineConfig::default`]. Values are checked by
//! `validate` after parsing; out-of-domain values surface as
//! [`CtlError::Configuration`] naming the dotted key.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cell::Polarity;
use crate::error::{CtlError, CtlResult};

/// Top-level configuration for a full transduction run.
///
/// # Examples
///
/// ```
/// use chromatic_ctl::PipelineConfig;
///
/// let config = PipelineConfig::from_toml_str("[filter.smoothing]\nlambda = 0.5").unwrap();
/// assert_eq!(config.filter.smoothing.lambda, 0.5);
/// assert_eq!(config.filter.prediction.alpha, 0.25);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub codec: CodecConfig,
    pub filter: FilterConfig,
    pub memory: MemoryConfig,
    pub coupling: CouplingConfig,
    /// Fiber definitions for multi-fiber runs; empty for single-filter use.
    pub fibers: Vec<FiberConfig>,
    /// Optional aggregation weights, one per fiber.
    pub fiber_weights: Option<Vec<f64>>,
}

impl PipelineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> CtlResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(toml_str: &str) -> CtlResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from an in-memory nested mapping.
    pub fn from_json_value(value: Value) -> CtlResult<Self> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CtlResult<()> {
        self.codec.validate()?;
        self.filter.validate()?;
        self.memory.validate()?;
        self.coupling.validate()?;
        for (idx, fiber) in self.fibers.iter().enumerate() {
            fiber
                .validate()
                .map_err(|err| prefix_key(err, &format!("fibers[{idx}]")))?;
        }
        if let Some(weights) = &self.fiber_weights {
            for (idx, weight) in weights.iter().enumerate() {
                if !weight.is_finite() {
                    return Err(CtlError::config(
                        format!("fiber_weights[{idx}]"),
                        "must be finite",
                    ));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------- codec

/// Word-level polarity rules used by the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Tokens that open a negation window (compared lowercased, trailing
    /// `.,!?` stripped). Tokens ending in `n't` always qualify.
    pub not_words: Vec<String>,
    /// Number of tokens following a trigger whose polarity is inverted.
    pub negation_window: usize,
    /// Also invert the triggering token itself.
    pub include_trigger: bool,
    pub default_polarity: Polarity,
    /// Polarity forced onto a token that ends a question.
    pub question_polarity: Polarity,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            not_words: [
                "not", "no", "never", "none", "nothing", "nobody", "neither", "nor", "nowhere",
                "cannot",
            ]
            .iter()
            .map(|word| word.to_string())
            .collect(),
            negation_window: 3,
            include_trigger: false,
            default_polarity: Polarity::Positive,
            question_polarity: Polarity::Neutral,
        }
    }
}

impl CodecConfig {
    pub fn validate(&self) -> CtlResult<()> {
        if self.default_polarity == Polarity::Neutral {
            return Err(CtlError::config(
                "codec.default_polarity",
                "must be +1 or -1 so negation can invert it",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------- filter

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub enabled: bool,
    /// Weight kept on the previous interpretation tone.
    pub lambda: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lambda: 0.65,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub enabled: bool,
    pub alpha: f64,
    /// Use the shortest-arc tone trend instead of the plain difference.
    pub cyclic_trend: bool,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: 0.25,
            cyclic_trend: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HueExpectationConfig {
    pub enabled: bool,
    /// Fraction of the observed hue blended in each step.
    pub weight: f64,
}

impl Default for HueExpectationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntensityIntegrationConfig {
    pub enabled: bool,
    pub beta: f64,
    /// Saturation ceiling checked by the intensity constraint.
    pub max_value: f64,
}

impl Default for IntensityIntegrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            beta: 0.85,
            max_value: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolarityIntegrationConfig {
    pub enabled: bool,
    pub flip_on_input_change: bool,
    pub max_flips_per_window: usize,
    pub flip_window: usize,
}

impl Default for PolarityIntegrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flip_on_input_change: true,
            max_flips_per_window: 4,
            flip_window: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryIntegrationConfig {
    pub enabled: bool,
    pub coherence_gain: f64,
    pub intensity_gain: f64,
}

impl Default for MemoryIntegrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            coherence_gain: 0.2,
            intensity_gain: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConstraintConfig {
    pub enabled: bool,
    pub max_jump: u8,
}

impl Default for ToneConstraintConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_jump: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntensityConstraintConfig {
    pub enabled: bool,
    pub saturation_factor: f64,
}

impl Default for IntensityConstraintConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            saturation_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoherenceFieldConfig {
    pub enabled: bool,
    pub default_value: f64,
}

impl Default for CoherenceFieldConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_value: 1.0,
        }
    }
}

/// Per-stage toggles and parameters for the interpretive filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub smoothing: SmoothingConfig,
    pub prediction: PredictionConfig,
    pub hue_expectation: HueExpectationConfig,
    pub intensity_integration: IntensityIntegrationConfig,
    pub polarity_integration: PolarityIntegrationConfig,
    pub memory_integration: MemoryIntegrationConfig,
    pub tone_constraints: ToneConstraintConfig,
    pub intensity_constraints: IntensityConstraintConfig,
    pub coherence_field: CoherenceFieldConfig,
}

impl FilterConfig {
    pub fn validate(&self) -> CtlResult<()> {
        check_unit("filter.smoothing.lambda", self.smoothing.lambda)?;
        check_finite("filter.prediction.alpha", self.prediction.alpha)?;
        check_unit("filter.hue_expectation.weight", self.hue_expectation.weight)?;
        check_unit("filter.intensity_integration.beta", self.intensity_integration.beta)?;
        check_positive(
            "filter.intensity_integration.max_value",
            self.intensity_integration.max_value,
        )?;
        check_finite(
            "filter.memory_integration.coherence_gain",
            self.memory_integration.coherence_gain,
        )?;
        check_finite(
            "filter.memory_integration.intensity_gain",
            self.memory_integration.intensity_gain,
        )?;
        if self.tone_constraints.max_jump > 11 {
            return Err(CtlError::config(
                "filter.tone_constraints.max_jump",
                "must be at most 11",
            ));
        }
        let factor = self.intensity_constraints.saturation_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(CtlError::config(
                "filter.intensity_constraints.saturation_factor",
                "must be in (0, 1]",
            ));
        }
        check_unit(
            "filter.coherence_field.default_value",
            self.coherence_field.default_value,
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------- memory

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TonePeakConfig {
    pub decay: f64,
    pub min_strength: f64,
    pub reinforce_gain: f64,
    /// Cyclic distance within which an observation reinforces a peak.
    pub min_separation: u8,
    pub max_peaks: usize,
}

impl Default for TonePeakConfig {
    fn default() -> Self {
        Self {
            decay: 0.02,
            min_strength: 0.05,
            reinforce_gain: 0.25,
            min_separation: 2,
            max_peaks: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuePeakConfig {
    pub decay: f64,
    pub min_strength: f64,
    pub reinforce_gain: f64,
    /// Mean channel distance within which an observation reinforces a peak.
    pub min_distance: f64,
    pub max_peaks: usize,
}

impl Default for HuePeakConfig {
    fn default() -> Self {
        Self {
            decay: 0.02,
            min_strength: 0.05,
            reinforce_gain: 0.2,
            min_distance: 15.0,
            max_peaks: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub intensity_weight: f64,
    pub coherence_bias: f64,
    pub tone_tolerance: u8,
    pub hue_tolerance: f64,
    pub min_match_strength: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            intensity_weight: 0.2,
            coherence_bias: 0.1,
            tone_tolerance: 2,
            hue_tolerance: 25.0,
            min_match_strength: 0.12,
        }
    }
}

/// Peak maintenance and matching parameters for the reinforcement memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub tone: TonePeakConfig,
    pub hue: HuePeakConfig,
    pub matching: MatchingConfig,
}

impl MemoryConfig {
    pub fn validate(&self) -> CtlResult<()> {
        check_unit("memory.tone.decay", self.tone.decay)?;
        check_non_negative("memory.tone.min_strength", self.tone.min_strength)?;
        check_non_negative("memory.tone.reinforce_gain", self.tone.reinforce_gain)?;
        check_unit("memory.hue.decay", self.hue.decay)?;
        check_non_negative("memory.hue.min_strength", self.hue.min_strength)?;
        check_non_negative("memory.hue.reinforce_gain", self.hue.reinforce_gain)?;
        check_non_negative("memory.hue.min_distance", self.hue.min_distance)?;
        check_finite("memory.matching.intensity_weight", self.matching.intensity_weight)?;
        check_finite("memory.matching.coherence_bias", self.matching.coherence_bias)?;
        check_non_negative("memory.matching.hue_tolerance", self.matching.hue_tolerance)?;
        check_non_negative(
            "memory.matching.min_match_strength",
            self.matching.min_match_strength,
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------- coupling

/// Relative importance of each attribute in the disagreement score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplingWeights {
    pub tone_alignment: f64,
    pub hue_alignment: f64,
    pub intensity_alignment: f64,
    pub polarity_alignment: f64,
}

impl Default for CouplingWeights {
    fn default() -> Self {
        Self {
            tone_alignment: 0.45,
            hue_alignment: 0.25,
            intensity_alignment: 0.2,
            polarity_alignment: 0.1,
        }
    }
}

impl CouplingWeights {
    /// Weights scaled to sum to one; uniform when they sum to zero.
    pub fn normalised(&self) -> [f64; 4] {
        let raw = [
            self.tone_alignment,
            self.hue_alignment,
            self.intensity_alignment,
            self.polarity_alignment,
        ];
        let sum: f64 = raw.iter().sum();
        if sum <= f64::EPSILON {
            [0.25; 4]
        } else {
            raw.map(|w| w / sum)
        }
    }
}

/// Gap values treated as maximal disagreement for each attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub tone_max: f64,
    pub hue_max: f64,
    pub intensity_max: f64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            tone_max: 6.0,
            hue_max: 100.0,
            intensity_max: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonlinearConfig {
    pub tone_exponent: f64,
    pub hue_exponent: f64,
    pub intensity_exponent: f64,
    /// Exponent mapping agreement onto coherence.
    pub coherence_curve: f64,
    /// Fixed coherence reduction applied on polarity disagreement.
    pub polarity_penalty: f64,
}

impl Default for NonlinearConfig {
    fn default() -> Self {
        Self {
            tone_exponent: 1.5,
            hue_exponent: 1.25,
            intensity_exponent: 1.0,
            coherence_curve: 1.5,
            polarity_penalty: 0.15,
        }
    }
}

/// Weight given to the observation when blending each attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    pub tone_weight: f64,
    pub hue_weight: f64,
    pub intensity_weight: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            tone_weight: 0.55,
            hue_weight: 0.25,
            intensity_weight: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub tone_error_max: f64,
    pub hue_error_max: f64,
    pub intensity_gap_max: f64,
    pub agreement_min: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            tone_error_max: 4.0,
            hue_error_max: 50.0,
            intensity_gap_max: 1.5,
            agreement_min: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplingCoherenceConfig {
    /// Coherence assumed for interpretation cells that carry none.
    pub initial: f64,
    pub min_coherence: f64,
    pub decay: f64,
    pub boost_on_agreement: f64,
    /// Number of trailing steps in the disparity window.
    pub window: usize,
    pub window_gain: f64,
    pub window_penalty: f64,
}

impl Default for CouplingCoherenceConfig {
    fn default() -> Self {
        Self {
            initial: 1.0,
            min_coherence: 0.35,
            decay: 0.05,
            boost_on_agreement: 0.08,
            window: 5,
            window_gain: 0.04,
            window_penalty: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplingPolarityConfig {
    pub prefer_consensus: bool,
    pub flip_if_conflict: bool,
}

impl Default for CouplingPolarityConfig {
    fn default() -> Self {
        Self {
            prefer_consensus: true,
            flip_if_conflict: true,
        }
    }
}

/// Disparity, blending and flagging parameters for the coupling engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplingConfig {
    pub weights: CouplingWeights,
    pub reference: ReferenceConfig,
    pub nonlinear: NonlinearConfig,
    pub blend: BlendConfig,
    pub thresholds: ThresholdConfig,
    pub coherence: CouplingCoherenceConfig,
    pub polarity: CouplingPolarityConfig,
}

impl CouplingConfig {
    pub fn validate(&self) -> CtlResult<()> {
        check_non_negative("coupling.weights.tone_alignment", self.weights.tone_alignment)?;
        check_non_negative("coupling.weights.hue_alignment", self.weights.hue_alignment)?;
        check_non_negative(
            "coupling.weights.intensity_alignment",
            self.weights.intensity_alignment,
        )?;
        check_non_negative(
            "coupling.weights.polarity_alignment",
            self.weights.polarity_alignment,
        )?;
        check_positive("coupling.reference.tone_max", self.reference.tone_max)?;
        check_positive("coupling.reference.hue_max", self.reference.hue_max)?;
        check_positive("coupling.reference.intensity_max", self.reference.intensity_max)?;
        check_exponent("coupling.nonlinear.tone_exponent", self.nonlinear.tone_exponent)?;
        check_exponent("coupling.nonlinear.hue_exponent", self.nonlinear.hue_exponent)?;
        check_exponent(
            "coupling.nonlinear.intensity_exponent",
            self.nonlinear.intensity_exponent,
        )?;
        check_exponent("coupling.nonlinear.coherence_curve", self.nonlinear.coherence_curve)?;
        check_unit("coupling.nonlinear.polarity_penalty", self.nonlinear.polarity_penalty)?;
        check_unit("coupling.blend.tone_weight", self.blend.tone_weight)?;
        check_unit("coupling.blend.hue_weight", self.blend.hue_weight)?;
        check_unit("coupling.blend.intensity_weight", self.blend.intensity_weight)?;
        check_positive("coupling.thresholds.tone_error_max", self.thresholds.tone_error_max)?;
        check_positive("coupling.thresholds.hue_error_max", self.thresholds.hue_error_max)?;
        check_positive(
            "coupling.thresholds.intensity_gap_max",
            self.thresholds.intensity_gap_max,
        )?;
        check_unit("coupling.thresholds.agreement_min", self.thresholds.agreement_min)?;
        check_unit("coupling.coherence.initial", self.coherence.initial)?;
        check_unit("coupling.coherence.min_coherence", self.coherence.min_coherence)?;
        check_finite("coupling.coherence.decay", self.coherence.decay)?;
        check_finite(
            "coupling.coherence.boost_on_agreement",
            self.coherence.boost_on_agreement,
        )?;
        check_finite("coupling.coherence.window_gain", self.coherence.window_gain)?;
        check_finite("coupling.coherence.window_penalty", self.coherence.window_penalty)?;
        if self.coherence.window == 0 {
            return Err(CtlError::config("coupling.coherence.window", "must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------- fibers

/// One independently configured interpretive filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiberConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl FiberConfig {
    pub fn new(name: impl Into<String>, filter: FilterConfig, memory: MemoryConfig) -> Self {
        Self {
            name: name.into(),
            filter,
            memory,
        }
    }

    pub fn validate(&self) -> CtlResult<()> {
        if self.name.trim().is_empty() {
            return Err(CtlError::config("name", "fiber name must not be empty"));
        }
        self.filter.validate()?;
        self.memory.validate()
    }
}

// ---------------------------------------------------------------- helpers

fn prefix_key(err: CtlError, prefix: &str) -> CtlError {
    match err {
        CtlError::Configuration { key, reason } => CtlError::Configuration {
            key: format!("{prefix}.{key}"),
            reason,
        },
        other => other,
    }
}

fn check_finite(key: &str, value: f64) -> CtlResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CtlError::config(key, format!("must be finite, got {value}")))
    }
}

fn check_unit(key: &str, value: f64) -> CtlResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CtlError::config(key, format!("must be in [0, 1], got {value}")))
    }
}

fn check_positive(key: &str, value: f64) -> CtlResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CtlError::config(key, format!("must be positive, got {value}")))
    }
}

fn check_non_negative(key: &str, value: f64) -> CtlResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CtlError::config(key, format!("must be non-negative, got {value}")))
    }
}

fn check_exponent(key: &str, value: f64) -> CtlResult<()> {
    if value.is_finite() && value >= 1.0 {
        Ok(())
    } else {
        Err(CtlError::config(key, format!("must be >= 1, got {value}")))
    }
}
