//! Engine configuration.
//!
//! One [`EngineConfig`] is passed to [`Engine::new`](crate::Engine::new) and
//! shared by every job the engine creates. There is no process-wide state.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use valicy_core::constants::{
    DEFAULT_CONFIDENCE, DEFAULT_EXPLORATION_RATIO, DEFAULT_GRID_POINTS_PER_DIMENSION,
    DEFAULT_INSTANCE_STEP_SCALE, DEFAULT_MAX_GRID_POINTS, DEFAULT_MAX_REGIONS,
    DEFAULT_MIN_INSTANCE_PREDICTIONS, DEFAULT_MIN_SAMPLES_PER_REGION, DEFAULT_NUMBER_OF_INSTANCES,
    DEFAULT_PRIOR_ALPHA, DEFAULT_PRIOR_BETA, DEFAULT_REGION_BINS,
    DEFAULT_RETIREMENT_MIN_WIDTH_GAIN, DEFAULT_SEED,
};
use valicy_core::{CertaintyConfig, PoolConfig, SamplerConfig};

use crate::error::{EngineError, Result};

/// Configuration options for the validation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // =========================================================================
    // Instance pool and grid
    // =========================================================================
    /// Target number of active adaptive instances per job. Default: 3.
    pub number_of_instances: usize,

    /// Completed predictions an instance needs before it can be retired.
    /// Default: 50.
    pub min_instance_predictions_before_deletion: usize,

    /// Regular grid values per feature dimension. Default: 2.
    pub number_of_regular_grid_points: usize,

    /// Cap on the enumerated grid; larger grids become a Latin hypercube of
    /// this many points. Default: 4096.
    pub max_grid_points: usize,

    // =========================================================================
    // Sampling
    // =========================================================================
    /// Share of runs drawn from the coverage stream. Default: 0.5.
    pub exploration_ratio: f64,

    /// Instance proposal spread as a fraction of each feature range.
    /// Default: 0.05.
    pub instance_step_scale: f64,

    /// Minimum interval-width shrinkage between two reviews for an instance
    /// to be kept. Default: 0.02.
    pub retirement_min_width_gain: f64,

    // =========================================================================
    // Certainty estimation
    // =========================================================================
    /// Region bins per dimension (reduced automatically to respect
    /// `max_regions`). Default: 2.
    pub region_bins: usize,

    /// Cap on the number of regions. Default: 64.
    pub max_regions: usize,

    /// Coverage samples every region needs before certainty can be reached.
    /// Default: 10.
    pub min_samples_per_region: u64,

    /// Confidence with which the certainty target must hold. Default: 0.95.
    pub confidence: f64,

    /// Beta prior pseudo-counts. Default: 1.0 / 1.0 (uniform).
    pub prior_alpha: f64,
    /// See `prior_alpha`.
    pub prior_beta: f64,

    // =========================================================================
    // Job and run lifecycle
    // =========================================================================
    /// Runs generated per sampler call. Default: 16.
    pub batch_size: usize,

    /// Fresh runs a job may generate before it closes. Default: 100,000.
    pub max_runs_per_job: u64,

    /// Stop dispatching once every output reached its target. Default: true.
    pub stop_on_certainty: bool,

    /// Dispatched runs older than this are abandoned. Default: 5 minutes.
    pub run_timeout: Duration,

    /// Longest a dispatch waits for the sampler. Default: 5 seconds.
    pub generation_timeout: Duration,

    /// Whether a background thread reclaims expired runs. Default: true.
    pub background_sweep: bool,

    /// Period of the background sweep. Default: 1 second.
    pub sweep_interval: Duration,

    /// Base seed; each job derives its own seed from it and its names.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            number_of_instances: DEFAULT_NUMBER_OF_INSTANCES,
            min_instance_predictions_before_deletion: DEFAULT_MIN_INSTANCE_PREDICTIONS,
            number_of_regular_grid_points: DEFAULT_GRID_POINTS_PER_DIMENSION,
            max_grid_points: DEFAULT_MAX_GRID_POINTS,

            exploration_ratio: DEFAULT_EXPLORATION_RATIO,
            instance_step_scale: DEFAULT_INSTANCE_STEP_SCALE,
            retirement_min_width_gain: DEFAULT_RETIREMENT_MIN_WIDTH_GAIN,

            region_bins: DEFAULT_REGION_BINS,
            max_regions: DEFAULT_MAX_REGIONS,
            min_samples_per_region: DEFAULT_MIN_SAMPLES_PER_REGION,
            confidence: DEFAULT_CONFIDENCE,
            prior_alpha: DEFAULT_PRIOR_ALPHA,
            prior_beta: DEFAULT_PRIOR_BETA,

            batch_size: 16,
            max_runs_per_job: 100_000,
            stop_on_certainty: true,
            run_timeout: Duration::from_secs(300),
            generation_timeout: Duration::from_secs(5),
            background_sweep: true,
            sweep_interval: Duration::from_secs(1),
            seed: DEFAULT_SEED,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Small, fast configuration for tests and demos.
    ///
    /// - no background sweep
    /// - a coarser region floor (5 samples)
    /// - 10,000 run budget
    pub fn quick() -> Self {
        Self {
            min_samples_per_region: 5,
            max_runs_per_job: 10_000,
            background_sweep: false,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| EngineError::InvalidConfig {
            field: "json",
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    // =========================================================================
    // Builder methods
    // =========================================================================

    /// Set the target number of active instances.
    pub fn number_of_instances(mut self, n: usize) -> Self {
        assert!(n > 0, "number_of_instances must be > 0");
        self.number_of_instances = n;
        self
    }

    /// Set the prediction count required before an instance may be retired.
    pub fn min_instance_predictions_before_deletion(mut self, n: usize) -> Self {
        assert!(n > 0, "min_instance_predictions_before_deletion must be > 0");
        self.min_instance_predictions_before_deletion = n;
        self
    }

    /// Set the number of regular grid values per dimension.
    pub fn number_of_regular_grid_points(mut self, n: usize) -> Self {
        assert!(n > 0, "number_of_regular_grid_points must be > 0");
        self.number_of_regular_grid_points = n;
        self
    }

    /// Set the coverage share.
    pub fn exploration_ratio(mut self, ratio: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&ratio),
            "exploration_ratio must be in [0, 1]"
        );
        self.exploration_ratio = ratio;
        self
    }

    /// Set the per-region coverage floor.
    pub fn min_samples_per_region(mut self, n: u64) -> Self {
        assert!(n > 0, "min_samples_per_region must be > 0");
        self.min_samples_per_region = n;
        self
    }

    /// Set the confidence level.
    pub fn confidence(mut self, confidence: f64) -> Self {
        assert!(
            confidence > 0.0 && confidence < 1.0,
            "confidence must be in (0, 1)"
        );
        self.confidence = confidence;
        self
    }

    /// Set the region bins per dimension.
    pub fn region_bins(mut self, bins: usize) -> Self {
        assert!(bins > 0, "region_bins must be > 0");
        self.region_bins = bins;
        self
    }

    /// Set the sampler batch size.
    pub fn batch_size(mut self, n: usize) -> Self {
        assert!(n > 0, "batch_size must be > 0");
        self.batch_size = n;
        self
    }

    /// Set the per-job run budget.
    pub fn max_runs_per_job(mut self, n: u64) -> Self {
        assert!(n > 0, "max_runs_per_job must be > 0");
        self.max_runs_per_job = n;
        self
    }

    /// Whether dispatch stops once certainty is reached.
    pub fn stop_on_certainty(mut self, stop: bool) -> Self {
        self.stop_on_certainty = stop;
        self
    }

    /// Set the dispatch timeout after which runs are abandoned.
    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Set the generation timeout.
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "generation_timeout must be > 0");
        self.generation_timeout = timeout;
        self
    }

    /// Enable or disable the background sweep.
    pub fn background_sweep(mut self, enabled: bool) -> Self {
        self.background_sweep = enabled;
        self
    }

    /// Set the background sweep period.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "sweep_interval must be > 0");
        self.sweep_interval = interval;
        self
    }

    /// Set the base seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // =========================================================================
    // Validation and projections
    // =========================================================================

    /// Check every invariant the builder methods assert.
    ///
    /// Needed for configs written as struct literals or parsed from JSON.
    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &'static str, reason: &str) -> Result<()> {
            Err(EngineError::InvalidConfig {
                field,
                reason: reason.to_string(),
            })
        }

        if self.number_of_instances == 0 {
            return invalid("number_of_instances", "must be > 0");
        }
        if self.min_instance_predictions_before_deletion == 0 {
            return invalid("min_instance_predictions_before_deletion", "must be > 0");
        }
        if self.number_of_regular_grid_points == 0 {
            return invalid("number_of_regular_grid_points", "must be > 0");
        }
        if self.max_grid_points == 0 {
            return invalid("max_grid_points", "must be > 0");
        }
        if !(0.0..=1.0).contains(&self.exploration_ratio) {
            return invalid("exploration_ratio", "must be in [0, 1]");
        }
        if !(self.instance_step_scale > 0.0 && self.instance_step_scale.is_finite()) {
            return invalid("instance_step_scale", "must be finite and > 0");
        }
        if !self.retirement_min_width_gain.is_finite() {
            return invalid("retirement_min_width_gain", "must be finite");
        }
        if self.region_bins == 0 || self.max_regions == 0 {
            return invalid("region_bins", "region_bins and max_regions must be > 0");
        }
        if self.min_samples_per_region == 0 {
            return invalid("min_samples_per_region", "must be > 0");
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return invalid("confidence", "must be in (0, 1)");
        }
        if !(self.prior_alpha > 0.0 && self.prior_beta > 0.0)
            || !self.prior_alpha.is_finite()
            || !self.prior_beta.is_finite()
        {
            return invalid("prior_alpha", "Beta prior pseudo-counts must be finite and > 0");
        }
        if self.batch_size == 0 {
            return invalid("batch_size", "must be > 0");
        }
        if self.max_runs_per_job == 0 {
            return invalid("max_runs_per_job", "must be > 0");
        }
        if self.generation_timeout.is_zero() {
            return invalid("generation_timeout", "must be > 0");
        }
        if self.background_sweep && self.sweep_interval.is_zero() {
            return invalid("sweep_interval", "must be > 0 when background_sweep is enabled");
        }
        Ok(())
    }

    pub(crate) fn sampler_config(&self, seed: u64) -> SamplerConfig {
        SamplerConfig {
            number_of_regular_grid_points: self.number_of_regular_grid_points,
            max_grid_points: self.max_grid_points,
            region_bins: self.region_bins,
            max_regions: self.max_regions,
            exploration_ratio: self.exploration_ratio,
            pool: PoolConfig {
                number_of_instances: self.number_of_instances,
                min_predictions: self.min_instance_predictions_before_deletion,
                step_scale: self.instance_step_scale,
                confidence: self.confidence,
            },
            seed,
        }
    }

    pub(crate) fn certainty_config(&self) -> CertaintyConfig {
        CertaintyConfig {
            confidence: self.confidence,
            min_samples_per_region: self.min_samples_per_region,
            prior_alpha: self.prior_alpha,
            prior_beta: self.prior_beta,
        }
    }
}
