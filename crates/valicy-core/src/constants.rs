//! Default values shared by the core algorithms and the engine configuration.

/// Default deterministic seed for RNG operations.
///
/// Same seed + same sequence of calls = same runs.
/// The value `0x76616C696379` is "valicy" encoded in ASCII.
pub const DEFAULT_SEED: u64 = 0x76616C696379;

// =============================================================================
// Global configuration surface
// =============================================================================

/// Default target size of the active instance pool.
pub const DEFAULT_NUMBER_OF_INSTANCES: usize = 3;

/// Default number of completed predictions an instance must hold before it
/// can be reviewed for retirement.
pub const DEFAULT_MIN_INSTANCE_PREDICTIONS: usize = 50;

/// Default number of regular grid values per feature dimension.
pub const DEFAULT_GRID_POINTS_PER_DIMENSION: usize = 2;

// =============================================================================
// Partitioning
// =============================================================================

/// Ceiling on the enumerated grid before falling back to a Latin hypercube.
pub const DEFAULT_MAX_GRID_POINTS: usize = 4096;

/// Default number of region bins per dimension.
pub const DEFAULT_REGION_BINS: usize = 2;

/// Ceiling on the total number of regions.
pub const DEFAULT_MAX_REGIONS: usize = 64;

// =============================================================================
// Sampling
// =============================================================================

/// Fraction of candidates drawn from the coverage stream (grid / exploration).
pub const DEFAULT_EXPLORATION_RATIO: f64 = 0.5;

/// Standard deviation of instance proposals as a fraction of each range.
pub const DEFAULT_INSTANCE_STEP_SCALE: f64 = 0.05;

/// Minimum shrinkage of an instance's interval width between two reviews.
/// Below this the instance is considered to contribute negligibly.
pub const DEFAULT_RETIREMENT_MIN_WIDTH_GAIN: f64 = 0.02;

/// Maximum rejected proposals per candidate before the sampler gives up on it.
pub const MAX_PROPOSAL_ATTEMPTS: usize = 64;

// =============================================================================
// Certainty estimation
// =============================================================================

/// Default confidence with which the certainty target must be met.
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Default minimum number of coverage samples in every region.
pub const DEFAULT_MIN_SAMPLES_PER_REGION: u64 = 10;

/// Default Beta prior pseudo-counts (uniform prior).
pub const DEFAULT_PRIOR_ALPHA: f64 = 1.0;
/// See [`DEFAULT_PRIOR_ALPHA`].
pub const DEFAULT_PRIOR_BETA: f64 = 1.0;
