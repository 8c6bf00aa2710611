//! Core algorithms for adaptive model validation.
//!
//! This crate holds the deterministic, lock-free building blocks of the
//! `valicy` engine:
//!
//! - [`schema`]: validated, write-once feature/output schemas
//! - [`grid`] and [`region`]: discretization of the feature space
//! - [`sampler`]: interleaved coverage / adaptive run generation
//! - [`instance`]: the adaptive instance pool and retirement policies
//! - [`certainty`]: stratified Beta–Bernoulli certainty estimation
//!
//! It is typically used through the `valicy` crate, which adds job and run
//! lifecycle tracking, concurrency and reporting.
//!
//! ```ignore
//! use valicy_core::{FeatureContinuous, Orientation, Output, Schema};
//!
//! let schema = Schema::new(
//!     vec![FeatureContinuous::new("feature_0", 0.0, 180.0)],
//!     vec![Output::new("output_0", 0.4, Orientation::Lower, 0.9)],
//! )?;
//! ```

#![warn(missing_docs)]

pub mod certainty;
pub mod constants;
pub mod grid;
pub mod instance;
pub mod math;
pub mod region;
pub mod sampler;
pub mod schema;
pub mod types;

pub use certainty::{CertaintyConfig, CertaintyEstimate, CertaintyEstimator};
pub use grid::{ExhaustedGrid, GridPartitioner, GridPoint};
pub use instance::{
    Instance, InstancePool, InstanceReview, InstanceState, KeepAll, PoolConfig, RetiredSummary,
    Retirement, RetirementPolicy, WidthGainPolicy,
};
pub use region::RegionIndex;
pub use sampler::{Candidate, GenerationTimeout, RunSampler, SamplerConfig};
pub use schema::{Schema, SchemaError};
pub use types::{FeatureContinuous, Orientation, Output, Point, RunOrigin};
