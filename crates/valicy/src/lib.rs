//! Adaptive model validation engine.
//!
//! `valicy` generates test runs over the feature space of a scenario, collects
//! the outputs a model produces for them, and estimates with quantified
//! certainty whether the outputs satisfy their configured criteria.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::collections::BTreeMap;
//! use valicy::{Engine, EngineConfig, FeatureContinuous, Orientation, Output};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let system = engine.get_or_create_system("system_0");
//! let scenario = engine.get_or_create_scenario("scenario_0");
//! scenario.configure_features(vec![
//!     FeatureContinuous::new("feature_0", 0.0, 180.0),
//!     FeatureContinuous::new("feature_1", 0.0, 90.0),
//! ])?;
//! scenario.configure_output(vec![Output::new("output_0", 0.4, Orientation::Lower, 0.9)])?;
//!
//! let job = engine.get_or_create_job(&system, &scenario, "job_0")?;
//! for run in job.get_runs(2000) {
//!     let run = run?;
//!     let features = run.get_test_features();
//!     let mut output = run.get_result_dict();
//!     output.insert("output_0".into(), model(&features));
//!     run.send(&output)?;
//! }
//! println!("{}", valicy::output::format_report(&job.report()));
//! ```
//!
//! # Lifecycle
//!
//! - The first job of a scenario freezes its schema.
//! - Each pending run is dispatched to at most one caller.
//! - Runs not completed within `run_timeout` are abandoned by a background
//!   sweep and their coordinates re-issued; a late send is accepted until the
//!   re-issue happens.
//! - Dispatch stops once every output reached its certainty target, or the
//!   job's run budget is spent.

#![warn(missing_docs)]

pub mod config;
mod engine;
pub mod error;
pub mod job;
pub mod output;
mod reaper;
pub mod registry;
pub mod report;
mod sync;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use job::{Ack, CloseReason, Job, JobState, JobStats, Run, RunState, Runs};
pub use registry::{Metadata, Scenario, System};
pub use report::{InstanceSnapshot, JobReport, RetiredInstance};

pub use valicy_core::{
    CertaintyEstimate, FeatureContinuous, InstanceReview, KeepAll, Orientation, Output,
    RetirementPolicy, RunOrigin, Schema, SchemaError, WidthGainPolicy,
};
