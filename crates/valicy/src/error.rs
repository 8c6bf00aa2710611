//! Error type for engine operations.

use std::time::Duration;

use thiserror::Error;
use valicy_core::SchemaError;

use crate::job::CloseReason;

/// Errors reported by the engine.
///
/// Schema and configuration errors are fatal to the call that raised them and
/// never partially apply. Dispatch and send errors affect only the run or call
/// they name.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The scenario's schema is locked because a job already uses it.
    #[error("scenario {scenario:?} is locked: a job already exists for it")]
    ConfigurationLocked {
        /// Scenario name.
        scenario: String,
    },

    /// Invalid feature range, output definition, or output mapping.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A job was requested for a scenario without features or outputs.
    #[error("scenario {scenario:?} has no {missing} configured")]
    ScenarioNotConfigured {
        /// Scenario name.
        scenario: String,
        /// "features" or "outputs".
        missing: &'static str,
    },

    /// An engine configuration value is out of range.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Offending field.
        field: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// The sampler could not materialize a run in time.
    #[error("no run could be generated within {timeout:?}")]
    GenerationTimeout {
        /// The configured generation timeout.
        timeout: Duration,
    },

    /// The run was abandoned and its coordinates were already re-issued.
    #[error("run {run_id} was abandoned and has been resampled")]
    StaleRun {
        /// Run identifier.
        run_id: u64,
    },

    /// The run was already completed with a different output.
    #[error("run {run_id} was already completed with a different output")]
    ConflictingOutput {
        /// Run identifier.
        run_id: u64,
    },

    /// The job no longer dispatches runs.
    #[error("job {job:?} is closed ({reason})")]
    JobClosed {
        /// Job name.
        job: String,
        /// Why it was closed.
        reason: CloseReason,
    },
}

impl EngineError {
    /// Whether this is a schema range error.
    pub fn is_invalid_range(&self) -> bool {
        matches!(self, EngineError::Schema(SchemaError::InvalidRange { .. }))
    }

    /// Whether this is an invalid output definition or mapping.
    pub fn is_invalid_output(&self) -> bool {
        matches!(self, EngineError::Schema(SchemaError::InvalidOutput { .. }))
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
