//! Job report.

use serde::Serialize;
use valicy_core::{CertaintyEstimate, Instance, InstanceReview, InstanceState, RetiredSummary};

use crate::job::JobStats;

/// Snapshot of an active instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSnapshot {
    /// Instance identifier.
    pub id: u64,
    /// Lifecycle state.
    pub state: InstanceState,
    /// Completed predictions.
    pub predictions: usize,
    /// Satisfied predictions.
    pub satisfied: usize,
    /// Whether both a satisfied and an unsatisfied point were seen.
    pub has_boundary: bool,
}

impl From<&Instance> for InstanceSnapshot {
    fn from(instance: &Instance) -> Self {
        Self {
            id: instance.id(),
            state: instance.state(),
            predictions: instance.predictions(),
            satisfied: instance.satisfied(),
            has_boundary: instance.has_boundary(),
        }
    }
}

/// The final review of a retired instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetiredInstance {
    /// Instance identifier.
    pub id: u64,
    /// Completed predictions at retirement.
    pub predictions: usize,
    /// Satisfied predictions at retirement.
    pub satisfied: usize,
    /// Interval width shrinkage over the last review period.
    pub width_gain: f64,
}

impl From<&InstanceReview> for RetiredInstance {
    fn from(review: &InstanceReview) -> Self {
        Self {
            id: review.instance_id,
            predictions: review.predictions,
            satisfied: review.satisfied,
            width_gain: review.width_gain(),
        }
    }
}

/// Everything known about a job at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    /// Job name.
    pub job: String,
    /// System name.
    pub system: String,
    /// Scenario name.
    pub scenario: String,
    /// Run counters.
    pub stats: JobStats,
    /// Per-output certainty.
    pub certainty: Vec<CertaintyEstimate>,
    /// Whether every output reached its target.
    pub certainty_reached: bool,
    /// Number of certainty regions.
    pub regions: usize,
    /// Grid points not yet issued.
    pub grid_remaining: usize,
    /// Active instances.
    pub instances: Vec<InstanceSnapshot>,
    /// Totals of retired instances.
    pub retired: RetiredSummary,
    /// Retired instances in retirement order.
    pub retirements: Vec<RetiredInstance>,
}
