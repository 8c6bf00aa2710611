//! Instance manager.
//!
//! An instance is an adaptive sampling unit. It proposes points around the
//! most recent satisfied/unsatisfied pair it observed (bisecting the decision
//! boundary) or random-walks from its center while no boundary is known.
//!
//! Lifecycle:
//!
//! ```text
//! Active ──(predictions ≥ min)──▶ EligibleForReview ──(policy)──▶ Retired
//! ```
//!
//! A review happens every `min_predictions` completed predictions once the
//! instance is eligible. Retired instances are folded into a
//! [`RetiredSummary`] and replaced on the next proposal, so the active pool
//! stays at its target size and memory stays bounded.

mod policy;

pub use policy::{InstanceReview, KeepAll, RetirementPolicy, WidthGainPolicy};

use rand::Rng;
use rand_distr::StandardNormal;
use serde::Serialize;

use crate::math::{beta_moments, probit, sqrt};
use crate::schema::Schema;
use crate::types::Point;

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Collecting predictions, below the minimum count.
    Active,
    /// Minimum count reached; reviewed periodically.
    EligibleForReview,
    /// Removed from the pool. Terminal.
    Retired,
}

/// An adaptive sampling unit.
#[derive(Debug, Clone)]
pub struct Instance {
    id: u64,
    center: Point,
    predictions: usize,
    satisfied: usize,
    last_satisfied: Option<Point>,
    last_unsatisfied: Option<Point>,
    last_review_at: usize,
    last_review_width: f64,
    state: InstanceState,
}

impl Instance {
    fn new(id: u64, center: Point, prior_width: f64) -> Self {
        Self {
            id,
            center,
            predictions: 0,
            satisfied: 0,
            last_satisfied: None,
            last_unsatisfied: None,
            last_review_at: 0,
            last_review_width: prior_width,
            state: InstanceState::Active,
        }
    }

    /// Instance identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Completed predictions.
    pub fn predictions(&self) -> usize {
        self.predictions
    }

    /// Predictions that satisfied every output.
    pub fn satisfied(&self) -> usize {
        self.satisfied
    }

    /// Whether both a satisfied and an unsatisfied point have been observed.
    pub fn has_boundary(&self) -> bool {
        self.last_satisfied.is_some() && self.last_unsatisfied.is_some()
    }

    /// Current random-walk center.
    pub fn center(&self) -> &[f64] {
        &self.center
    }
}

/// Aggregate of every retired instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetiredSummary {
    /// Number of retired instances.
    pub instances: usize,
    /// Predictions they accumulated (including late completions).
    pub predictions: usize,
    /// Of which satisfied every output.
    pub satisfied: usize,
}

/// Emitted when a review retires an instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Retirement {
    /// The review that led to retirement.
    pub review: InstanceReview,
}

/// Pool configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    /// Target number of active instances.
    pub number_of_instances: usize,
    /// Predictions required before an instance may be reviewed.
    pub min_predictions: usize,
    /// Proposal standard deviation as a fraction of each feature range.
    pub step_scale: f64,
    /// Confidence level of the instance interval width.
    pub confidence: f64,
}

/// The active instance pool plus the summary of retired instances.
#[derive(Debug)]
pub struct InstancePool {
    config: PoolConfig,
    policy: Box<dyn RetirementPolicy>,
    active: Vec<Instance>,
    retired: RetiredSummary,
    next_id: u64,
    cursor: usize,
    z: f64,
}

impl InstancePool {
    /// Create an empty pool. Instances are spawned lazily by [`propose`](Self::propose).
    pub fn new(config: PoolConfig, policy: Box<dyn RetirementPolicy>) -> Self {
        assert!(config.number_of_instances > 0, "number_of_instances must be > 0");
        assert!(config.min_predictions > 0, "min_predictions must be > 0");
        Self {
            z: probit(0.5 + 0.5 * config.confidence),
            config,
            policy,
            active: Vec::with_capacity(config.number_of_instances),
            retired: RetiredSummary::default(),
            next_id: 0,
            cursor: 0,
        }
    }

    /// Active instances.
    pub fn active(&self) -> &[Instance] {
        &self.active
    }

    /// Look up an active instance.
    pub fn get(&self, id: u64) -> Option<&Instance> {
        self.active.iter().find(|i| i.id == id)
    }

    /// Summary of retired instances.
    pub fn retired(&self) -> RetiredSummary {
        self.retired
    }

    /// Interval width of a Beta(1 + s, 1 + f) satisfaction rate.
    fn width(&self, satisfied: usize, predictions: usize) -> f64 {
        let a = 1.0 + satisfied as f64;
        let b = 1.0 + (predictions - satisfied) as f64;
        let (_, var) = beta_moments(a, b);
        2.0 * self.z * sqrt(var)
    }

    fn spawn<R: Rng>(&mut self, schema: &Schema, rng: &mut R) {
        let center = schema
            .features()
            .iter()
            .map(|f| rng.gen_range(f.lower..=f.upper))
            .collect();
        let prior_width = self.width(0, 0);
        self.active.push(Instance::new(self.next_id, center, prior_width));
        self.next_id += 1;
    }

    /// Propose the next adaptive point, round-robin over the pool.
    ///
    /// Tops the pool up to its target size first.
    pub fn propose<R: Rng>(&mut self, schema: &Schema, rng: &mut R) -> (u64, Point) {
        while self.active.len() < self.config.number_of_instances {
            self.spawn(schema, rng);
        }
        self.cursor %= self.active.len();
        let scale = self.config.step_scale;
        let instance = &mut self.active[self.cursor];
        self.cursor += 1;

        let (base, scale): (Point, f64) = match (&instance.last_satisfied, &instance.last_unsatisfied) {
            (Some(s), Some(u)) => (s.iter().zip(u).map(|(a, b)| 0.5 * (a + b)).collect(), scale),
            _ => (instance.center.clone(), 4.0 * scale),
        };

        let point: Point = schema
            .features()
            .iter()
            .zip(&base)
            .map(|(f, &c)| {
                let z: f64 = rng.sample(StandardNormal);
                reflect(c + z * scale * f.span(), f.lower, f.upper)
            })
            .collect();

        if !instance.has_boundary() {
            instance.center.clone_from(&point);
        }
        (instance.id, point)
    }

    /// Record a completed prediction for the instance that proposed it.
    ///
    /// Completions for instances that were already retired are folded into
    /// the retired summary. Returns the retirement, if this completion
    /// triggered one.
    pub fn record(&mut self, id: u64, point: &[f64], satisfied: bool) -> Option<Retirement> {
        let Some(pos) = self.active.iter().position(|i| i.id == id) else {
            self.retired.predictions += 1;
            self.retired.satisfied += usize::from(satisfied);
            return None;
        };

        let min = self.config.min_predictions;
        let instance = &mut self.active[pos];
        instance.predictions += 1;
        if satisfied {
            instance.satisfied += 1;
            instance.last_satisfied = Some(point.to_vec());
        } else {
            instance.last_unsatisfied = Some(point.to_vec());
        }
        if instance.predictions >= min {
            instance.state = InstanceState::EligibleForReview;
        }
        if instance.predictions < min || instance.predictions - instance.last_review_at < min {
            return None;
        }

        let (s, n, previous_width) = (instance.satisfied, instance.predictions, instance.last_review_width);
        let review = InstanceReview {
            instance_id: id,
            predictions: n,
            satisfied: s,
            previous_width,
            current_width: self.width(s, n),
        };

        if self.policy.should_retire(&review) {
            let mut retired = self.active.remove(pos);
            retired.state = InstanceState::Retired;
            self.retired.instances += 1;
            self.retired.predictions += retired.predictions;
            self.retired.satisfied += retired.satisfied;
            Some(Retirement { review })
        } else {
            let instance = &mut self.active[pos];
            instance.last_review_at = n;
            instance.last_review_width = review.current_width;
            None
        }
    }
}

/// Mirror a value back into `[lo, hi]`, clamping if it overshoots twice.
fn reflect(v: f64, lo: f64, hi: f64) -> f64 {
    let v = if v < lo {
        lo + (lo - v)
    } else if v > hi {
        hi - (v - hi)
    } else {
        v
    };
    v.clamp(lo, hi)
}
