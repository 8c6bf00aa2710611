//! Certainty estimation.
//!
//! For every output and every region we keep a Beta–Bernoulli accumulator of
//! satisfied / unsatisfied coverage outcomes. The satisfaction proportion π of
//! the whole feature space is estimated by stratification over the
//! equal-volume regions:
//!
//! ```text
//! π̂      = (1/R) Σ_r E[π_r]          with π_r ~ Beta(α + s_r, β + f_r)
//! Var(π̂) = (1/R²) Σ_r Var[π_r]
//! P(π ≥ target) ≈ Φ((π̂ − target) / sd)
//! ```
//!
//! Certainty is reached only when every region holds at least
//! `min_samples_per_region` coverage samples and `P(π ≥ target)` reaches the
//! configured confidence. Instance runs are accumulated as boundary statistics
//! and reported, but never enter π̂: they are deliberately concentrated near
//! the decision boundary and would bias it.
//!
//! Counters are atomics, so recording is lock-free and no concurrent update is
//! lost. An estimate reads each counter once; it is a pure function of the
//! counts it saw.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::math::{beta_moments, normal_cdf, probit, sqrt};
use crate::schema::Schema;
use crate::types::Output;

/// Estimator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CertaintyConfig {
    /// Required P(π ≥ target), in (0, 1).
    pub confidence: f64,
    /// Sample floor per region. Values below 1 are treated as 1.
    pub min_samples_per_region: u64,
    /// Beta prior α.
    pub prior_alpha: f64,
    /// Beta prior β.
    pub prior_beta: f64,
}

#[derive(Debug, Default)]
struct Counts {
    satisfied: AtomicU64,
    unsatisfied: AtomicU64,
}

impl Counts {
    fn add(&self, satisfied: bool) {
        let counter = if satisfied {
            &self.satisfied
        } else {
            &self.unsatisfied
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn load(&self) -> (u64, u64) {
        (
            self.satisfied.load(Ordering::SeqCst),
            self.unsatisfied.load(Ordering::SeqCst),
        )
    }
}

#[derive(Debug)]
struct OutputAccumulator {
    output: Output,
    coverage: Vec<Counts>,
    boundary: Counts,
}

/// Per-output certainty estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertaintyEstimate {
    /// Output name.
    pub output: String,
    /// Required satisfaction proportion.
    pub certainty_target: f64,
    /// Required confidence.
    pub confidence: f64,
    /// Stratified posterior mean of the satisfaction proportion.
    pub probability_satisfied: f64,
    /// Posterior standard deviation of the satisfaction proportion.
    pub std_error: f64,
    /// One-sided lower credible bound at `confidence`.
    pub lower_bound: f64,
    /// P(π ≥ certainty_target).
    pub certainty: f64,
    /// Coverage samples over all regions.
    pub coverage_samples: u64,
    /// Instance samples (not part of the estimate).
    pub boundary_samples: u64,
    /// Satisfied share among instance samples, if any.
    pub boundary_satisfied_rate: Option<f64>,
    /// Smallest per-region coverage sample count.
    pub min_region_samples: u64,
    /// Regions still below the sample floor.
    pub regions_below_floor: usize,
    /// Whether the certainty target has been reached.
    pub certainty_reached: bool,
}

/// Accumulates completed outcomes and estimates certainty per output.
#[derive(Debug)]
pub struct CertaintyEstimator {
    outputs: Vec<OutputAccumulator>,
    config: CertaintyConfig,
    z: f64,
}

impl CertaintyEstimator {
    /// Create an estimator for every output of `schema` over `regions` regions.
    pub fn new(schema: &Schema, regions: usize, config: CertaintyConfig) -> Self {
        let regions = regions.max(1);
        Self {
            outputs: schema
                .outputs()
                .iter()
                .map(|o| OutputAccumulator {
                    output: o.clone(),
                    coverage: (0..regions).map(|_| Counts::default()).collect(),
                    boundary: Counts::default(),
                })
                .collect(),
            z: probit(config.confidence),
            config,
        }
    }

    /// Number of regions.
    pub fn regions(&self) -> usize {
        self.outputs.first().map_or(0, |o| o.coverage.len())
    }

    /// Record one completed run. `values` holds one value per output, in
    /// schema order.
    ///
    /// Returns whether every output was satisfied.
    pub fn record(&self, region: usize, coverage: bool, values: &[f64]) -> bool {
        debug_assert_eq!(values.len(), self.outputs.len());
        let mut all = true;
        for (acc, &v) in self.outputs.iter().zip(values) {
            let satisfied = acc.output.is_satisfied(v);
            all &= satisfied;
            if coverage {
                let region = region.min(acc.coverage.len() - 1);
                acc.coverage[region].add(satisfied);
            } else {
                acc.boundary.add(satisfied);
            }
        }
        all
    }

    /// Total recorded runs (coverage + boundary), counted on the first output.
    pub fn samples(&self) -> u64 {
        self.outputs.first().map_or(0, |acc| {
            let (bs, bu) = acc.boundary.load();
            acc.coverage
                .iter()
                .map(|c| {
                    let (s, u) = c.load();
                    s + u
                })
                .sum::<u64>()
                + bs
                + bu
        })
    }

    /// Estimate every output.
    pub fn estimate(&self) -> Vec<CertaintyEstimate> {
        self.outputs.iter().map(|acc| self.estimate_one(acc)).collect()
    }

    /// Whether every output reached its certainty target.
    pub fn is_certainty_reached(&self) -> bool {
        self.estimate().iter().all(|e| e.certainty_reached)
    }

    fn estimate_one(&self, acc: &OutputAccumulator) -> CertaintyEstimate {
        let floor = self.config.min_samples_per_region.max(1);
        let r = acc.coverage.len() as f64;

        let mut mean = 0.0;
        let mut var = 0.0;
        let mut total = 0;
        let mut min_region = u64::MAX;
        let mut below = 0;
        for counts in &acc.coverage {
            let (s, u) = counts.load();
            let n = s + u;
            let (m, v) = beta_moments(
                self.config.prior_alpha + s as f64,
                self.config.prior_beta + u as f64,
            );
            mean += m;
            var += v;
            total += n;
            min_region = min_region.min(n);
            if n < floor {
                below += 1;
            }
        }
        mean /= r;
        let sd = sqrt(var) / r;

        let target = acc.output.certainty_target;
        let certainty = normal_cdf((mean - target) / sd);
        let (bs, bu) = acc.boundary.load();

        CertaintyEstimate {
            output: acc.output.name.clone(),
            certainty_target: target,
            confidence: self.config.confidence,
            probability_satisfied: mean,
            std_error: sd,
            lower_bound: mean - self.z * sd,
            certainty,
            coverage_samples: total,
            boundary_samples: bs + bu,
            boundary_satisfied_rate: (bs + bu > 0).then(|| bs as f64 / (bs + bu) as f64),
            min_region_samples: min_region,
            regions_below_floor: below,
            certainty_reached: below == 0 && certainty >= self.config.confidence,
        }
    }
}
