//! Run sampler.
//!
//! Interleaves two candidate streams:
//!
//! - **Coverage**: the regular grid first, then (once the grid is exhausted)
//!   uniform draws inside whichever region has received the fewest coverage
//!   candidates so far.
//! - **Adaptive**: proposals from the instance pool, concentrated near the
//!   observed decision boundary.
//!
//! A credit accumulator keeps the coverage share at `exploration_ratio`
//! exactly over any window, so the emission order is deterministic for a
//! given seed.

use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use thiserror::Error;

use crate::constants::MAX_PROPOSAL_ATTEMPTS;
use crate::grid::{ExhaustedGrid, GridPartitioner};
use crate::instance::{InstancePool, PoolConfig, Retirement, RetirementPolicy};
use crate::region::RegionIndex;
use crate::schema::Schema;
use crate::types::{Point, RunOrigin};

/// The sampler could not produce a single candidate before the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sampler produced no candidate before the generation deadline")]
pub struct GenerationTimeout;

/// Sampler configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    /// Grid values per dimension.
    pub number_of_regular_grid_points: usize,
    /// Ceiling on the enumerated grid.
    pub max_grid_points: usize,
    /// Region bins per dimension.
    pub region_bins: usize,
    /// Ceiling on the region count.
    pub max_regions: usize,
    /// Share of coverage candidates, in [0, 1].
    pub exploration_ratio: f64,
    /// Instance pool settings.
    pub pool: PoolConfig,
    /// RNG seed.
    pub seed: u64,
}

/// A generated, not yet dispatched run.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Coordinates in schema order, always within bounds.
    pub point: Point,
    /// Which stream produced it.
    pub origin: RunOrigin,
    /// Region containing `point`.
    pub region: usize,
}

/// Generates candidates and routes completed outcomes back to instances.
#[derive(Debug)]
pub struct RunSampler {
    schema: Schema,
    grid: GridPartitioner,
    regions: RegionIndex,
    coverage: Vec<u64>,
    pool: InstancePool,
    rng: Xoshiro256PlusPlus,
    ratio: f64,
    credit: f64,
    generated: u64,
}

impl RunSampler {
    /// Create a sampler for a schema.
    pub fn new(schema: Schema, config: SamplerConfig, policy: Box<dyn RetirementPolicy>) -> Self {
        assert!(
            (0.0..=1.0).contains(&config.exploration_ratio),
            "exploration_ratio must be in [0, 1]"
        );
        let grid = GridPartitioner::new(
            &schema,
            config.number_of_regular_grid_points,
            config.max_grid_points,
            config.seed,
        );
        let regions = RegionIndex::new(&schema, config.region_bins, config.max_regions);
        let coverage = vec![0; regions.len()];

        Self {
            schema,
            grid,
            coverage,
            regions,
            pool: InstancePool::new(config.pool, policy),
            rng: Xoshiro256PlusPlus::seed_from_u64(config.seed.wrapping_add(1)),
            ratio: config.exploration_ratio,
            credit: 1.0,
            generated: 0,
        }
    }

    /// Schema the sampler draws from.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Region index shared with the certainty estimator.
    pub fn regions(&self) -> &RegionIndex {
        &self.regions
    }

    /// Coverage candidates generated per region.
    pub fn coverage(&self) -> &[u64] {
        &self.coverage
    }

    /// Instance pool.
    pub fn pool(&self) -> &InstancePool {
        &self.pool
    }

    /// Grid points not yet emitted.
    pub fn grid_remaining(&self) -> usize {
        self.grid.remaining()
    }

    /// Total candidates generated.
    pub fn generated(&self) -> u64 {
        self.generated
    }

    /// Generate up to `count` candidates.
    ///
    /// Stops early if `deadline` passes; fails only if it passes before the
    /// first candidate exists.
    pub fn generate(
        &mut self,
        count: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<Candidate>, GenerationTimeout> {
        let mut out = Vec::with_capacity(count);
        let expired = || deadline.is_some_and(|d| Instant::now() >= d);

        'outer: while out.len() < count {
            self.credit += self.ratio;
            let coverage = self.credit >= 1.0;
            if coverage {
                self.credit -= 1.0;
            }

            for _ in 0..MAX_PROPOSAL_ATTEMPTS {
                if expired() {
                    break 'outer;
                }
                let (mut point, origin) = if coverage {
                    self.next_coverage_point()
                } else {
                    let (id, p) = self.pool.propose(&self.schema, &mut self.rng);
                    (p, RunOrigin::Instance(id))
                };
                self.schema.clamp(&mut point);
                if !self.schema.contains(&point) {
                    continue;
                }

                let region = self.regions.region_of(&point);
                if origin.is_coverage() {
                    self.coverage[region] += 1;
                }
                self.generated += 1;
                out.push(Candidate {
                    point,
                    origin,
                    region,
                });
                continue 'outer;
            }
            break;
        }

        if out.is_empty() && count > 0 {
            return Err(GenerationTimeout);
        }
        Ok(out)
    }

    fn next_coverage_point(&mut self) -> (Point, RunOrigin) {
        match self.grid.next_grid_point() {
            Ok(p) => (p.coordinates, RunOrigin::Grid),
            Err(ExhaustedGrid) => {
                let region = self
                    .coverage
                    .iter()
                    .enumerate()
                    .min_by_key(|&(_, c)| *c)
                    .map_or(0, |(i, _)| i);
                let point = self
                    .regions
                    .bounds(region)
                    .into_iter()
                    .map(|(lo, hi)| self.rng.gen_range(lo..hi))
                    .collect();
                (point, RunOrigin::Exploration)
            }
        }
    }

    /// Feed a completed outcome back. Only instance runs affect the pool.
    pub fn observe(&mut self, origin: RunOrigin, point: &[f64], satisfied: bool) -> Option<Retirement> {
        match origin {
            RunOrigin::Instance(id) => self.pool.record(id, point, satisfied),
            RunOrigin::Grid | RunOrigin::Exploration => None,
        }
    }
}
