//! Regular grid partitioner.
//!
//! Each feature dimension is discretized into `points_per_dimension` evenly
//! spaced values (including both bounds). When the full cross product would
//! exceed `max_points`, a seeded Latin hypercube of `max_points` points is
//! used instead, so the coverage stream keeps one value per stratum in every
//! dimension without the exponential blow-up.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use thiserror::Error;

use crate::schema::Schema;
use crate::types::{FeatureContinuous, Point};

/// The deterministic grid has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("regular grid exhausted")]
pub struct ExhaustedGrid;

/// A fixed coordinate of the discretized feature space.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoint {
    /// Position in the emission order.
    pub index: usize,
    /// Coordinates in schema order.
    pub coordinates: Point,
}

#[derive(Debug, Clone)]
enum Layout {
    /// Full cross product, decoded from a mixed-radix index.
    Regular { axes: Vec<Vec<f64>>, total: usize },
    /// Latin hypercube subsample, materialized up-front.
    LatinHypercube { points: Vec<Point> },
}

/// Emits grid points one at a time in a deterministic order.
#[derive(Debug, Clone)]
pub struct GridPartitioner {
    layout: Layout,
    cursor: usize,
}

impl GridPartitioner {
    /// Build the grid for a schema.
    ///
    /// `points_per_dimension` and `max_points` must be > 0.
    pub fn new(schema: &Schema, points_per_dimension: usize, max_points: usize, seed: u64) -> Self {
        assert!(points_per_dimension > 0, "points_per_dimension must be > 0");
        assert!(max_points > 0, "max_points must be > 0");

        let features = schema.features();
        let full = features
            .iter()
            .try_fold(1usize, |acc, _| acc.checked_mul(points_per_dimension));

        let layout = match full {
            Some(total) if total <= max_points => Layout::Regular {
                axes: features
                    .iter()
                    .map(|f| axis_values(f, points_per_dimension))
                    .collect(),
                total,
            },
            _ => Layout::LatinHypercube {
                points: latin_hypercube(features, max_points, seed),
            },
        };

        Self { layout, cursor: 0 }
    }

    /// Total number of points this partitioner will emit.
    pub fn len(&self) -> usize {
        match &self.layout {
            Layout::Regular { total, .. } => *total,
            Layout::LatinHypercube { points } => points.len(),
        }
    }

    /// Always false: a partitioner emits at least one point.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Points not yet emitted.
    pub fn remaining(&self) -> usize {
        self.len() - self.cursor
    }

    /// Whether the cross product was too large and a Latin hypercube is used.
    pub fn is_latin_hypercube(&self) -> bool {
        matches!(self.layout, Layout::LatinHypercube { .. })
    }

    /// Next grid point, or [`ExhaustedGrid`] once every point was emitted.
    pub fn next_grid_point(&mut self) -> Result<GridPoint, ExhaustedGrid> {
        if self.cursor >= self.len() {
            return Err(ExhaustedGrid);
        }
        let index = self.cursor;
        self.cursor += 1;

        let coordinates = match &self.layout {
            Layout::Regular { axes, .. } => {
                let mut rest = index;
                axes.iter()
                    .map(|axis| {
                        let v = axis[rest % axis.len()];
                        rest /= axis.len();
                        v
                    })
                    .collect()
            }
            Layout::LatinHypercube { points } => points[index].clone(),
        };

        Ok(GridPoint { index, coordinates })
    }
}

/// Evenly spaced values over a feature's range, both bounds included.
fn axis_values(feature: &FeatureContinuous, k: usize) -> Vec<f64> {
    if k == 1 {
        return vec![feature.lower + 0.5 * feature.span()];
    }
    let step = feature.span() / (k - 1) as f64;
    (0..k)
        .map(|i| {
            if i == k - 1 {
                feature.upper
            } else {
                feature.lower + step * i as f64
            }
        })
        .collect()
}

fn latin_hypercube(features: &[FeatureContinuous], n: usize, seed: u64) -> Vec<Point> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let strata: Vec<Vec<usize>> = features
        .iter()
        .map(|_| {
            let mut perm: Vec<usize> = (0..n).collect();
            perm.shuffle(&mut rng);
            perm
        })
        .collect();

    (0..n)
        .map(|i| {
            features
                .iter()
                .zip(&strata)
                .map(|(f, perm)| {
                    let u: f64 = rng.gen();
                    let v = f.lower + (perm[i] as f64 + u) / n as f64 * f.span();
                    f.clamp(v)
                })
                .collect()
        })
        .collect()
}
