//! Coarse region index over the feature space.
//!
//! Regions are equal-volume cells: every dimension is split into the same
//! number of bins. They are the unit of coverage bookkeeping and of the
//! per-region sample floor in certainty estimation.

use crate::schema::Schema;

/// Maps points to region ids and region ids back to their bounds.
#[derive(Debug, Clone)]
pub struct RegionIndex {
    bins: usize,
    lowers: Vec<f64>,
    spans: Vec<f64>,
    count: usize,
}

impl RegionIndex {
    /// Build the index, reducing `bins` until `bins^dims <= max_regions`.
    pub fn new(schema: &Schema, bins: usize, max_regions: usize) -> Self {
        let dims = schema.dimensions() as u32;
        let mut bins = bins.max(1);
        while bins > 1 && bins.checked_pow(dims).map_or(true, |c| c > max_regions.max(1)) {
            bins -= 1;
        }
        let count = bins.pow(dims);

        Self {
            bins,
            lowers: schema.features().iter().map(|f| f.lower).collect(),
            spans: schema.features().iter().map(|f| f.span()).collect(),
            count,
        }
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Always false: there is at least one region.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bins per dimension after reduction.
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Region containing `point`. Upper bounds belong to the last bin.
    pub fn region_of(&self, point: &[f64]) -> usize {
        let bins = self.bins as f64;
        let mut id = 0;
        let mut stride = 1;
        for ((&v, &lo), &span) in point.iter().zip(&self.lowers).zip(&self.spans) {
            let b = (((v - lo) / span) * bins).floor();
            let b = if b.is_finite() { b.clamp(0.0, bins - 1.0) as usize } else { 0 };
            id += b * stride;
            stride *= self.bins;
        }
        id
    }

    /// Per-dimension `(lower, upper)` bounds of a region.
    pub fn bounds(&self, region: usize) -> Vec<(f64, f64)> {
        let mut rest = region;
        self.lowers
            .iter()
            .zip(&self.spans)
            .map(|(&lo, &span)| {
                let b = rest % self.bins;
                rest /= self.bins;
                let width = span / self.bins as f64;
                let start = lo + width * b as f64;
                let end = if b + 1 == self.bins { lo + span } else { start + width };
                (start, end)
            })
            .collect()
    }
}
