//! Retirement policies for adaptive instances.

/// Snapshot handed to a [`RetirementPolicy`] when an instance is reviewed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceReview {
    /// Instance identifier.
    pub instance_id: u64,
    /// Completed predictions so far.
    pub predictions: usize,
    /// Predictions that satisfied every output.
    pub satisfied: usize,
    /// Credible-interval width of the instance's satisfaction rate at the
    /// previous review (the prior width on the first review).
    pub previous_width: f64,
    /// Credible-interval width now.
    pub current_width: f64,
}

impl InstanceReview {
    /// Shrinkage of the interval width since the previous review.
    pub fn width_gain(&self) -> f64 {
        self.previous_width - self.current_width
    }
}

/// Decides whether a reviewed instance still contributes enough to keep it.
///
/// Only consulted once the instance has reached the minimum prediction count,
/// so implementations never need to check that floor themselves.
pub trait RetirementPolicy: Send + Sync + std::fmt::Debug {
    /// Return `true` to retire the instance.
    fn should_retire(&self, review: &InstanceReview) -> bool;
}

/// Retire when the interval width shrank by less than `min_gain` since the
/// previous review.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidthGainPolicy {
    /// Minimum width reduction between two reviews.
    pub min_gain: f64,
}

impl WidthGainPolicy {
    /// Create a policy with the given minimum gain.
    pub fn new(min_gain: f64) -> Self {
        Self { min_gain }
    }
}

impl RetirementPolicy for WidthGainPolicy {
    fn should_retire(&self, review: &InstanceReview) -> bool {
        review.width_gain() < self.min_gain
    }
}

/// Never retire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepAll;

impl RetirementPolicy for KeepAll {
    fn should_retire(&self, _review: &InstanceReview) -> bool {
        false
    }
}
