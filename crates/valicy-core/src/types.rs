//! Schema element types and common aliases.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::schema::SchemaError;

/// A point in feature space, one value per feature in schema order.
pub type Point = Vec<f64>;

/// A continuous input feature with a closed value range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContinuous {
    /// Feature name, unique within a scenario.
    pub name: String,
    /// Inclusive lower bound.
    pub lower: f64,
    /// Inclusive upper bound.
    pub upper: f64,
}

impl FeatureContinuous {
    /// Create a feature definition.
    pub fn new(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            lower,
            upper,
        }
    }

    /// Width of the value range.
    pub fn span(&self) -> f64 {
        self.upper - self.lower
    }

    /// Clamp a value into the feature's range.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }

    /// Whether the value lies inside `[lower, upper]`.
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.lower && value <= self.upper
    }
}

/// Which side of the threshold counts as a correct model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Output must be strictly below the threshold.
    Lower,
    /// Output must be strictly above the threshold.
    Upper,
}

impl Orientation {
    /// Whether `value` satisfies this orientation relative to `threshold`.
    ///
    /// Equality never satisfies. NaN never satisfies.
    pub fn is_satisfied(&self, value: f64, threshold: f64) -> bool {
        match self {
            Orientation::Lower => value < threshold,
            Orientation::Upper => value > threshold,
        }
    }

    /// Lowercase name, as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Lower => "lower",
            Orientation::Upper => "upper",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lower" => Ok(Orientation::Lower),
            "upper" => Ok(Orientation::Upper),
            other => Err(SchemaError::InvalidOutput {
                name: String::new(),
                reason: format!("orientation must be \"lower\" or \"upper\", got {other:?}"),
            }),
        }
    }
}

/// A model output dimension and its correctness criterion.
///
/// `Output::new("output_0", 0.4, Orientation::Lower, 0.9)` reads: every value
/// below 0.4 is correct, and the model must be correct with at least 90%
/// certainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Output name, unique within a scenario.
    pub name: String,
    /// Decision threshold.
    pub threshold: f64,
    /// Which side of the threshold is correct.
    pub orientation: Orientation,
    /// Required proportion of correct outputs, in (0, 1).
    pub certainty_target: f64,
}

impl Output {
    /// Create an output definition.
    pub fn new(
        name: impl Into<String>,
        threshold: f64,
        orientation: Orientation,
        certainty_target: f64,
    ) -> Self {
        Self {
            name: name.into(),
            threshold,
            orientation,
            certainty_target,
        }
    }

    /// Whether a model output value is correct under this definition.
    pub fn is_satisfied(&self, value: f64) -> bool {
        self.orientation.is_satisfied(value, self.threshold)
    }
}

/// Where a run's coordinates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunOrigin {
    /// A regular (or Latin hypercube) grid point.
    Grid,
    /// A uniform draw inside the least covered region.
    Exploration,
    /// A proposal from an adaptive instance.
    Instance(u64),
}

impl RunOrigin {
    /// Coverage runs feed the certainty estimate; instance runs only feed
    /// boundary statistics.
    pub fn is_coverage(&self) -> bool {
        !matches!(self, RunOrigin::Instance(_))
    }
}
