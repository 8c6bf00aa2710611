//! Feature space registry: validated, immutable scenario schemas.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use thiserror::Error;

use crate::types::{FeatureContinuous, Output};

/// Error raised when a schema definition or a value mapping is invalid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// A feature range is empty, or its bounds or span are not finite.
    #[error("feature {name:?} has invalid range [{lower}, {upper}]")]
    InvalidRange {
        /// Feature name.
        name: String,
        /// Configured lower bound.
        lower: f64,
        /// Configured upper bound.
        upper: f64,
    },

    /// An output definition, or an output mapping sent for a run, is invalid.
    #[error("invalid output {name:?}: {reason}")]
    InvalidOutput {
        /// Output name (empty if the problem is not tied to one name).
        name: String,
        /// What was wrong.
        reason: String,
    },

    /// Two features or two outputs share a name.
    #[error("duplicate {kind} name {name:?}")]
    DuplicateName {
        /// "feature" or "output".
        kind: &'static str,
        /// The repeated name.
        name: String,
    },

    /// No features or no outputs were given.
    #[error("schema needs at least one {0}")]
    EmptySchema(&'static str),
}

/// Input/output schema of a scenario.
///
/// Constructed only through [`Schema::new`], so every instance has already
/// passed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    features: Vec<FeatureContinuous>,
    outputs: Vec<Output>,
}

impl Schema {
    /// Validate and freeze a schema.
    pub fn new(
        features: Vec<FeatureContinuous>,
        outputs: Vec<Output>,
    ) -> Result<Self, SchemaError> {
        validate_features(&features)?;
        validate_outputs(&outputs)?;
        Ok(Self { features, outputs })
    }

    /// Input features in declaration order.
    pub fn features(&self) -> &[FeatureContinuous] {
        &self.features
    }

    /// Output definitions in declaration order.
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Number of feature dimensions.
    pub fn dimensions(&self) -> usize {
        self.features.len()
    }

    /// Whether every coordinate lies within its feature's bounds.
    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.features.len()
            && self
                .features
                .iter()
                .zip(point)
                .all(|(f, &v)| f.contains(v))
    }

    /// Clamp every coordinate into bounds.
    pub fn clamp(&self, point: &mut [f64]) {
        for (f, v) in self.features.iter().zip(point.iter_mut()) {
            *v = f.clamp(*v);
        }
    }

    /// Named view of a point.
    pub fn features_map(&self, point: &[f64]) -> BTreeMap<String, f64> {
        self.features
            .iter()
            .zip(point)
            .map(|(f, &v)| (f.name.clone(), v))
            .collect()
    }

    /// Validate an output mapping and return the values in schema order.
    ///
    /// The key set must match the configured output names exactly and every
    /// value must be finite.
    pub fn decode_outputs(&self, values: &BTreeMap<String, f64>) -> Result<Vec<f64>, SchemaError> {
        if let Some(unknown) = values
            .keys()
            .find(|k| !self.outputs.iter().any(|o| &o.name == *k))
        {
            return Err(SchemaError::InvalidOutput {
                name: unknown.clone(),
                reason: "not a configured output".into(),
            });
        }
        self.outputs
            .iter()
            .map(|o| match values.get(&o.name) {
                Some(v) if v.is_finite() => Ok(*v),
                Some(v) => Err(SchemaError::InvalidOutput {
                    name: o.name.clone(),
                    reason: format!("value {v} is not finite"),
                }),
                None => Err(SchemaError::InvalidOutput {
                    name: o.name.clone(),
                    reason: "missing from output mapping".into(),
                }),
            })
            .collect()
    }

    /// Output names mapped to `0.0`, ready to be filled in by the caller.
    pub fn result_template(&self) -> BTreeMap<String, f64> {
        self.outputs.iter().map(|o| (o.name.clone(), 0.0)).collect()
    }
}

/// Validate feature definitions on their own.
pub fn validate_features(features: &[FeatureContinuous]) -> Result<(), SchemaError> {
    if features.is_empty() {
        return Err(SchemaError::EmptySchema("feature"));
    }
    let mut seen = HashSet::new();
    for f in features {
        if !f.lower.is_finite()
            || !f.upper.is_finite()
            || f.lower >= f.upper
            || !f.span().is_finite()
        {
            return Err(SchemaError::InvalidRange {
                name: f.name.clone(),
                lower: f.lower,
                upper: f.upper,
            });
        }
        if !seen.insert(f.name.as_str()) {
            return Err(SchemaError::DuplicateName {
                kind: "feature",
                name: f.name.clone(),
            });
        }
    }
    Ok(())
}

/// Validate output definitions on their own.
pub fn validate_outputs(outputs: &[Output]) -> Result<(), SchemaError> {
    if outputs.is_empty() {
        return Err(SchemaError::EmptySchema("output"));
    }
    let mut seen = HashSet::new();
    for o in outputs {
        if !(o.certainty_target > 0.0 && o.certainty_target < 1.0) {
            return Err(SchemaError::InvalidOutput {
                name: o.name.clone(),
                reason: format!(
                    "certainty_target must be in (0, 1), got {}",
                    o.certainty_target
                ),
            });
        }
        if !o.threshold.is_finite() {
            return Err(SchemaError::InvalidOutput {
                name: o.name.clone(),
                reason: "threshold must be finite".into(),
            });
        }
        if !seen.insert(o.name.as_str()) {
            return Err(SchemaError::DuplicateName {
                kind: "output",
                name: o.name.clone(),
            });
        }
    }
    Ok(())
}
