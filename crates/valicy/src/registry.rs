//! Systems and scenarios.
//!
//! A [`Scenario`] collects its feature and output definitions until the first
//! job is created for it. At that point the schema is frozen and every further
//! configuration call fails with [`EngineError::ConfigurationLocked`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use valicy_core::schema::{validate_features, validate_outputs};
use valicy_core::{FeatureContinuous, Output, Schema};

use crate::error::{EngineError, Result};
use crate::sync::{lock, read, write};

/// Free-form description attached to systems and scenarios.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Human readable description.
    pub description: Option<String>,
    /// Arbitrary key/value information.
    pub metainfo: BTreeMap<String, String>,
}

/// A system under test.
#[derive(Debug)]
pub struct System {
    name: String,
    meta: RwLock<Metadata>,
}

impl System {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            meta: RwLock::new(Metadata::default()),
        }
    }

    /// System name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the metadata.
    pub fn metadata(&self) -> Metadata {
        read(&self.meta).clone()
    }

    /// Set the description.
    pub fn set_description(&self, description: impl Into<String>) {
        write(&self.meta).description = Some(description.into());
    }

    /// Insert or replace one metainfo entry.
    pub fn set_metainfo(&self, key: impl Into<String>, value: impl Into<String>) {
        write(&self.meta).metainfo.insert(key.into(), value.into());
    }
}

#[derive(Debug, Default)]
struct ScenarioState {
    features: Option<Vec<FeatureContinuous>>,
    outputs: Option<Vec<Output>>,
    locked: Option<Arc<Schema>>,
}

/// An operating context for a system: its feature space and output criteria.
#[derive(Debug)]
pub struct Scenario {
    name: String,
    meta: RwLock<Metadata>,
    state: Mutex<ScenarioState>,
}

impl Scenario {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            meta: RwLock::new(Metadata::default()),
            state: Mutex::new(ScenarioState::default()),
        }
    }

    /// Scenario name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the metadata.
    pub fn metadata(&self) -> Metadata {
        read(&self.meta).clone()
    }

    /// Set the description.
    pub fn set_description(&self, description: impl Into<String>) {
        write(&self.meta).description = Some(description.into());
    }

    /// Insert or replace one metainfo entry.
    pub fn set_metainfo(&self, key: impl Into<String>, value: impl Into<String>) {
        write(&self.meta).metainfo.insert(key.into(), value.into());
    }

    /// Configure features and outputs together.
    ///
    /// Both lists are validated before either is stored.
    pub fn configure(&self, features: Vec<FeatureContinuous>, outputs: Vec<Output>) -> Result<()> {
        let mut state = lock(&self.state);
        self.ensure_unlocked(&state)?;
        validate_features(&features)?;
        validate_outputs(&outputs)?;
        state.features = Some(features);
        state.outputs = Some(outputs);
        Ok(())
    }

    /// Configure the input features. May be repeated until a job exists.
    pub fn configure_features(&self, features: Vec<FeatureContinuous>) -> Result<()> {
        let mut state = lock(&self.state);
        self.ensure_unlocked(&state)?;
        validate_features(&features)?;
        state.features = Some(features);
        Ok(())
    }

    /// Configure the output criteria. May be repeated until a job exists.
    pub fn configure_output(&self, outputs: Vec<Output>) -> Result<()> {
        let mut state = lock(&self.state);
        self.ensure_unlocked(&state)?;
        validate_outputs(&outputs)?;
        state.outputs = Some(outputs);
        Ok(())
    }

    /// The current schema, once both features and outputs are configured.
    pub fn schema(&self) -> Option<Schema> {
        let state = lock(&self.state);
        if let Some(schema) = &state.locked {
            return Some(Schema::clone(schema));
        }
        match (&state.features, &state.outputs) {
            (Some(f), Some(o)) => Schema::new(f.clone(), o.clone()).ok(),
            _ => None,
        }
    }

    /// Whether a job has frozen the schema.
    pub fn is_locked(&self) -> bool {
        lock(&self.state).locked.is_some()
    }

    /// Freeze the schema for job creation.
    pub(crate) fn lock_schema(&self) -> Result<Arc<Schema>> {
        let mut state = lock(&self.state);
        if let Some(schema) = &state.locked {
            return Ok(Arc::clone(schema));
        }
        let not_configured = |missing| EngineError::ScenarioNotConfigured {
            scenario: self.name.clone(),
            missing,
        };
        let features = state.features.clone().ok_or_else(|| not_configured("features"))?;
        let outputs = state.outputs.clone().ok_or_else(|| not_configured("outputs"))?;
        let schema = Arc::new(Schema::new(features, outputs)?);
        state.locked = Some(Arc::clone(&schema));
        Ok(schema)
    }

    fn ensure_unlocked(&self, state: &ScenarioState) -> Result<()> {
        if state.locked.is_some() {
            tracing::warn!(scenario = %self.name, "configuration rejected: scenario is locked");
            return Err(EngineError::ConfigurationLocked {
                scenario: self.name.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valicy_core::{Orientation, SchemaError};

    fn features() -> Vec<FeatureContinuous> {
        vec![
            FeatureContinuous::new("a", 0.0, 1.0),
            FeatureContinuous::new("b", -1.0, 1.0),
        ]
    }

    fn outputs() -> Vec<Output> {
        vec![Output::new("y", 0.5, Orientation::Upper, 0.8)]
    }

    #[test]
    fn test_schema_requires_both_parts() {
        let s = Scenario::new("s");
        assert!(s.schema().is_none());
        s.configure_features(features()).unwrap();
        assert!(s.schema().is_none());
        assert!(matches!(
            s.lock_schema(),
            Err(EngineError::ScenarioNotConfigured {
                missing: "outputs",
                ..
            })
        ));
        s.configure_output(outputs()).unwrap();
        assert_eq!(s.schema().unwrap().dimensions(), 2);
    }

    #[test]
    fn test_invalid_configure_does_not_partially_apply() {
        let s = Scenario::new("s");
        s.configure(features(), outputs()).unwrap();

        let bad_outputs = vec![Output::new("y", 0.5, Orientation::Upper, 1.5)];
        let new_features = vec![FeatureContinuous::new("c", 0.0, 2.0)];
        let err = s.configure(new_features, bad_outputs).unwrap_err();
        assert!(err.is_invalid_output());

        let schema = s.schema().unwrap();
        assert_eq!(schema.features()[0].name, "a");
    }

    #[test]
    fn test_invalid_range_rejected() {
        let s = Scenario::new("s");
        let err = s
            .configure_features(vec![FeatureContinuous::new("a", 2.0, 1.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Schema(SchemaError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_locked_after_lock_schema() {
        let s = Scenario::new("s");
        s.configure(features(), outputs()).unwrap();
        let first = s.lock_schema().unwrap();
        let second = s.lock_schema().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(s.is_locked());

        assert!(matches!(
            s.configure_features(features()),
            Err(EngineError::ConfigurationLocked { .. })
        ));
        assert!(matches!(
            s.configure_output(outputs()),
            Err(EngineError::ConfigurationLocked { .. })
        ));
    }

    #[test]
    fn test_metadata() {
        let sys = System::new("sys");
        sys.set_description("autonomous shuttle");
        sys.set_metainfo("version", "1.2");
        let meta = sys.metadata();
        assert_eq!(meta.description.as_deref(), Some("autonomous shuttle"));
        assert_eq!(meta.metainfo["version"], "1.2");
    }
}
