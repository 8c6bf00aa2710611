//! Shared setup for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use valicy::{Engine, EngineConfig, FeatureContinuous, Job, Orientation, Output};

/// The five-feature scenario of the tutorial: two [0, 180] angles, two
/// [0, 90] angles and a fifth [0, 180] angle, one output that must stay
/// below 0.4 with 90% certainty.
pub fn features() -> Vec<FeatureContinuous> {
    vec![
        FeatureContinuous::new("feature_0", 0.0, 180.0),
        FeatureContinuous::new("feature_1", 0.0, 180.0),
        FeatureContinuous::new("feature_2", 0.0, 90.0),
        FeatureContinuous::new("feature_3", 0.0, 90.0),
        FeatureContinuous::new("feature_4", 0.0, 180.0),
    ]
}

pub fn outputs() -> Vec<Output> {
    vec![Output::new("output_0", 0.4, Orientation::Lower, 0.9)]
}

/// Deterministic stand-in for the model under test. Fails only in a thin
/// slab of the feature space.
pub fn stub_model(features: &BTreeMap<String, f64>) -> f64 {
    let f0 = features["feature_0"];
    let f2 = features["feature_2"];
    let f4 = features["feature_4"];
    if (f0 - 120.0).abs() < 3.0 && f2 > 60.0 {
        0.8
    } else {
        0.1 + 0.001 * f4
    }
}

pub fn output(value: f64) -> BTreeMap<String, f64> {
    BTreeMap::from([("output_0".to_string(), value)])
}

/// Engine plus a job on the tutorial scenario.
pub fn setup(config: EngineConfig) -> (Engine, Job) {
    let engine = Engine::new(config).unwrap();
    let system = engine.get_or_create_system("system_0");
    let scenario = engine.get_or_create_scenario("scenario_0");
    scenario.configure_features(features()).unwrap();
    scenario.configure_output(outputs()).unwrap();
    let job = engine.get_or_create_job(&system, &scenario, "job_0").unwrap();
    (engine, job)
}
