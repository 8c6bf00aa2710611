//! Scenario configuration and schema locking.

use valicy::{Engine, EngineConfig, EngineError, FeatureContinuous, Orientation, Output, SchemaError};

use crate::helpers::{features, outputs};

#[test]
fn configure_features_twice_after_job_is_locked() {
    let engine = Engine::new(EngineConfig::quick()).unwrap();
    let system = engine.get_or_create_system("system_0");
    let scenario = engine.get_or_create_scenario("scenario_0");

    // Repeated configuration is fine while no job exists.
    scenario.configure_features(features()).unwrap();
    scenario.configure_features(features()).unwrap();
    scenario.configure_output(outputs()).unwrap();

    engine.get_or_create_job(&system, &scenario, "job_0").unwrap();

    for _ in 0..2 {
        let err = scenario.configure_features(features()).unwrap_err();
        assert_eq!(
            err,
            EngineError::ConfigurationLocked {
                scenario: "scenario_0".into()
            }
        );
    }
    assert!(matches!(
        scenario.configure(features(), outputs()),
        Err(EngineError::ConfigurationLocked { .. })
    ));
}

#[test]
fn locked_schema_is_what_jobs_see() {
    let engine = Engine::new(EngineConfig::quick()).unwrap();
    let system = engine.get_or_create_system("system_0");
    let scenario = engine.get_or_create_scenario("scenario_0");
    scenario.configure(features(), outputs()).unwrap();
    let job = engine.get_or_create_job(&system, &scenario, "job_0").unwrap();

    assert_eq!(Some(job.schema().clone()), scenario.schema());
    assert_eq!(job.schema().dimensions(), 5);
}

#[test]
fn invalid_range_rejected() {
    let engine = Engine::new(EngineConfig::quick()).unwrap();
    let scenario = engine.get_or_create_scenario("scenario_0");
    for (lower, upper) in [(1.0, 1.0), (2.0, 1.0), (0.0, f64::INFINITY)] {
        let err = scenario
            .configure_features(vec![FeatureContinuous::new("f", lower, upper)])
            .unwrap_err();
        assert!(err.is_invalid_range(), "{err}");
    }
    assert!(scenario.schema().is_none());
}

#[test]
fn invalid_outputs_rejected() {
    let engine = Engine::new(EngineConfig::quick()).unwrap();
    let scenario = engine.get_or_create_scenario("scenario_0");
    for target in [0.0, 1.0, -0.5, 1.2] {
        let err = scenario
            .configure_output(vec![Output::new("o", 0.4, Orientation::Lower, target)])
            .unwrap_err();
        assert!(err.is_invalid_output(), "{err}");
    }
    let err = "sideways".parse::<Orientation>().unwrap_err();
    assert!(matches!(err, SchemaError::InvalidOutput { .. }));
    assert_eq!("lower".parse::<Orientation>().unwrap(), Orientation::Lower);
}

#[test]
fn duplicate_names_rejected() {
    let engine = Engine::new(EngineConfig::quick()).unwrap();
    let scenario = engine.get_or_create_scenario("scenario_0");
    let err = scenario
        .configure_features(vec![
            FeatureContinuous::new("f", 0.0, 1.0),
            FeatureContinuous::new("f", 0.0, 2.0),
        ])
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Schema(SchemaError::DuplicateName { kind: "feature", .. })
    ));
}

#[test]
fn failed_job_creation_does_not_lock() {
    let engine = Engine::new(EngineConfig::quick()).unwrap();
    let system = engine.get_or_create_system("system_0");
    let scenario = engine.get_or_create_scenario("scenario_0");
    scenario.configure_features(features()).unwrap();

    assert!(engine.get_or_create_job(&system, &scenario, "job_0").is_err());
    assert!(!scenario.is_locked());
    scenario.configure_features(features()).unwrap();
}

#[test]
fn metadata_is_kept_on_systems_and_scenarios() {
    let engine = Engine::new(EngineConfig::quick()).unwrap();
    let system = engine.get_or_create_system("system_0");
    system.set_description("lane keeping assistant");
    let scenario = engine.get_or_create_scenario("scenario_0");
    scenario.set_metainfo("weather", "rain");

    let again = engine.get_or_create_system("system_0");
    assert_eq!(
        again.metadata().description.as_deref(),
        Some("lane keeping assistant")
    );
    assert_eq!(
        engine.scenarios()[0].metadata().metainfo["weather"],
        "rain"
    );
}
