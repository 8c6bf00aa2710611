//! Tests for configuration validation.
//!
//! Builder methods reject invalid values with panics; `validate()` rejects
//! them for configs written as literals or parsed from JSON.

use std::time::Duration;
use valicy::{Engine, EngineConfig, EngineError};

// =============================================================================
// GLOBAL SETTINGS
// =============================================================================

#[test]
#[should_panic(expected = "number_of_instances must be > 0")]
fn number_of_instances_zero_panics() {
    let _ = EngineConfig::new().number_of_instances(0);
}

#[test]
#[should_panic(expected = "min_instance_predictions_before_deletion must be > 0")]
fn min_predictions_zero_panics() {
    let _ = EngineConfig::new().min_instance_predictions_before_deletion(0);
}

#[test]
#[should_panic(expected = "number_of_regular_grid_points must be > 0")]
fn grid_points_zero_panics() {
    let _ = EngineConfig::new().number_of_regular_grid_points(0);
}

#[test]
fn global_settings_valid() {
    let config = EngineConfig::new()
        .number_of_instances(3)
        .min_instance_predictions_before_deletion(50)
        .number_of_regular_grid_points(2);
    assert_eq!(config.number_of_instances, 3);
    assert_eq!(config.min_instance_predictions_before_deletion, 50);
    assert_eq!(config.number_of_regular_grid_points, 2);
    assert!(config.validate().is_ok());
}

// =============================================================================
// CERTAINTY SETTINGS
// =============================================================================

#[test]
#[should_panic(expected = "confidence must be in (0, 1)")]
fn confidence_one_panics() {
    let _ = EngineConfig::new().confidence(1.0);
}

#[test]
#[should_panic(expected = "min_samples_per_region must be > 0")]
fn sample_floor_zero_panics() {
    let _ = EngineConfig::new().min_samples_per_region(0);
}

#[test]
#[should_panic(expected = "exploration_ratio must be in [0, 1]")]
fn exploration_ratio_above_one_panics() {
    let _ = EngineConfig::new().exploration_ratio(1.5);
}

// =============================================================================
// LIFECYCLE SETTINGS
// =============================================================================

#[test]
#[should_panic(expected = "generation_timeout must be > 0")]
fn generation_timeout_zero_panics() {
    let _ = EngineConfig::new().generation_timeout(Duration::ZERO);
}

#[test]
#[should_panic(expected = "sweep_interval must be > 0")]
fn sweep_interval_zero_panics() {
    let _ = EngineConfig::new().sweep_interval(Duration::ZERO);
}

#[test]
fn zero_sweep_interval_allowed_without_background_sweep() {
    let config = EngineConfig {
        background_sweep: false,
        sweep_interval: Duration::ZERO,
        ..EngineConfig::default()
    };
    assert!(config.validate().is_ok());
}

// =============================================================================
// ENGINE CONSTRUCTION
// =============================================================================

#[test]
fn engine_rejects_invalid_literal_config() {
    let config = EngineConfig {
        prior_alpha: 0.0,
        ..EngineConfig::quick()
    };
    let err = Engine::new(config).unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfig { field: "prior_alpha", .. }));
}

#[test]
fn engine_accepts_json_config() {
    let config = EngineConfig::from_json(
        r#"{
            "number_of_instances": 3,
            "min_instance_predictions_before_deletion": 50,
            "number_of_regular_grid_points": 2,
            "background_sweep": false
        }"#,
    )
    .unwrap();
    let engine = Engine::new(config).unwrap();
    assert_eq!(engine.config().number_of_instances, 3);
}
