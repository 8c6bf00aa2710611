//! End-to-end certainty: the tutorial scenario and the sample floor.

use valicy::output::{format_report, to_json};
use valicy::{CloseReason, EngineConfig, JobState};

use crate::helpers::{output, setup, stub_model};

#[test]
fn tutorial_scenario_reaches_certainty_within_budget() {
    let (_engine, job) = setup(EngineConfig::default().background_sweep(false));
    assert!(!job.is_certainty_reached());

    let mut sent = 0;
    for run in job.get_runs(2000) {
        let run = run.unwrap();
        let features = run.get_test_features();
        let mut result = run.get_result_dict();
        result.insert("output_0".into(), stub_model(&features));
        run.send(&result).unwrap();
        sent += 1;
    }

    assert!(job.is_certainty_reached());
    assert!(sent < 2000, "certainty needed the whole budget");

    let stats = job.stats();
    assert_eq!(stats.state, JobState::Closed);
    assert_eq!(stats.close_reason, Some(CloseReason::CertaintyReached));
    assert_eq!(stats.completed, sent);

    let e = &job.certainty()[0];
    assert!(e.certainty_reached);
    assert_eq!(e.regions_below_floor, 0);
    assert!(e.min_region_samples >= 10);
    assert!(e.probability_satisfied > 0.9);
    assert!(e.lower_bound > 0.89);
}

#[test]
fn sample_floor_blocks_certainty() {
    let config = EngineConfig::quick()
        .min_samples_per_region(1000)
        .max_runs_per_job(4000);
    let (_engine, job) = setup(config);
    let mut sent = 0;
    for run in job.get_runs(2000) {
        let run = run.unwrap();
        // Every output satisfies the criterion.
        run.send(&output(0.0)).unwrap();
        sent += 1;
        assert!(!job.is_certainty_reached());
    }
    assert_eq!(sent, 2000);

    let e = &job.certainty()[0];
    assert!(e.regions_below_floor > 0);
    assert!(e.certainty > 0.95);
    assert!(!e.certainty_reached);
}

#[test]
fn failing_model_never_reaches_certainty() {
    let config = EngineConfig::quick().max_runs_per_job(1500);
    let (_engine, job) = setup(config);
    let mut sent = 0;
    for run in job.get_runs(5000) {
        let run = run.unwrap();
        let features = run.get_test_features();
        // Fails on half of the feature_0 range.
        let value = if features["feature_0"] > 90.0 { 0.9 } else { 0.1 };
        run.send(&output(value)).unwrap();
        sent += 1;
    }
    assert_eq!(sent, 1500);
    assert!(!job.is_certainty_reached());
    assert_eq!(job.stats().close_reason, Some(CloseReason::BudgetExhausted));
    let e = &job.certainty()[0];
    assert!((e.probability_satisfied - 0.5).abs() < 0.1);
}

#[test]
fn instances_never_retire_before_minimum() {
    let config = EngineConfig::quick()
        .stop_on_certainty(false)
        .min_instance_predictions_before_deletion(50);
    let (_engine, job) = setup(config);
    for run in job.get_runs(1200) {
        let run = run.unwrap();
        let value = stub_model(&run.get_test_features());
        run.send(&output(value)).unwrap();

        let report = job.report();
        for retirement in &report.retirements {
            assert!(retirement.predictions >= 50, "{retirement:?}");
            assert_eq!(retirement.predictions % 50, 0, "{retirement:?}");
        }
        assert!(report.instances.len() <= 3);
    }
    let report = job.report();
    assert!(report.retired.instances > 0);
    assert_eq!(report.retirements.len(), report.retired.instances);
    // In-flight runs of a retired instance still count towards the summary.
    assert!(
        report.retirements.iter().map(|r| r.predictions).sum::<usize>()
            <= report.retired.predictions
    );
    let total: usize = report.instances.iter().map(|i| i.predictions).sum::<usize>()
        + report.retired.predictions;
    assert_eq!(total as u64, report.certainty[0].boundary_samples);
}

#[test]
fn report_renders() {
    colored::control::set_override(false);
    let (_engine, job) = setup(EngineConfig::quick());
    for run in job.get_runs(50) {
        let run = run.unwrap();
        run.send(&output(stub_model(&run.get_test_features()))).unwrap();
    }
    let report = job.report();
    let text = format_report(&report);
    assert!(text.contains("job_0"));
    assert!(text.contains("output_0"));

    let json: serde_json::Value = serde_json::from_str(&to_json(&report).unwrap()).unwrap();
    assert_eq!(json["stats"]["completed"], 50);
    assert_eq!(json["system"], "system_0");
}
