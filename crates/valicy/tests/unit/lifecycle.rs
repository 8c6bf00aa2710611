//! Run lifecycle: sends, reclamation, late sends and resampling.

use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

use valicy::{Ack, EngineConfig, EngineError, RunState};

use crate::helpers::{output, setup};

fn reclaiming() -> EngineConfig {
    EngineConfig::quick().run_timeout(Duration::ZERO)
}

// =============================================================================
// SEND
// =============================================================================

#[test]
fn mismatched_keys_rejected_without_state_change() {
    let (_engine, job) = setup(EngineConfig::quick());
    let run = job.get_next_run().unwrap();

    let wrong = BTreeMap::from([("output_1".to_string(), 0.1)]);
    assert!(run.send(&wrong).unwrap_err().is_invalid_output());

    let mut extra = output(0.1);
    extra.insert("unexpected".into(), 1.0);
    assert!(run.send(&extra).unwrap_err().is_invalid_output());

    assert!(run.send(&BTreeMap::new()).unwrap_err().is_invalid_output());
    assert!(run.send(&output(f64::NAN)).unwrap_err().is_invalid_output());

    assert_eq!(run.state(), RunState::Dispatched);
    assert_eq!(job.stats().completed, 0);

    assert_eq!(run.send(&output(0.1)).unwrap(), Ack::Accepted);
}

#[test]
fn result_dict_is_a_valid_template() {
    let (_engine, job) = setup(EngineConfig::quick());
    let run = job.get_next_run().unwrap();
    let mut result = run.get_result_dict();
    assert_eq!(result.keys().collect::<Vec<_>>(), vec!["output_0"]);
    result.insert("output_0".into(), 0.25);
    assert_eq!(run.send(&result).unwrap(), Ack::Accepted);
}

#[test]
fn repeated_send_is_idempotent() {
    let (_engine, job) = setup(EngineConfig::quick());
    let run = job.get_next_run().unwrap();
    assert_eq!(run.send(&output(0.1)).unwrap(), Ack::Accepted);
    assert_eq!(run.send(&output(0.1)).unwrap(), Ack::Duplicate);
    assert_eq!(
        run.send(&output(0.2)).unwrap_err(),
        EngineError::ConflictingOutput { run_id: run.id() }
    );
    assert_eq!(run.output(), Some(&[0.1][..]));
    assert_eq!(job.stats().completed, 1);
}

#[test]
fn bad_run_does_not_affect_others() {
    let (_engine, job) = setup(EngineConfig::quick());
    let bad = job.get_next_run().unwrap();
    let good = job.get_next_run().unwrap();
    assert!(bad.send(&BTreeMap::new()).is_err());
    assert_eq!(good.send(&output(0.1)).unwrap(), Ack::Accepted);
    assert_eq!(bad.send(&output(0.1)).unwrap(), Ack::Accepted);
}

// =============================================================================
// RECLAMATION
// =============================================================================

#[test]
fn late_send_accepted_before_resample() {
    let (_engine, job) = setup(reclaiming());
    let run = job.get_next_run().unwrap();
    assert_eq!(job.reclaim_expired(), 1);
    assert_eq!(run.state(), RunState::Abandoned);
    assert_eq!(job.stats().abandoned, 1);

    assert_eq!(run.send(&output(0.1)).unwrap(), Ack::AcceptedLate);
    let stats = job.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.abandoned, 0);
    assert_eq!(stats.late_completions, 1);

    // The completed run is not re-issued.
    let next = job.get_next_run().unwrap();
    assert_eq!(next.resample_of(), None);
    assert_ne!(next.features(), run.features());
}

#[test]
fn send_after_resample_is_stale() {
    let (_engine, job) = setup(reclaiming());
    let run = job.get_next_run().unwrap();
    job.reclaim_expired();

    let reissued = job.get_next_run().unwrap();
    assert_eq!(reissued.resample_of(), Some(run.id()));
    assert_eq!(reissued.features(), run.features());
    assert_eq!(reissued.origin(), run.origin());

    assert_eq!(
        run.send(&output(0.1)).unwrap_err(),
        EngineError::StaleRun { run_id: run.id() }
    );
    assert_eq!(reissued.send(&output(0.1)).unwrap(), Ack::Accepted);

    let stats = job.stats();
    assert_eq!(stats.resampled, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(job.certainty()[0].coverage_samples + job.certainty()[0].boundary_samples, 1);
}

#[test]
fn abandoned_runs_excluded_from_certainty() {
    let (_engine, job) = setup(reclaiming());
    let runs: Vec<_> = job.get_runs(10).map(Result::unwrap).collect();
    assert_eq!(job.reclaim_expired(), 10);
    let e = &job.certainty()[0];
    assert_eq!(e.coverage_samples + e.boundary_samples, 0);
    assert!(runs.iter().all(|r| r.state() == RunState::Abandoned));
}

#[test]
fn completed_runs_are_never_reclaimed() {
    let (_engine, job) = setup(reclaiming());
    let run = job.get_next_run().unwrap();
    run.send(&output(0.1)).unwrap();
    assert_eq!(job.reclaim_expired(), 0);
    assert_eq!(run.state(), RunState::Completed);
}

#[test]
fn background_sweep_reclaims_without_client_calls() {
    let config = EngineConfig::quick()
        .background_sweep(true)
        .sweep_interval(Duration::from_millis(5))
        .run_timeout(Duration::from_millis(20));
    let (_engine, job) = setup(config);
    let run = job.get_next_run().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while run.state() == RunState::Dispatched && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(run.state(), RunState::Abandoned);
    assert_eq!(run.send(&output(0.1)).unwrap(), Ack::AcceptedLate);
}

#[test]
fn engine_drop_stops_sweep() {
    let config = EngineConfig::quick()
        .background_sweep(true)
        .sweep_interval(Duration::from_millis(5))
        .run_timeout(Duration::from_millis(20));
    let (engine, job) = setup(config);
    drop(engine);
    let run = job.get_next_run().unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(run.state(), RunState::Dispatched);
}

// =============================================================================
// CLOSING
// =============================================================================

#[test]
fn closed_job_still_accepts_outstanding_sends() {
    let (_engine, job) = setup(EngineConfig::quick());
    let run = job.get_next_run().unwrap();
    assert!(job.close());
    assert!(matches!(job.get_next_run(), Err(EngineError::JobClosed { .. })));
    assert_eq!(run.send(&output(0.1)).unwrap(), Ack::Accepted);
}
