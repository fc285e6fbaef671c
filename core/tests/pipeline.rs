//! Orchestrator tests: fail-fast sequencing, checkpoint persistence,
//! progress events, validation, the per-date lease, and the run registry.

use chrono::NaiveDate;
use ecl_core::config::EclConfig;
use ecl_core::error::EclError;
use ecl_core::pipeline::{Pipeline, PipelineState};
use ecl_core::progress::StageStatus;
use ecl_core::registry::RunRegistry;
use ecl_core::stage::{PipelineStage, StageOutput};
use ecl_core::store::EclStore;
use ecl_core::types::RunKey;
use std::sync::{Arc, Mutex};

const DATE: &str = "2026-06-30";

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 30).unwrap()
}

/// A spy stage that records its invocation and returns a scripted signal.
struct SpyStage {
    name: &'static str,
    fail: bool,
    log:  Arc<Mutex<Vec<String>>>,
}

impl PipelineStage for SpyStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(
        &self,
        _store: &EclStore,
        _config: &EclConfig,
        _calc_date: NaiveDate,
        _run_key: RunKey,
    ) -> ecl_core::error::EclResult<StageOutput> {
        self.log.lock().unwrap().push(self.name.to_string());
        if self.fail {
            Ok(StageOutput::failed(format!("{} exploded", self.name)))
        } else {
            Ok(StageOutput::ok(format!("{} done", self.name)))
        }
    }
}

fn spy_pipeline(failing: Option<usize>) -> (Pipeline, Arc<Mutex<Vec<String>>>) {
    let store = EclStore::in_memory().unwrap();
    store.migrate().unwrap();
    store.open_run(date(), "test").unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = Pipeline::new(store, EclConfig::default());
    let names = ["one", "two", "three", "four", "five"];
    for (i, name) in names.iter().enumerate() {
        pipeline.register(Box::new(SpyStage {
            name,
            fail: failing == Some(i),
            log:  Arc::clone(&log),
        }));
    }
    (pipeline, log)
}

/// Five stages, the third fails: exactly three checkpoint entries, the
/// third marked Failed, stages four and five never invoked.
#[test]
fn fail_fast_stops_at_first_failure() {
    let (mut pipeline, log) = spy_pipeline(Some(2));

    let result = pipeline.run(DATE);
    match result {
        Err(EclError::StageFailed { stage, position, output }) => {
            assert_eq!(stage, "three");
            assert_eq!(position, 3);
            assert_eq!(output, "three exploded");
        }
        other => panic!("expected StageFailed, got {other:?}"),
    }
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(*log.lock().unwrap(), vec!["one", "two", "three"]);

    let entries = pipeline.store().load_checkpoint(date()).unwrap().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].status, StageStatus::Success);
    assert_eq!(entries[1].status, StageStatus::Success);
    assert_eq!(entries[2].status, StageStatus::Failed);
    assert_eq!(entries[2].output, "three exploded");
}

#[test]
fn all_stages_succeed() {
    let (mut pipeline, log) = spy_pipeline(None);

    let entries = pipeline.run(DATE).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Completed);
    assert_eq!(entries.len(), 5);
    assert!(entries.iter().all(|e| e.status == StageStatus::Success));
    assert_eq!(log.lock().unwrap().len(), 5);
}

/// One Running and one terminal event per invoked stage; nothing after
/// the terminating failure.
#[test]
fn progress_events_mirror_transitions() {
    let (mut pipeline, _log) = spy_pipeline(Some(2));
    let rx = pipeline.subscribe();

    let _ = pipeline.run(DATE);

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(events.len(), 6); // 3 stages × (Running + terminal)
    assert_eq!(events[0].status, StageStatus::Running);
    assert_eq!(events[1].status, StageStatus::Success);
    assert_eq!(events[4].status, StageStatus::Running);
    assert_eq!(events[5].status, StageStatus::Failed);
    assert_eq!(events[5].stage, "three");
    assert_eq!(events[5].position, 3);
}

/// Disconnecting a subscriber never cancels an in-flight invocation.
#[test]
fn dropped_subscriber_does_not_cancel() {
    let (mut pipeline, log) = spy_pipeline(None);
    let rx = pipeline.subscribe();
    drop(rx);

    pipeline.run(DATE).unwrap();
    assert_eq!(log.lock().unwrap().len(), 5);
}

/// A malformed calculation date is rejected before any mutation.
#[test]
fn malformed_date_is_a_validation_error() {
    let (mut pipeline, log) = spy_pipeline(None);

    match pipeline.run("30/06/2026") {
        Err(EclError::Validation { .. }) => {}
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(log.lock().unwrap().is_empty());
}

/// A date with no registered run identifier is rejected before any
/// mutation.
#[test]
fn missing_run_key_is_a_validation_error() {
    let store = EclStore::in_memory().unwrap();
    store.migrate().unwrap();
    let mut pipeline = Pipeline::new(store, EclConfig::default());

    match pipeline.run(DATE) {
        Err(EclError::Validation { .. }) => {}
        other => panic!("expected validation error, got {other:?}"),
    }
}

/// The per-date lease rejects a second concurrent invocation and is
/// released once the run finishes — either way.
#[test]
fn lease_guards_concurrent_invocations() {
    let (mut pipeline, _log) = spy_pipeline(None);
    pipeline.store().acquire_lease(date(), 99).unwrap();

    match pipeline.run(DATE) {
        Err(EclError::LeaseHeld { calc_date }) => assert_eq!(calc_date, DATE),
        other => panic!("expected LeaseHeld, got {other:?}"),
    }

    pipeline.store().release_lease(date()).unwrap();
    pipeline.run(DATE).unwrap();
    // Lease released after completion: a fresh invocation acquires it.
    pipeline.run(DATE).unwrap();
}

/// A failing run still releases the lease.
#[test]
fn lease_released_after_failure() {
    let (mut pipeline, _log) = spy_pipeline(Some(0));
    assert!(pipeline.run(DATE).is_err());
    pipeline.store().acquire_lease(date(), 1).unwrap();
}

/// Run keys are monotonic per date and independent across dates.
#[test]
fn registry_issues_monotonic_keys() {
    let store = EclStore::in_memory().unwrap();
    store.migrate().unwrap();
    let other = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();

    let registry = RunRegistry::new(&store);
    assert_eq!(registry.current(date()).unwrap(), None);
    assert_eq!(registry.open_next(date()).unwrap(), 1);
    assert_eq!(registry.open_next(date()).unwrap(), 2);
    assert_eq!(registry.open_next(date()).unwrap(), 3);
    assert_eq!(registry.current(date()).unwrap(), Some(3));

    assert_eq!(registry.open_next(other).unwrap(), 1);
    assert_eq!(registry.current(date()).unwrap(), Some(3));
}

/// The checkpoint document is persisted mid-flight, not only at the end:
/// after a failure the stored document still reflects the partial run.
#[test]
fn checkpoint_readable_after_halt() {
    let (mut pipeline, _log) = spy_pipeline(Some(1));
    let _ = pipeline.run(DATE);

    let entries = pipeline.store().load_checkpoint(date()).unwrap().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].stage, "one");
    assert_eq!(entries[1].stage, "two");
    assert_eq!(entries[1].status, StageStatus::Failed);
}
