//! Stage-classification tests: rating precedence, delinquency thresholds,
//! prior-run joins, and transition history.

use chrono::NaiveDate;
use ecl_core::config::{AccountSeed, EclConfig, RatingStageSeed};
use ecl_core::stage::PipelineStage;
use ecl_core::staging::StageClassifierStage;
use ecl_core::store::EclStore;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 30).unwrap()
}

fn earlier_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, 31).unwrap()
}

fn account(id: &str, dpd: Option<i64>, rating: Option<&str>) -> AccountSeed {
    AccountSeed {
        account_id:        id.to_string(),
        segment:           "retail".to_string(),
        delinquency_days:  dpd,
        term_unit:         Some("M".to_string()),
        rating_code:       rating.map(str::to_string),
        collateral_amount: None,
        exposure_amount:   None,
    }
}

fn new_store() -> EclStore {
    let store = EclStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
        .seed_rating_map(&[
            RatingStageSeed { rating_code: "AAA".to_string(), stage: 1 },
            RatingStageSeed { rating_code: "CCC".to_string(), stage: 3 },
        ])
        .unwrap();
    store
}

fn classify(store: &EclStore, run_key: i64) {
    let out = StageClassifierStage
        .run(store, &EclConfig::default(), date(), run_key)
        .unwrap();
    assert!(out.success, "classification failed: {}", out.detail);
}

fn stage_of(store: &EclStore, run_key: i64, id: &str) -> Option<i64> {
    store.get_snapshot(date(), run_key, id).unwrap().unwrap().stage
}

/// ≤30 days → Stage 1, 31–90 → Stage 2, >90 → Stage 3.
#[test]
fn delinquency_thresholds() {
    let store = new_store();
    store.insert_snapshot(date(), 1, &account("A-10", Some(10), None)).unwrap();
    store.insert_snapshot(date(), 1, &account("A-30", Some(30), None)).unwrap();
    store.insert_snapshot(date(), 1, &account("A-31", Some(31), None)).unwrap();
    store.insert_snapshot(date(), 1, &account("A-45", Some(45), None)).unwrap();
    store.insert_snapshot(date(), 1, &account("A-90", Some(90), None)).unwrap();
    store.insert_snapshot(date(), 1, &account("A-95", Some(95), None)).unwrap();
    classify(&store, 1);

    assert_eq!(stage_of(&store, 1, "A-10"), Some(1));
    assert_eq!(stage_of(&store, 1, "A-30"), Some(1));
    assert_eq!(stage_of(&store, 1, "A-31"), Some(2));
    assert_eq!(stage_of(&store, 1, "A-45"), Some(2));
    assert_eq!(stage_of(&store, 1, "A-90"), Some(2));
    assert_eq!(stage_of(&store, 1, "A-95"), Some(3));
}

/// A known rating mapping wins over whatever the delinquency rules would
/// assign — the precedence is a design contract.
#[test]
fn rating_takes_precedence_over_delinquency() {
    let store = new_store();
    store.insert_snapshot(date(), 1, &account("A-R", Some(10), Some("CCC"))).unwrap();
    classify(&store, 1);

    let row = store.get_snapshot(date(), 1, "A-R").unwrap().unwrap();
    assert_eq!(row.stage, Some(3));
    assert_eq!(row.stage_basis.as_deref(), Some("rating"));
}

/// An unmapped rating falls through to the delinquency rules.
#[test]
fn unknown_rating_falls_back_to_delinquency() {
    let store = new_store();
    store.insert_snapshot(date(), 1, &account("A-U", Some(45), Some("ZZZ"))).unwrap();
    classify(&store, 1);

    let row = store.get_snapshot(date(), 1, "A-U").unwrap().unwrap();
    assert_eq!(row.stage, Some(2));
    assert_eq!(row.stage_basis.as_deref(), Some("delinquency"));
}

/// No rating and no delinquency value: the existing stage is untouched.
#[test]
fn missing_delinquency_keeps_existing_stage() {
    let store = new_store();
    store.insert_snapshot(date(), 1, &account("A-N", None, None)).unwrap();
    classify(&store, 1);

    let row = store.get_snapshot(date(), 1, "A-N").unwrap().unwrap();
    assert_eq!(row.stage, None);
    assert_eq!(row.stage_basis, None);
}

/// The previous stage comes from the most recent strictly-earlier run of
/// the same account; accounts with no prior run stay NULL.
#[test]
fn prev_stage_joined_from_prior_run() {
    let store = new_store();

    // Run 1: A-1 lands in stage 2.
    store.insert_snapshot(date(), 1, &account("A-1", Some(45), None)).unwrap();
    classify(&store, 1);

    // Run 2: A-1 cures to stage 1; A-2 is new.
    store.insert_snapshot(date(), 2, &account("A-1", Some(5), None)).unwrap();
    store.insert_snapshot(date(), 2, &account("A-2", Some(5), None)).unwrap();
    classify(&store, 2);

    let a1 = store.get_snapshot(date(), 2, "A-1").unwrap().unwrap();
    assert_eq!(a1.stage, Some(1));
    assert_eq!(a1.prev_stage, Some(2));

    let a2 = store.get_snapshot(date(), 2, "A-2").unwrap().unwrap();
    assert_eq!(a2.prev_stage, None);
}

/// An earlier calculation date counts as a prior run too.
#[test]
fn prev_stage_crosses_calculation_dates() {
    let store = new_store();
    let seed = account("A-1", Some(95), None);
    store.insert_snapshot(earlier_date(), 1, &seed).unwrap();
    let out = StageClassifierStage
        .run(&store, &EclConfig::default(), earlier_date(), 1)
        .unwrap();
    assert!(out.success);

    store.insert_snapshot(date(), 1, &account("A-1", Some(10), None)).unwrap();
    classify(&store, 1);

    let row = store.get_snapshot(date(), 1, "A-1").unwrap().unwrap();
    assert_eq!(row.stage, Some(1));
    assert_eq!(row.prev_stage, Some(3));
}

/// History rows are appended only when a prior run exists and the stage
/// actually moved.
#[test]
fn transitions_recorded_only_with_prior_run() {
    let store = new_store();

    store.insert_snapshot(date(), 1, &account("A-1", Some(45), None)).unwrap();
    store.insert_snapshot(date(), 1, &account("A-2", Some(10), None)).unwrap();
    classify(&store, 1);
    // First run: no prior run anywhere, so no transitions.
    assert_eq!(store.stage_history_count(date(), 1).unwrap(), 0);

    store.insert_snapshot(date(), 2, &account("A-1", Some(5), None)).unwrap();
    store.insert_snapshot(date(), 2, &account("A-2", Some(12), None)).unwrap();
    classify(&store, 2);
    // A-1 moved 2 → 1; A-2 stayed in stage 1.
    assert_eq!(store.stage_history_count(date(), 2).unwrap(), 1);
}
