//! Vasicek point-in-time transform tests: monotonicity in the systematic
//! factor, neutral-economy identity, and the full stage over the store.

use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use ecl_core::config::{
    EclConfig, MacroScenarioSeed, SegmentCoefficientSeed, TermStructureSeed,
};
use ecl_core::interpolation::PdInterpolationStage;
use ecl_core::stage::PipelineStage;
use ecl_core::store::EclStore;
use ecl_core::vasicek::{pit_pd, systematic_factor, VasicekStage};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 30).unwrap()
}

/// An improving economy (higher z) strictly lowers the PIT PD.
#[test]
fn pit_pd_strictly_decreasing_in_z() {
    let mut prev = f64::INFINITY;
    for &z in &[-2.0, -1.0, 0.0, 1.0, 2.0] {
        let pit = pit_pd(0.02, 0.15, z).unwrap();
        assert!(
            pit < prev,
            "PIT PD not strictly decreasing: {pit} at z = {z}, previous {prev}"
        );
        prev = pit;
    }
}

/// A neutral economy leaves the TTC PD unchanged, for any valid ρ.
#[test]
fn neutral_economy_preserves_ttc() {
    for &rho in &[0.03, 0.15, 0.5, 0.85] {
        for &ttc in &[0.005, 0.02, 0.1, 0.4] {
            let pit = pit_pd(ttc, rho, 0.0).unwrap();
            assert_abs_diff_eq!(pit, ttc, epsilon = 1e-6);
        }
    }
}

/// A pessimistic factor raises the PD above TTC, an optimistic one lowers
/// it below.
#[test]
fn scenario_direction() {
    let pessimistic = pit_pd(0.02, 0.15, -1.0).unwrap();
    let optimistic = pit_pd(0.02, 0.15, 1.0).unwrap();
    assert!(pessimistic > 0.02, "pessimistic PIT {pessimistic} not above TTC");
    assert!(optimistic < 0.02, "optimistic PIT {optimistic} not below TTC");
}

#[test]
fn correlation_outside_unit_interval_rejected() {
    assert!(pit_pd(0.02, 0.0, 0.5).is_err());
    assert!(pit_pd(0.02, 1.0, 0.5).is_err());
    assert!(pit_pd(0.02, -0.2, 0.5).is_err());
}

#[test]
fn pit_pd_stays_within_unit_interval() {
    for &z in &[-8.0, -3.0, 0.0, 3.0, 8.0] {
        let pit = pit_pd(0.02, 0.3, z).unwrap();
        assert!((0.0..=1.0).contains(&pit), "PIT {pit} out of [0,1] at z = {z}");
    }
}

// ── Systematic factor ────────────────────────────────────────────────────────

fn store_with_scenario() -> EclStore {
    let store = EclStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
        .seed_scenarios(&[
            MacroScenarioSeed {
                period:   "2026-06".to_string(),
                scenario: "baseline".to_string(),
                variable: "gdp_growth".to_string(),
                value:    0.02,
            },
            MacroScenarioSeed {
                period:   "2026-06".to_string(),
                scenario: "baseline".to_string(),
                variable: "unemployment".to_string(),
                value:    0.05,
            },
        ])
        .unwrap();
    store
        .seed_coefficients(&[
            SegmentCoefficientSeed {
                variable: "gdp_growth".to_string(),
                segment:  None,
                weight:   10.0,
            },
            SegmentCoefficientSeed {
                variable: "gdp_growth".to_string(),
                segment:  Some("retail".to_string()),
                weight:   20.0,
            },
            SegmentCoefficientSeed {
                variable: "unemployment".to_string(),
                segment:  None,
                weight:   -4.0,
            },
        ])
        .unwrap();
    store
}

/// Segment-scoped weights win; the global row is the fallback.
#[test]
fn segment_weights_fall_back_to_global() {
    let store = store_with_scenario();
    let observations = store.macro_values("2026-06", "baseline").unwrap();

    // retail: 20.0 × 0.02 + (-4.0) × 0.05
    let z_retail = systematic_factor(&store, &observations, "retail").unwrap();
    assert_abs_diff_eq!(z_retail, 0.2, epsilon = 1e-12);

    // corporate has no scoped rows: 10.0 × 0.02 + (-4.0) × 0.05
    let z_corporate = systematic_factor(&store, &observations, "corporate").unwrap();
    assert_abs_diff_eq!(z_corporate, 0.0, epsilon = 1e-12);
}

/// Variables with no configured weight contribute nothing.
#[test]
fn unweighted_variables_are_skipped() {
    let store = store_with_scenario();
    let observations = vec![
        ("gdp_growth".to_string(), 0.02),
        ("house_prices".to_string(), 0.10),
    ];
    let z = systematic_factor(&store, &observations, "corporate").unwrap();
    assert_abs_diff_eq!(z, 0.2, epsilon = 1e-12);
}

// ── Full stage ───────────────────────────────────────────────────────────────

fn seed_structure(store: &EclStore) {
    store
        .seed_term_structures(
            date(),
            &[TermStructureSeed {
                structure_id:    "TS-RETAIL".to_string(),
                segment:         "retail".to_string(),
                periodicity:     "Q".to_string(),
                base_pd:         0.04,
                structure_type:  "D".to_string(),
                risk_basis_code: None,
            }],
        )
        .unwrap();
}

fn config() -> EclConfig {
    EclConfig {
        scenario_period: "2026-06".to_string(),
        scenario_name: "baseline".to_string(),
        ..EclConfig::default()
    }
}

/// The stage conditions every bucket of every curve and recompounds the
/// cumulative PIT sequence.
#[test]
fn stage_writes_pit_values_for_all_buckets() {
    let store = store_with_scenario();
    seed_structure(&store);
    PdInterpolationStage.run(&store, &config(), date(), 1).unwrap();

    let out = VasicekStage.run(&store, &config(), date(), 1).unwrap();
    assert!(out.success, "stage failed: {}", out.detail);

    let points = store.curve_points("TS-RETAIL", date()).unwrap();
    assert!(!points.is_empty());
    let mut prev_cum = 0.0;
    for p in &points {
        let pit = p.pit_pd.expect("pit_pd missing");
        let pit_cum = p.pit_cumulative.expect("pit_cumulative missing");
        assert!((0.0..=1.0).contains(&pit));
        assert!(pit_cum >= prev_cum - 1e-12);
        // retail z = 0.2 is expansionary: PIT below TTC marginal
        assert!(pit < p.marginal_pd);
        prev_cum = pit_cum;
    }
}

/// A scenario with no observations is a stage failure, not a silent
/// neutral adjustment.
#[test]
fn missing_scenario_fails_the_stage() {
    let store = store_with_scenario();
    seed_structure(&store);
    PdInterpolationStage.run(&store, &config(), date(), 1).unwrap();

    let bad = EclConfig {
        scenario_period: "2031-01".to_string(),
        ..config()
    };
    let out = VasicekStage.run(&store, &bad, date(), 1).unwrap();
    assert!(!out.success);
    assert!(out.detail.contains("no macro scenario rows"));
}
