//! ecl-runner: headless batch runner for the ECL risk-parameter pipeline.
//!
//! Usage:
//!   ecl-runner --date 2026-06-30 --db ecl.db --data-dir ./data
//!   ecl-runner --date 2026-06-30 --demo
//!
//! Seeds reference catalogs into the store, opens the next run for the
//! calculation date, ingests the portfolio under that run key and executes
//! the pipeline, printing every progress transition at the end.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use ecl_core::{
    config::{
        AccountSeed, DelinquencyBandSeed, EclConfig, LgdSeed, MacroScenarioSeed,
        RatingStageSeed, ReferenceData, SegmentCoefficientSeed, TermStructureSeed,
    },
    pipeline::Pipeline,
    registry::RunRegistry,
    store::EclStore,
};
use std::env;
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let demo = args.iter().any(|a| a == "--demo");
    let db = arg_value(&args, "--db").unwrap_or("ecl.db");
    let data_dir = arg_value(&args, "--data-dir").unwrap_or("./data");
    let date = match arg_value(&args, "--date") {
        Some(d) => d.to_string(),
        None => bail!("--date YYYY-MM-DD is required"),
    };
    let calc_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .with_context(|| format!("malformed --date '{date}'"))?;

    let store = if db == ":memory:" {
        EclStore::in_memory()?
    } else {
        EclStore::open(db)?
    };
    store.migrate()?;

    let mut config = match arg_value(&args, "--config") {
        Some(path) => EclConfig::load(Path::new(path))?,
        None => EclConfig::default(),
    };
    if let Some(method) = arg_value(&args, "--method") {
        config.interpolation_method = method.to_string();
    }
    if config.scenario_period.is_empty() {
        // Default the scenario period to the calculation month.
        config.scenario_period = date[..7].to_string();
    }

    let reference = if demo {
        demo_reference_data(&config.scenario_period)
    } else {
        ReferenceData::load(Path::new(data_dir))?
    };

    store.seed_bands(calc_date, &reference.bands)?;
    store.seed_rating_map(&reference.ratings)?;
    store.seed_term_structures(calc_date, &reference.structures)?;
    store.seed_scenarios(&reference.observations)?;
    store.seed_coefficients(&reference.coefficients)?;
    store.seed_lgd_entries(calc_date, &reference.lgd_entries)?;

    let run_key = RunRegistry::new(&store).open_next(calc_date)?;
    for account in &reference.accounts {
        store.insert_snapshot(calc_date, run_key, account)?;
    }
    log::info!(
        "seeded {} accounts and {} structures under run {run_key}",
        reference.accounts.len(),
        reference.structures.len()
    );

    let mut pipeline = Pipeline::build(store, config);
    let progress = pipeline.subscribe();
    let result = pipeline.run(&date);

    while let Ok(event) = progress.try_recv() {
        println!(
            "[{}] run {} {:>2}. {:<22} {:<8} {}",
            event.calc_date,
            event.run_key,
            event.position,
            event.stage,
            format!("{:?}", event.status),
            event.output
        );
    }

    match result {
        Ok(entries) => {
            println!("pipeline completed: {} stages, run {run_key}", entries.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("pipeline halted: {e}");
            std::process::exit(1);
        }
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

/// A small self-contained portfolio for smoke runs without a data dir.
fn demo_reference_data(period: &str) -> ReferenceData {
    let band = |lower, upper, unit: &str, code: &str| DelinquencyBandSeed {
        lower_bound: lower,
        upper_bound: upper,
        term_unit:   unit.to_string(),
        band_code:   code.to_string(),
    };
    let account = |id: &str, segment: &str, dpd, rating: Option<&str>, coll, exp| AccountSeed {
        account_id:        id.to_string(),
        segment:           segment.to_string(),
        delinquency_days:  dpd,
        term_unit:         Some("M".to_string()),
        rating_code:       rating.map(str::to_string),
        collateral_amount: coll,
        exposure_amount:   exp,
    };
    let observation = |scenario: &str, variable: &str, value| MacroScenarioSeed {
        period:   period.to_string(),
        scenario: scenario.to_string(),
        variable: variable.to_string(),
        value,
    };

    ReferenceData {
        structures: vec![
            TermStructureSeed {
                structure_id:    "TS-RETAIL-M".to_string(),
                segment:         "retail".to_string(),
                periodicity:     "M".to_string(),
                base_pd:         0.032,
                structure_type:  "D".to_string(),
                risk_basis_code: Some("DPD".to_string()),
            },
            TermStructureSeed {
                structure_id:    "TS-CORP-Q".to_string(),
                segment:         "corporate".to_string(),
                periodicity:     "Q".to_string(),
                base_pd:         0.018,
                structure_type:  "R".to_string(),
                risk_basis_code: Some("RATING".to_string()),
            },
        ],
        bands: vec![
            band(0, 30, "M", "B0"),
            band(31, 60, "M", "B1"),
            band(61, 90, "M", "B2"),
            band(91, 99999, "M", "B3"),
        ],
        ratings: vec![
            RatingStageSeed { rating_code: "AAA".to_string(), stage: 1 },
            RatingStageSeed { rating_code: "BB".to_string(), stage: 2 },
            RatingStageSeed { rating_code: "D".to_string(), stage: 3 },
        ],
        observations: vec![
            observation("baseline", "gdp_growth", 0.021),
            observation("baseline", "unemployment", 0.056),
            observation("baseline", "policy_rate", 0.040),
            observation("adverse", "gdp_growth", -0.015),
            observation("adverse", "unemployment", 0.094),
            observation("adverse", "policy_rate", 0.065),
        ],
        coefficients: vec![
            SegmentCoefficientSeed {
                variable: "gdp_growth".to_string(),
                segment:  None,
                weight:   14.0,
            },
            SegmentCoefficientSeed {
                variable: "unemployment".to_string(),
                segment:  None,
                weight:   -8.0,
            },
            SegmentCoefficientSeed {
                variable: "gdp_growth".to_string(),
                segment:  Some("retail".to_string()),
                weight:   18.0,
            },
        ],
        lgd_entries: vec![
            LgdSeed {
                structure_id:   "LGD-RETAIL".to_string(),
                segment:        "retail".to_string(),
                structure_type: "D".to_string(),
                match_code:     "B1".to_string(),
                lgd_pct:        0.45,
            },
            LgdSeed {
                structure_id:   "LGD-CORP".to_string(),
                segment:        "corporate".to_string(),
                structure_type: "R".to_string(),
                match_code:     "BB".to_string(),
                lgd_pct:        0.40,
            },
        ],
        accounts: vec![
            account("A-0001", "retail", Some(12), None, Some(90_000.0), Some(120_000.0)),
            account("A-0002", "retail", Some(45), None, None, Some(80_000.0)),
            account("A-0003", "retail", Some(95), None, Some(20_000.0), Some(200_000.0)),
            account("A-0004", "corporate", Some(5), Some("BB"), None, Some(1_500_000.0)),
            account("A-0005", "corporate", None, Some("AAA"), Some(2_000_000.0), Some(1_000_000.0)),
            account("A-0006", "corporate", Some(110), Some("D"), None, Some(750_000.0)),
        ],
    }
}
