//! Delinquency band mapping.
//!
//! Maps each account's days-past-due, conditioned on its amortization
//! term unit, to a configured band code. One set-based UPDATE per band;
//! accounts outside every configured range keep an unset band code.

use crate::{
    config::{DelinquencyBandSeed, EclConfig},
    error::EclResult,
    stage::{PipelineStage, StageOutput},
    store::EclStore,
    types::RunKey,
};
use chrono::NaiveDate;

/// Bands for one term unit must not overlap — a days-past-due value may
/// match at most one band. Returns the first offending pair.
fn find_overlap(bands: &[DelinquencyBandSeed]) -> Option<(&DelinquencyBandSeed, &DelinquencyBandSeed)> {
    for (i, a) in bands.iter().enumerate() {
        for b in &bands[i + 1..] {
            let same_unit = a.term_unit.eq_ignore_ascii_case(&b.term_unit);
            if same_unit && a.lower_bound <= b.upper_bound && b.lower_bound <= a.upper_bound {
                return Some((a, b));
            }
        }
    }
    None
}

pub struct DelinquencyBandStage;

impl PipelineStage for DelinquencyBandStage {
    fn name(&self) -> &'static str {
        "delinquency_band"
    }

    fn run(
        &self,
        store: &EclStore,
        _config: &EclConfig,
        calc_date: NaiveDate,
        run_key: RunKey,
    ) -> EclResult<StageOutput> {
        let bands = store.bands_for_date(calc_date)?;
        if bands.is_empty() {
            return Ok(StageOutput::ok("no delinquency bands configured"));
        }
        if let Some((a, b)) = find_overlap(&bands) {
            return Ok(StageOutput::failed(format!(
                "overlapping bands '{}' [{}, {}] and '{}' [{}, {}] for term unit '{}'",
                a.band_code, a.lower_bound, a.upper_bound,
                b.band_code, b.lower_bound, b.upper_bound,
                a.term_unit
            )));
        }

        let mut mapped = 0usize;
        for band in &bands {
            let changed = store.apply_band(calc_date, run_key, band)?;
            log::debug!("band {}: {} snapshots", band.band_code, changed);
            mapped += changed;
        }

        Ok(StageOutput::ok(format!(
            "mapped {mapped} snapshots across {} bands",
            bands.len()
        )))
    }
}
