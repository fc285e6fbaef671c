//! LGD assignment.
//!
//! Two independent, non-exclusive passes, both idempotent — they only
//! fill currently-unset LGD values. The term-structure pass joins the
//! account's segment to the configured LGD table (rating code for 'R'
//! structures, band code for 'D'). The collateral pass runs only when
//! enabled: severity = 1 − collateral/exposure, floored at 0% and capped
//! at 65%, skipping zero or unset exposure.

use crate::{
    config::EclConfig,
    error::EclResult,
    stage::{PipelineStage, StageOutput},
    store::EclStore,
    types::RunKey,
};
use chrono::NaiveDate;

pub struct LgdStage;

impl PipelineStage for LgdStage {
    fn name(&self) -> &'static str {
        "lgd_assignment"
    }

    fn run(
        &self,
        store: &EclStore,
        config: &EclConfig,
        calc_date: NaiveDate,
        run_key: RunKey,
    ) -> EclResult<StageOutput> {
        let from_structures = store.fill_lgd_from_term_structure(calc_date, run_key)?;
        let from_collateral = if config.collateral_lgd_enabled {
            store.fill_lgd_from_collateral(calc_date, run_key)?
        } else {
            0
        };

        Ok(StageOutput::ok(format!(
            "assigned LGD to {from_structures} accounts via term structures, \
             {from_collateral} via collateral coverage"
        )))
    }
}
