//! IFRS-9 stage classification.
//!
//! Rating-based classification runs first and takes precedence wherever a
//! known rating mapping exists — that precedence is a design contract.
//! The delinquency pass then covers the remainder: ≤30 days → Stage 1,
//! 31–90 → Stage 2, >90 → Stage 3; accounts with no delinquency value
//! keep their existing stage. Finally each account is joined to the most
//! recent strictly-earlier run and transitions are recorded.

use crate::{
    config::EclConfig,
    error::EclResult,
    stage::{PipelineStage, StageOutput},
    store::EclStore,
    types::RunKey,
};
use chrono::NaiveDate;

pub struct StageClassifierStage;

impl PipelineStage for StageClassifierStage {
    fn name(&self) -> &'static str {
        "stage_classification"
    }

    fn run(
        &self,
        store: &EclStore,
        _config: &EclConfig,
        calc_date: NaiveDate,
        run_key: RunKey,
    ) -> EclResult<StageOutput> {
        let by_rating = store.assign_stage_by_rating(calc_date, run_key)?;
        let by_delinquency = store.assign_stage_by_delinquency(calc_date, run_key)?;
        let carried = store.copy_prev_stage(calc_date, run_key)?;
        let transitions = store.append_stage_history(calc_date, run_key)?;

        log::debug!(
            "run {run_key}: {by_rating} rating-classified, {by_delinquency} delinquency-classified"
        );

        Ok(StageOutput::ok(format!(
            "classified {by_rating} by rating, {by_delinquency} by delinquency; \
             {carried} prior stages carried, {transitions} transitions recorded"
        )))
    }
}
