//! The stage contract.
//!
//! RULE: Every pipeline stage implements `PipelineStage`. The orchestrator
//! calls `run()` on each registered stage in registration order and halts
//! on the first non-success. Stages receive the calculation date and the
//! run key resolved once per invocation — they never re-derive the run
//! key themselves.

use crate::{config::EclConfig, error::EclResult, store::EclStore, types::RunKey};
use chrono::NaiveDate;

/// The success/failure signal plus free-text diagnostic a stage returns.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub success: bool,
    pub detail:  String,
}

impl StageOutput {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self { success: true, detail: detail.into() }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self { success: false, detail: detail.into() }
    }
}

/// The contract every stage must fulfill.
pub trait PipelineStage: Send {
    /// Unique stable name, recorded in checkpoints and progress events.
    fn name(&self) -> &'static str;

    /// Execute the stage for one (calculation date, run key).
    ///
    /// `Ok(StageOutput { success: false, .. })` is a stage-level failure
    /// (the pipeline halts, records it verbatim); `Err(_)` is an
    /// infrastructure error (recorded with status `Error`).
    fn run(
        &self,
        store: &EclStore,
        config: &EclConfig,
        calc_date: NaiveDate,
        run_key: RunKey,
    ) -> EclResult<StageOutput>;
}
