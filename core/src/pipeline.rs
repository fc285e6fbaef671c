//! The pipeline orchestrator.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Delinquency band mapping
//!   2. Stage classification
//!   3. PD term-structure interpolation
//!   4. Vasicek point-in-time adjustment
//!   5. LGD assignment
//!
//! RULES:
//!   - Stages execute strictly sequentially, in registration order.
//!   - The run key is resolved once per invocation and passed explicitly.
//!   - The checkpoint document is persisted after every status transition
//!     and each transition is emitted to every subscriber.
//!   - The first non-success halts the pipeline: downstream stages are
//!     never invoked, there is no retry and no resumption.
//!   - A per-date lease is held for the whole invocation; a concurrent
//!     invocation for the same date is rejected before any mutation.

use crate::{
    band::DelinquencyBandStage,
    config::EclConfig,
    error::{EclError, EclResult},
    interpolation::PdInterpolationStage,
    lgd::LgdStage,
    progress::{CheckpointEntry, ProgressEvent, StageStatus},
    registry::RunRegistry,
    stage::PipelineStage,
    staging::StageClassifierStage,
    store::EclStore,
    types::RunKey,
    vasicek::VasicekStage,
};
use chrono::NaiveDate;
use std::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running { stage: usize },
    Completed,
    Failed,
}

pub struct Pipeline {
    store:       EclStore,
    config:      EclConfig,
    stages:      Vec<Box<dyn PipelineStage>>,
    subscribers: Vec<mpsc::Sender<ProgressEvent>>,
    state:       PipelineState,
}

impl Pipeline {
    /// An orchestrator with no stages registered. Used by tests that
    /// supply their own stage set.
    pub fn new(store: EclStore, config: EclConfig) -> Self {
        Self {
            store,
            config,
            stages: Vec::new(),
            subscribers: Vec::new(),
            state: PipelineState::Idle,
        }
    }

    /// Build a fully wired orchestrator with the standard stages in the
    /// documented execution order.
    pub fn build(store: EclStore, config: EclConfig) -> Self {
        let mut pipeline = Pipeline::new(store, config);
        pipeline.register(Box::new(DelinquencyBandStage));
        pipeline.register(Box::new(StageClassifierStage));
        pipeline.register(Box::new(PdInterpolationStage));
        pipeline.register(Box::new(VasicekStage));
        pipeline.register(Box::new(LgdStage));
        pipeline
    }

    /// Register a stage. Call in the documented execution order. External
    /// EAD/exposure stages plug in through the same contract.
    pub fn register(&mut self, stage: Box<dyn PipelineStage>) {
        self.stages.push(stage);
    }

    /// Subscribe to the progress event stream. Disconnecting a receiver
    /// never cancels an in-flight invocation.
    pub fn subscribe(&mut self) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn store(&self) -> &EclStore {
        &self.store
    }

    /// Execute all registered stages for one calculation date.
    ///
    /// Validates the date and resolves the run key before any mutation;
    /// returns the final checkpoint document on success.
    pub fn run(&mut self, calc_date: &str) -> EclResult<Vec<CheckpointEntry>> {
        let date = NaiveDate::parse_from_str(calc_date, "%Y-%m-%d").map_err(|_| {
            EclError::validation(format!(
                "malformed calculation date '{calc_date}' (expected YYYY-MM-DD)"
            ))
        })?;
        let run_key = RunRegistry::new(&self.store)
            .current(date)?
            .ok_or_else(|| {
                EclError::validation(format!("no run identifier registered for {date}"))
            })?;

        self.store.acquire_lease(date, run_key)?;
        log::info!("pipeline started: date {date}, run {run_key}, {} stages", self.stages.len());

        let result = self.run_stages(date, run_key);

        if let Err(e) = self.store.release_lease(date) {
            log::warn!("lease release failed for {date}: {e}");
        }
        self.state = if result.is_ok() {
            PipelineState::Completed
        } else {
            PipelineState::Failed
        };
        result
    }

    fn run_stages(
        &mut self,
        date: NaiveDate,
        run_key: RunKey,
    ) -> EclResult<Vec<CheckpointEntry>> {
        let total = self.stages.len();
        let mut entries: Vec<CheckpointEntry> = Vec::new();

        for index in 0..total {
            self.state = PipelineState::Running { stage: index };
            let position = index + 1;
            let name = self.stages[index].name().to_string();

            entries.push(CheckpointEntry {
                stage:  name.clone(),
                status: StageStatus::Running,
                output: String::new(),
            });
            self.store.save_checkpoint(date, run_key, &entries)?;
            self.emit(date, run_key, position, &name, StageStatus::Running, "");
            log::info!("stage {position}/{total} '{name}' started");

            let outcome = self.stages[index].run(&self.store, &self.config, date, run_key);
            match outcome {
                Ok(out) if out.success => {
                    entries[index].status = StageStatus::Success;
                    entries[index].output = out.detail.clone();
                    self.store.save_checkpoint(date, run_key, &entries)?;
                    self.emit(date, run_key, position, &name, StageStatus::Success, &out.detail);
                    log::info!("stage {position}/{total} '{name}' succeeded: {}", out.detail);
                }
                Ok(out) => {
                    entries[index].status = StageStatus::Failed;
                    entries[index].output = out.detail.clone();
                    self.store.save_checkpoint(date, run_key, &entries)?;
                    self.emit(date, run_key, position, &name, StageStatus::Failed, &out.detail);
                    log::error!("stage {position}/{total} '{name}' failed: {}", out.detail);
                    return Err(EclError::StageFailed {
                        stage: name,
                        position,
                        output: out.detail,
                    });
                }
                Err(err) => {
                    let text = err.to_string();
                    entries[index].status = StageStatus::Error;
                    entries[index].output = text.clone();
                    self.store.save_checkpoint(date, run_key, &entries)?;
                    self.emit(date, run_key, position, &name, StageStatus::Error, &text);
                    log::error!("stage {position}/{total} '{name}' errored: {text}");
                    return Err(err);
                }
            }
        }

        Ok(entries)
    }

    /// Emit one transition to every live subscriber. Disconnected
    /// subscribers are dropped silently.
    fn emit(
        &mut self,
        date: NaiveDate,
        run_key: RunKey,
        position: usize,
        stage: &str,
        status: StageStatus,
        output: &str,
    ) {
        let event = ProgressEvent {
            calc_date: date.to_string(),
            run_key,
            position,
            stage: stage.to_string(),
            status,
            output: output.to_string(),
        };
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
