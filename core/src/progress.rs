//! Progress checkpoints and the event stream.
//!
//! The orchestrator keeps one `CheckpointEntry` per invoked stage,
//! persists the whole ordered document after every status transition,
//! and emits the same transition to every subscriber.

use crate::types::RunKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Running,
    Success,
    Failed,
    Error,
}

/// One entry of the progress checkpoint document, in stage order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub stage:  String,
    pub status: StageStatus,
    pub output: String,
}

/// One event per stage transition, mirroring the checkpoint entry it
/// was persisted with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub calc_date: String,
    pub run_key:   RunKey,
    /// 1-based position of the stage in the configured sequence.
    pub position:  usize,
    pub stage:     String,
    pub status:    StageStatus,
    pub output:    String,
}
