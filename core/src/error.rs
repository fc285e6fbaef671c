use thiserror::Error;

#[derive(Error, Debug)]
pub enum EclError {
    /// Malformed input caught before any mutation. Safe to retry after
    /// correcting the input.
    #[error("Validation error: {reason}")]
    Validation { reason: String },

    /// A configuration defect surfaced to the caller, never auto-corrected.
    #[error("Computation error: {reason}")]
    Computation { reason: String },

    /// Probability outside the open interval (0, 1).
    #[error("Probability {p} outside the valid domain (0, 1)")]
    Domain { p: f64 },

    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another invocation already holds the lease for this calculation date.
    #[error("Pipeline lease already held for {calc_date}")]
    LeaseHeld { calc_date: String },

    /// A stage reported a non-success signal; the pipeline halted there.
    #[error("Stage '{stage}' (position {position}) failed: {output}")]
    StageFailed {
        stage:    String,
        position: usize,
        output:   String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EclError {
    pub fn validation(reason: impl Into<String>) -> Self {
        EclError::Validation { reason: reason.into() }
    }

    pub fn computation(reason: impl Into<String>) -> Self {
        EclError::Computation { reason: reason.into() }
    }
}

pub type EclResult<T> = Result<T, EclError>;
