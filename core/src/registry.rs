//! The Run Registry collaborator.
//!
//! Issues the monotonically increasing run key for a calculation date.
//! The orchestrator resolves the key exactly once per invocation and
//! passes it explicitly through every stage call — nothing downstream
//! re-derives a "latest run" value mid-pipeline.

use crate::{error::EclResult, store::EclStore, types::RunKey};
use chrono::NaiveDate;

pub struct RunRegistry<'a> {
    store: &'a EclStore,
}

impl<'a> RunRegistry<'a> {
    pub fn new(store: &'a EclStore) -> Self {
        Self { store }
    }

    /// The currently active run key for a date, if any run has been opened.
    pub fn current(&self, calc_date: NaiveDate) -> EclResult<Option<RunKey>> {
        self.store.current_run_key(calc_date)
    }

    /// Open the next run for a date and return its key. Keys start at 1
    /// and increase by 1 per invocation.
    pub fn open_next(&self, calc_date: NaiveDate) -> EclResult<RunKey> {
        let opened_at = chrono::Utc::now().to_rfc3339();
        self.store.open_run(calc_date, &opened_at)
    }
}
