//! Completion summary for a finished route run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::run::RouteRun;
use crate::stop::{Stop, StopStatus};
use crate::store::StopStore;

/// The auditable completion report: every stop of the run, partitioned by
/// outcome, in authority order. A pure function of store state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub completed: Vec<Stop>,
    pub failed: Vec<Stop>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Builds the summary for a finished run.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RunStillActive`] if any stop of the run has no
    /// acknowledged outcome yet.
    pub fn build(
        store: &StopStore,
        run: &RouteRun,
        finished_at: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        let mut stops: Vec<&Stop> = Vec::with_capacity(run.stop_ids.len());
        for id in &run.stop_ids {
            stops.push(store.get(*id).ok_or(CoreError::UnknownStop(*id))?);
        }

        let remaining = stops.iter().filter(|s| !s.status.is_terminal()).count();
        if remaining > 0 {
            return Err(CoreError::RunStillActive { remaining });
        }

        stops.sort_by_key(|s| s.order.unwrap_or(u32::MAX));
        let completed = stops
            .iter()
            .filter(|s| s.status == StopStatus::Completed)
            .map(|s| (*s).clone())
            .collect();
        let failed = stops
            .iter()
            .filter(|s| s.status == StopStatus::Failed)
            .map(|s| (*s).clone())
            .collect();

        Ok(RunSummary {
            run_id: run.run_id,
            completed,
            failed,
            finished_at,
        })
    }

    /// Total number of delivery stops covered by the report.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}
