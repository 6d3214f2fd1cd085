//! Duplicate-run detection for a (task, setup) pair.

use std::collections::BTreeSet;

use tracing::debug;

use crate::errors::{RunError, RunResult};
use crate::service::{RunFilter, RunService};

/// Ids of the runs already stored for `setup_id` on `task_id`.
///
/// A setup id of zero or below means the setup is unknown to the service, so
/// nothing is queried. A "no results" answer is an empty set, not an error.
pub async fn run_exists(
    service: &dyn RunService,
    task_id: i64,
    setup_id: i64,
) -> RunResult<BTreeSet<i64>> {
    if setup_id <= 0 {
        return Ok(BTreeSet::new());
    }
    let filter = RunFilter::new().with_tasks([task_id]).with_setups([setup_id]);
    match service.list_runs(&filter).await {
        Ok(runs) => Ok(runs.into_keys().collect()),
        Err(e) if e.is_no_results() => {
            debug!(task_id, setup_id, "no runs of this setup on the task");
            Ok(BTreeSet::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Fail with [`RunError::DuplicateRunsExist`] if the setup already ran on the task.
pub async fn ensure_no_duplicate_runs(
    service: &dyn RunService,
    task_id: i64,
    setup_id: i64,
) -> RunResult<()> {
    let run_ids = run_exists(service, task_id, setup_id).await?;
    if run_ids.is_empty() {
        Ok(())
    } else {
        Err(RunError::DuplicateRunsExist { run_ids })
    }
}
