//! Run orchestration: flow synchronization, duplicate check, sweep and record
//! assembly, plus the remote helpers built on top of a [`RunService`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{run_task, SweepOutcome};
use crate::errors::{RunError, RunResult};
use crate::flow::Flow;
use crate::guard::ensure_no_duplicate_runs;
use crate::model::Estimator;
use crate::run::{PredictionTable, RunRecord};
use crate::service::RunService;
use crate::split::PartitionProvider;
use crate::task::{Task, TaskKind};
use crate::trace::TraceIteration;

/// Tag attached to every run produced by this library.
pub const LIBRARY_TAG: &str = "foldwise";

/// Tag naming the library version that produced a run.
pub const VERSION_TAG: &str = concat!("foldwise-core_", env!("CARGO_PKG_VERSION"));

/// Options for [`run_flow_on_task`] and [`execute_run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Check the service for runs of the same setup before executing.
    #[serde(default = "default_true")]
    pub avoid_duplicate_runs: bool,
    /// Attach locally computed accuracy / mean absolute error per cell.
    #[serde(default = "default_true")]
    pub add_local_measures: bool,
    /// Seed applied to the estimator before the sweep.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Extra tags for the run record.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Publish the flow when the service does not know it yet.
    #[serde(default)]
    pub upload_flow: bool,
    /// Tags given to a flow published by this run.
    #[serde(default)]
    pub flow_tags: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            avoid_duplicate_runs: true,
            add_local_measures: true,
            seed: None,
            tags: Vec::new(),
            upload_flow: false,
            flow_tags: Vec::new(),
        }
    }
}

impl RunOptions {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn allow_duplicates(mut self) -> Self {
        self.avoid_duplicate_runs = false;
        self
    }

    pub fn upload_flow(mut self, flow_tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.upload_flow = true;
        self.flow_tags = flow_tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Execute `estimator` on `task` without contacting the service.
///
/// The record keeps `flow_id = None` and no parameter settings.
pub fn execute_run<E, P>(
    estimator: &E,
    flow: &Flow,
    task: &Task<P>,
    options: &RunOptions,
) -> RunResult<RunRecord>
where
    E: Estimator,
    P: PartitionProvider,
{
    let outcome = sweep(estimator, task, options)?;
    let run = assemble(flow, task, outcome, None, options)?;
    log_executed(&run, flow);
    Ok(run)
}

/// Synchronize the flow with the service, refuse duplicate setups and execute.
///
/// The service is contacted only when `avoid_duplicate_runs` or `upload_flow`
/// is set; otherwise this behaves like [`execute_run`]. An unknown flow is
/// published when `upload_flow` is set. A resolved or assigned flow id is
/// written back into `flow` and the run carries the flow's parameter settings.
pub async fn run_flow_on_task<E, P>(
    estimator: &E,
    flow: &mut Flow,
    task: &Task<P>,
    service: &dyn RunService,
    options: &RunOptions,
) -> RunResult<RunRecord>
where
    E: Estimator,
    P: PartitionProvider,
{
    let synced_flow_id = if options.avoid_duplicate_runs || options.upload_flow {
        sync_flow(flow, task, service, options).await?
    } else {
        None
    };

    let outcome = sweep(estimator, task, options)?;
    let run = assemble(flow, task, outcome, synced_flow_id, options)?;
    log_executed(&run, flow);
    Ok(run)
}

async fn sync_flow<P>(
    flow: &mut Flow,
    task: &Task<P>,
    service: &dyn RunService,
    options: &RunOptions,
) -> RunResult<Option<i64>>
where
    P: PartitionProvider,
{
    let remote = service
        .flow_exists(&flow.name, &flow.external_version)
        .await?;
    if let Some(local) = flow.flow_id {
        match remote {
            Some(remote) if remote != local => {
                return Err(RunError::FlowMismatch {
                    message: format!(
                        "local flow id {} does not match service flow id {}",
                        local, remote
                    ),
                })
            }
            None => {
                return Err(RunError::FlowMismatch {
                    message: format!(
                        "flow {:?} does not exist on the service but has local id {}",
                        flow.name, local
                    ),
                })
            }
            Some(_) => {}
        }
    }

    match remote {
        None if options.upload_flow => {
            let flow_id = service.publish_flow(flow, &options.flow_tags).await?;
            flow.flow_id = Some(flow_id);
            info!(flow_id, flow = %flow.name, "flow published");
            Ok(Some(flow_id))
        }
        Some(flow_id) => {
            flow.flow_id = Some(flow_id);
            if options.avoid_duplicate_runs {
                let setup_id = service.setup_exists(flow_id, &flow.parameters).await?;
                debug!(flow_id, setup_id = ?setup_id, "flow known to the service");
                ensure_no_duplicate_runs(service, task.task_id, setup_id.unwrap_or(0)).await?;
            }
            Ok(Some(flow_id))
        }
        None => {
            debug!(flow = %flow.name, "flow unknown to the service, running locally");
            Ok(None)
        }
    }
}

fn sweep<E, P>(estimator: &E, task: &Task<P>, options: &RunOptions) -> RunResult<SweepOutcome>
where
    E: Estimator,
    P: PartitionProvider,
{
    let mut template = estimator.clone();
    if let Some(seed) = options.seed {
        template.reseed(seed);
    }
    run_task(&template, task, options.add_local_measures)
}

fn assemble<P>(
    flow: &Flow,
    task: &Task<P>,
    outcome: SweepOutcome,
    synced_flow_id: Option<i64>,
    options: &RunOptions,
) -> RunResult<RunRecord>
where
    P: PartitionProvider,
{
    let mut tags = vec![LIBRARY_TAG.to_string(), VERSION_TAG.to_string()];
    tags.extend(options.tags.iter().cloned());

    let mut run = RunRecord {
        task_id: task.task_id,
        task_type: Some(task.kind.name().to_string()),
        task_evaluation_measure: task.evaluation_measure.clone(),
        flow_id: synced_flow_id,
        flow_name: Some(flow.name.clone()),
        setup_string: flow.setup_string.clone(),
        parameter_settings: synced_flow_id.map(|_| flow.parameter_settings()),
        dataset_id: Some(task.dataset_id),
        tags,
        predictions: Some(PredictionTable::new(
            task.kind.prediction_layout()?,
            outcome.predictions,
        )),
        trace: outcome.trace,
        ..RunRecord::default()
    };
    if matches!(task.kind, TaskKind::LearningCurve { .. }) {
        run.sample_evaluations = outcome.sample_evaluations;
    } else {
        run.fold_evaluations = outcome.fold_evaluations;
    }
    Ok(run)
}

fn log_executed(run: &RunRecord, flow: &Flow) {
    match run.flow_id {
        Some(flow_id) => info!(task_id = run.task_id, flow_id, "executed task"),
        None => info!(task_id = run.task_id, flow = %flow.name, "executed task on local flow"),
    }
}

/// Fetch several runs, one request at a time.
pub async fn get_runs(service: &dyn RunService, run_ids: &[i64]) -> RunResult<Vec<RunRecord>> {
    let mut runs = Vec::with_capacity(run_ids.len());
    for &run_id in run_ids {
        runs.push(service.get_run(run_id).await?);
    }
    Ok(runs)
}

/// Look up one iteration of a run's trace.
///
/// Without an explicit `iteration` the best one by evaluation is chosen.
pub async fn select_trace_iteration(
    service: &dyn RunService,
    run_id: i64,
    repeat: u32,
    fold: u32,
    iteration: Option<u32>,
) -> RunResult<TraceIteration> {
    let trace = service.get_run_trace(run_id).await?;
    let iteration = match iteration {
        Some(iteration) => iteration,
        None => trace.selected_iteration(repeat, fold)?,
    };
    trace
        .get(repeat, fold, iteration)
        .cloned()
        .ok_or(RunError::TraceIterationNotFound {
            repeat,
            fold,
            iteration: Some(iteration),
        })
}

/// Upload `run` and record the id the service assigned.
pub async fn publish_run(service: &dyn RunService, run: &mut RunRecord) -> RunResult<i64> {
    let run_id = service.publish_run(run).await?;
    run.run_id = Some(run_id);
    if let Some(trace) = run.trace.as_mut() {
        trace.run_id = Some(run_id);
    }
    info!(run_id, task_id = run.task_id, "run published");
    Ok(run_id)
}
