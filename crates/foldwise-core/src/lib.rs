//! Run execution and evaluation aggregation for partitioned model evaluation.
//!
//! This crate provides:
//!
//! - the partition sweep over a task's (repeat, fold, sample) cells
//! - per-task-type prediction row encoding
//! - per-fold and per-sample measure aggregation
//! - optimization trace extraction and best-iteration selection
//! - the run record and its description, prediction and trace documents
//! - duplicate-run detection and flow synchronization against a [`RunService`]
//!
//! # Quick Start
//!
//! ```no_run
//! use foldwise_core::{execute_run, Flow, RunOptions, RunStore, Task};
//! # use foldwise_core::Estimator;
//!
//! # fn example<E: Estimator>(estimator: E, task: Task) -> anyhow::Result<()> {
//! let flow = Flow::new("forest", "1.0");
//! let run = execute_run(&estimator, &flow, &task, &RunOptions::default().allow_duplicates())?;
//! RunStore::save(std::path::Path::new("runs/31"), &run)?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod errors;
pub mod flow;
pub mod guard;
pub mod model;
pub mod run;
pub mod runner;
pub mod service;
pub mod split;
pub mod task;
pub mod trace;

pub use engine::{
    run_task, EvaluationAggregator, FoldEvaluations, PredictionLayout, PredictionRow,
    SampleEvaluations, SweepOutcome,
};
pub use errors::{CodecError, CodecResult, RunError, RunResult};
pub use flow::Flow;
pub use guard::{ensure_no_duplicate_runs, run_exists};
pub use model::{
    ClassProbabilities, Estimator, FitInput, PredictInput, Predictions, SearchCandidate,
    SearchResults,
};
pub use run::{DecodeMode, EvaluationValue, ParameterSetting, PredictionTable, RunRecord, RunStore};
pub use runner::{
    execute_run, get_runs, publish_run, run_flow_on_task, select_trace_iteration, RunOptions,
};
pub use service::{RunFilter, RunService, RunSummary, ServiceError, ServiceResult};
pub use split::{PartitionProvider, SplitAssignment, SplitDimensions, SplitRole, Splits};
pub use task::{Targets, Task, TaskData, TaskKind};
pub use trace::{Trace, TraceIteration};
