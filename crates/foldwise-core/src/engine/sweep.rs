use tracing::debug;

use super::encode::{CellPredictions, PredictionRow};
use super::evaluation::{EvaluationAggregator, FoldEvaluations, SampleEvaluations};
use super::fold::{run_fold, PartitionCell};
use crate::errors::{RunError, RunResult};
use crate::model::Estimator;
use crate::split::PartitionProvider;
use crate::task::Task;
use crate::trace::{extract_trace_iterations, Trace, TraceIteration};

/// Everything collected by one full partition sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    /// Prediction rows in sweep order.
    pub predictions: Vec<PredictionRow>,
    /// Present when the estimator is a hyperparameter-search wrapper.
    pub trace: Option<Trace>,
    pub fold_evaluations: FoldEvaluations,
    pub sample_evaluations: SampleEvaluations,
}

/// Run `estimator` on every cell of the task's partition scheme.
///
/// Cells are visited repeat-major, sample-minor, each exactly once. The order
/// matters: per-fold measures and the retained fitted model are overwritten by
/// later cells. Any error aborts the sweep and discards what was collected.
pub fn run_task<E, P>(estimator: &E, task: &Task<P>, add_local_measures: bool) -> RunResult<SweepOutcome>
where
    E: Estimator,
    P: PartitionProvider,
{
    task.kind.ensure_supported()?;
    let dims = task.splits.split_dimensions();
    debug!(
        task_id = task.task_id,
        task_type = %task.kind,
        repeats = dims.repeats,
        folds = dims.folds,
        samples = dims.samples,
        "starting partition sweep"
    );

    let mut predictions: Vec<PredictionRow> = Vec::new();
    let mut trace_rows: Vec<TraceIteration> = Vec::new();
    let mut evaluations = EvaluationAggregator::new();
    // Fitted model of the most recent cell; after the loop this is the final cell's model.
    let mut last_fitted: Option<E> = None;

    for repeat in 0..dims.repeats {
        for fold in 0..dims.folds {
            for sample in 0..dims.samples {
                let (train, test) = task.splits.train_test_indices(repeat, fold, sample)?;
                let cell = PartitionCell {
                    repeat,
                    fold,
                    sample,
                    train,
                    test,
                };
                let outcome = run_fold(estimator, task, &cell, add_local_measures)?;

                let rows = task.kind.encode_rows(&CellPredictions {
                    repeat,
                    fold,
                    sample,
                    test_indices: &cell.test,
                    predictions: &outcome.predictions,
                    probabilities: outcome.probabilities.as_deref(),
                    truth: outcome.truth.as_ref(),
                })?;
                debug!(
                    repeat,
                    fold,
                    sample,
                    train = cell.train.len(),
                    test = cell.test.len(),
                    "cell executed"
                );
                predictions.extend(rows);

                if let Some(results) = outcome.fitted.search_results() {
                    trace_rows.extend(extract_trace_iterations(results, repeat, fold));
                }
                evaluations.record(repeat, fold, sample, &outcome.measures);

                last_fitted = Some(outcome.fitted);
            }
        }
    }

    // Only a fitted search wrapper carries its candidate results, so the trace
    // schema comes from the model of the final cell.
    let trace = if estimator.is_search() {
        let results = last_fitted
            .as_ref()
            .and_then(|model| model.search_results())
            .ok_or_else(|| {
                RunError::invalid_trace("search estimator exposed no search results after fitting")
            })?;
        Some(Trace::from_search(&results.parameter_names(), trace_rows)?)
    } else {
        None
    };

    let (fold_evaluations, sample_evaluations) = evaluations.into_maps();
    Ok(SweepOutcome {
        predictions,
        trace,
        fold_evaluations,
        sample_evaluations,
    })
}
