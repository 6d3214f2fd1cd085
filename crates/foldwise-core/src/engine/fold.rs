//! Execution of a single partition cell.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::warn;

use crate::errors::{RunError, RunResult};
use crate::model::{ClassProbabilities, Estimator, FitInput, PredictInput, Predictions};
use crate::split::PartitionProvider;
use crate::task::{Targets, Task};

pub const WALL_CLOCK_TRAINING: &str = "wall_clock_time_millis_training";
pub const WALL_CLOCK_TESTING: &str = "wall_clock_time_millis_testing";
pub const WALL_CLOCK_TOTAL: &str = "wall_clock_time_millis";

/// One (repeat, fold, sample) cell with its index sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionCell {
    pub repeat: u32,
    pub fold: u32,
    pub sample: u32,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Result of fitting and predicting one cell.
#[derive(Debug, Clone)]
pub struct FoldOutcome<E> {
    pub predictions: Predictions,
    /// One probability per class label (classification-like tasks only).
    pub probabilities: Option<Vec<Vec<f64>>>,
    /// True targets of the test instances (supervised tasks only).
    pub truth: Option<Targets>,
    pub measures: BTreeMap<String, f64>,
    /// The fitted clone of the estimator template.
    pub fitted: E,
}

/// Fit a fresh clone of `template` on the cell's training rows and predict its test rows.
pub fn run_fold<E, P>(
    template: &E,
    task: &Task<P>,
    cell: &PartitionCell,
    add_local_measures: bool,
) -> RunResult<FoldOutcome<E>>
where
    E: Estimator,
    P: PartitionProvider,
{
    let wrap = |e: anyhow::Error| RunError::estimator(cell.repeat, cell.fold, cell.sample, e);
    let mut model = template.clone();

    let (predictions, proba, truth, train_ms, test_ms) = if task.kind.is_supervised() {
        let targets = task.data.targets.as_ref().ok_or_else(|| {
            RunError::prediction_mismatch(format!("{} task has no targets", task.kind))
        })?;
        let train_x = task.data.select_rows(&cell.train)?;
        let train_y = targets.select(&cell.train)?;
        let test_x = task.data.select_rows(&cell.test)?;
        let test_y = targets.select(&cell.test)?;

        let started = Instant::now();
        model
            .fit(FitInput::Supervised {
                x: &train_x,
                y: &train_y,
            })
            .map_err(wrap)?;
        let train_ms = started.elapsed().as_secs_f64() * 1000.0;

        let started = Instant::now();
        let input = PredictInput::Supervised { x: &test_x };
        let predictions = model.predict(input).map_err(wrap)?;
        let proba = if task.kind.class_labels().is_some() {
            model.predict_proba(input).map_err(wrap)?
        } else {
            None
        };
        let test_ms = started.elapsed().as_secs_f64() * 1000.0;
        (predictions, proba, Some(test_y), train_ms, test_ms)
    } else {
        let started = Instant::now();
        model
            .fit(FitInput::Clustering {
                data: &task.data.features,
                indices: &cell.train,
            })
            .map_err(wrap)?;
        let train_ms = started.elapsed().as_secs_f64() * 1000.0;

        let started = Instant::now();
        let predictions = model
            .predict(PredictInput::Clustering {
                data: &task.data.features,
                indices: &cell.test,
            })
            .map_err(wrap)?;
        let test_ms = started.elapsed().as_secs_f64() * 1000.0;
        (predictions, None, None, train_ms, test_ms)
    };

    if predictions.len() != cell.test.len() {
        return Err(RunError::prediction_mismatch(format!(
            "estimator returned {} predictions for {} test instances",
            predictions.len(),
            cell.test.len()
        )));
    }

    let probabilities = match task.kind.class_labels() {
        Some(labels) => Some(full_probabilities(
            proba,
            &predictions,
            labels.len(),
            cell,
        )?),
        None => None,
    };

    let mut measures = model.reported_measures();
    measures.insert(WALL_CLOCK_TRAINING.to_string(), train_ms);
    measures.insert(WALL_CLOCK_TESTING.to_string(), test_ms);
    measures.insert(WALL_CLOCK_TOTAL.to_string(), train_ms + test_ms);
    if add_local_measures {
        if let Some((name, value)) = task.kind.local_measure(&predictions, truth.as_ref()) {
            measures.insert(name.to_string(), value);
        }
    }

    Ok(FoldOutcome {
        predictions,
        probabilities,
        truth,
        measures,
        fitted: model,
    })
}

/// Expand model probabilities to one column per class label.
///
/// Without model probabilities the predicted class gets probability one.
/// Classes the model never saw are padded with zero and reported with a
/// warning; the rows are still produced.
fn full_probabilities(
    proba: Option<ClassProbabilities>,
    predictions: &Predictions,
    n_classes: usize,
    cell: &PartitionCell,
) -> RunResult<Vec<Vec<f64>>> {
    let Predictions::Classes(predicted) = predictions else {
        return Err(RunError::prediction_mismatch(
            "classification task requires class predictions",
        ));
    };

    let Some(proba) = proba else {
        return predicted
            .iter()
            .map(|&class| {
                if class >= n_classes {
                    return Err(RunError::ClassIndexOutOfRange {
                        index: class,
                        n_classes,
                    });
                }
                let mut row = vec![0.0; n_classes];
                row[class] = 1.0;
                Ok(row)
            })
            .collect();
    };

    if let Some(&index) = proba.classes.iter().find(|&&c| c >= n_classes) {
        return Err(RunError::ClassIndexOutOfRange { index, n_classes });
    }
    if proba.rows.len() != predicted.len() {
        return Err(RunError::prediction_mismatch(format!(
            "{} probability rows for {} predictions",
            proba.rows.len(),
            predicted.len()
        )));
    }
    if proba.classes.len() != n_classes {
        warn!(
            repeat = cell.repeat,
            fold = cell.fold,
            sample = cell.sample,
            model_classes = proba.classes.len(),
            task_classes = n_classes,
            "estimator predicted probabilities for a subset of the class labels; padding absent classes with zero"
        );
    }

    proba
        .rows
        .iter()
        .map(|row| {
            if row.len() != proba.classes.len() {
                return Err(RunError::prediction_mismatch(format!(
                    "probability row has {} columns for {} classes",
                    row.len(),
                    proba.classes.len()
                )));
            }
            let mut full = vec![0.0; n_classes];
            for (&class, &p) in proba.classes.iter().zip(row) {
                full[class] = p;
            }
            Ok(full)
        })
        .collect()
}
