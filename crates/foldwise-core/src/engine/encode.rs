//! Prediction row encoding, one shape per task kind.
//!
//! | Kind | Row |
//! |------|-----|
//! | classification, learning curve | repeat, fold, sample, row index within the test set, one probability per class label, predicted label, true label |
//! | regression | repeat, fold, dataset row id, prediction, true value |
//! | clustering | dataset row id, cluster id |

use serde::{Deserialize, Serialize};

use crate::errors::{RunError, RunResult};
use crate::model::Predictions;
use crate::task::{Targets, TaskKind};

/// Measure name of the locally computed classification accuracy.
pub const PREDICTIVE_ACCURACY: &str = "predictive_accuracy";

/// Measure name of the locally computed regression error.
pub const MEAN_ABSOLUTE_ERROR: &str = "mean_absolute_error";

/// One row of the prediction table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionRow {
    Classification {
        repeat: u32,
        fold: u32,
        sample: u32,
        row_index: usize,
        probabilities: Vec<f64>,
        predicted: String,
        truth: String,
    },
    Regression {
        repeat: u32,
        fold: u32,
        row_id: usize,
        prediction: f64,
        truth: f64,
    },
    Clustering {
        row_id: usize,
        cluster: i64,
    },
}

/// Column layout of a prediction table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredictionLayout {
    Classification { class_labels: Vec<String> },
    Regression,
    Clustering,
}

/// Everything the encoder needs about one partition cell.
#[derive(Debug, Clone, Copy)]
pub struct CellPredictions<'a> {
    pub repeat: u32,
    pub fold: u32,
    pub sample: u32,
    pub test_indices: &'a [usize],
    pub predictions: &'a Predictions,
    /// One probability per class label, already padded to the vocabulary.
    pub probabilities: Option<&'a [Vec<f64>]>,
    pub truth: Option<&'a Targets>,
}

impl TaskKind {
    /// Layout of the prediction table produced for this kind.
    pub fn prediction_layout(&self) -> RunResult<PredictionLayout> {
        match self {
            Self::Classification { class_labels } | Self::LearningCurve { class_labels } => {
                Ok(PredictionLayout::Classification {
                    class_labels: class_labels.clone(),
                })
            }
            Self::Regression => Ok(PredictionLayout::Regression),
            Self::Clustering => Ok(PredictionLayout::Clustering),
            Self::SubgroupDiscovery => Err(RunError::UnsupportedTaskType {
                task_type: self.name().to_string(),
            }),
        }
    }

    /// Encode one row per test instance of the cell.
    pub fn encode_rows(&self, cell: &CellPredictions<'_>) -> RunResult<Vec<PredictionRow>> {
        if cell.predictions.len() != cell.test_indices.len() {
            return Err(RunError::prediction_mismatch(format!(
                "{} predictions for {} test instances",
                cell.predictions.len(),
                cell.test_indices.len()
            )));
        }
        match self {
            Self::Classification { class_labels } | Self::LearningCurve { class_labels } => {
                encode_classification(class_labels, cell)
            }
            Self::Regression => encode_regression(cell),
            Self::Clustering => encode_clustering(cell),
            Self::SubgroupDiscovery => Err(RunError::UnsupportedTaskType {
                task_type: self.name().to_string(),
            }),
        }
    }

    /// Consistency measure computed from the cell's predictions, if the kind has one.
    ///
    /// Classification-like kinds report accuracy, regression reports mean
    /// absolute error. Empty test sets yield nothing.
    pub fn local_measure(
        &self,
        predictions: &Predictions,
        truth: Option<&Targets>,
    ) -> Option<(&'static str, f64)> {
        match (self, predictions, truth) {
            (
                Self::Classification { .. } | Self::LearningCurve { .. },
                Predictions::Classes(pred),
                Some(Targets::Classes(truth)),
            ) if !pred.is_empty() && pred.len() == truth.len() => {
                let correct = pred.iter().zip(truth).filter(|(p, t)| p == t).count();
                Some((PREDICTIVE_ACCURACY, correct as f64 / pred.len() as f64))
            }
            (Self::Regression, Predictions::Values(pred), Some(Targets::Values(truth)))
                if !pred.is_empty() && pred.len() == truth.len() =>
            {
                let total: f64 = pred.iter().zip(truth).map(|(p, t)| (p - t).abs()).sum();
                Some((MEAN_ABSOLUTE_ERROR, total / pred.len() as f64))
            }
            _ => None,
        }
    }
}

fn label(class_labels: &[String], index: usize) -> RunResult<String> {
    class_labels
        .get(index)
        .cloned()
        .ok_or(RunError::ClassIndexOutOfRange {
            index,
            n_classes: class_labels.len(),
        })
}

fn encode_classification(
    class_labels: &[String],
    cell: &CellPredictions<'_>,
) -> RunResult<Vec<PredictionRow>> {
    let Predictions::Classes(predicted) = cell.predictions else {
        return Err(RunError::prediction_mismatch(
            "classification task requires class predictions",
        ));
    };
    let Some(Targets::Classes(truth)) = cell.truth else {
        return Err(RunError::prediction_mismatch(
            "classification task requires class targets",
        ));
    };
    let probabilities = cell.probabilities.ok_or_else(|| {
        RunError::prediction_mismatch("classification task requires class probabilities")
    })?;
    if probabilities.len() != predicted.len() || truth.len() != predicted.len() {
        return Err(RunError::prediction_mismatch(format!(
            "{} predictions, {} probability rows, {} targets",
            predicted.len(),
            probabilities.len(),
            truth.len()
        )));
    }

    predicted
        .iter()
        .zip(truth)
        .zip(probabilities)
        .enumerate()
        .map(|(i, ((&pred, &actual), proba))| {
            if proba.len() != class_labels.len() {
                return Err(RunError::prediction_mismatch(format!(
                    "probability row {} has {} columns, expected {}",
                    i,
                    proba.len(),
                    class_labels.len()
                )));
            }
            Ok(PredictionRow::Classification {
                repeat: cell.repeat,
                fold: cell.fold,
                sample: cell.sample,
                row_index: i,
                probabilities: proba.clone(),
                predicted: label(class_labels, pred)?,
                truth: label(class_labels, actual)?,
            })
        })
        .collect()
}

fn encode_regression(cell: &CellPredictions<'_>) -> RunResult<Vec<PredictionRow>> {
    let Predictions::Values(predicted) = cell.predictions else {
        return Err(RunError::prediction_mismatch(
            "regression task requires value predictions",
        ));
    };
    let Some(Targets::Values(truth)) = cell.truth else {
        return Err(RunError::prediction_mismatch(
            "regression task requires value targets",
        ));
    };
    if truth.len() != predicted.len() {
        return Err(RunError::prediction_mismatch(format!(
            "{} predictions for {} targets",
            predicted.len(),
            truth.len()
        )));
    }

    Ok(cell
        .test_indices
        .iter()
        .zip(predicted.iter().zip(truth))
        .map(|(&row_id, (&prediction, &truth))| PredictionRow::Regression {
            repeat: cell.repeat,
            fold: cell.fold,
            row_id,
            prediction,
            truth,
        })
        .collect())
}

fn encode_clustering(cell: &CellPredictions<'_>) -> RunResult<Vec<PredictionRow>> {
    let Predictions::Clusters(clusters) = cell.predictions else {
        return Err(RunError::prediction_mismatch(
            "clustering task requires cluster assignments",
        ));
    };
    Ok(cell
        .test_indices
        .iter()
        .zip(clusters)
        .map(|(&row_id, &cluster)| PredictionRow::Clustering { row_id, cluster })
        .collect())
}
