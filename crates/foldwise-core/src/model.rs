//! The estimator seam: what the engine needs from a model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::Targets;

/// Training input for one partition cell.
#[derive(Debug, Clone, Copy)]
pub enum FitInput<'a> {
    /// Feature rows and targets gathered from the training indices.
    Supervised { x: &'a [Vec<f64>], y: &'a Targets },
    /// Clustering receives the index set directly, together with the full
    /// feature matrix it indexes into.
    Clustering {
        data: &'a [Vec<f64>],
        indices: &'a [usize],
    },
}

/// Prediction input for one partition cell.
#[derive(Debug, Clone, Copy)]
pub enum PredictInput<'a> {
    Supervised { x: &'a [Vec<f64>] },
    Clustering {
        data: &'a [Vec<f64>],
        indices: &'a [usize],
    },
}

impl PredictInput<'_> {
    /// Number of instances to predict.
    pub fn len(&self) -> usize {
        match self {
            Self::Supervised { x } => x.len(),
            Self::Clustering { indices, .. } => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One prediction per test instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predictions {
    /// Class indices into the task's label vocabulary.
    Classes(Vec<usize>),
    Values(Vec<f64>),
    Clusters(Vec<i64>),
}

impl Predictions {
    pub fn len(&self) -> usize {
        match self {
            Self::Classes(v) => v.len(),
            Self::Values(v) => v.len(),
            Self::Clusters(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Class probabilities as produced by a fitted model.
///
/// Column `j` holds the probability of class index `classes[j]`. A model
/// trained on a fold that lacks some classes reports fewer columns than the
/// task has labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub classes: Vec<usize>,
    pub rows: Vec<Vec<f64>>,
}

/// One configuration evaluated by a hyperparameter search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub parameters: BTreeMap<String, Value>,
    pub mean_test_score: f64,
}

/// Candidate evaluations held by a fitted hyperparameter-search wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub candidates: Vec<SearchCandidate>,
    /// Index of the configuration the search itself selected.
    pub best_index: usize,
}

impl SearchResults {
    /// Union of the parameter names across all candidates.
    pub fn parameter_names(&self) -> std::collections::BTreeSet<String> {
        self.candidates
            .iter()
            .flat_map(|c| c.parameters.keys().cloned())
            .collect()
    }
}

/// A trainable model.
///
/// The engine clones the unfitted template for every partition cell and fits
/// the clone, so no fitted state leaks between cells.
pub trait Estimator: Clone {
    fn fit(&mut self, input: FitInput<'_>) -> anyhow::Result<()>;

    fn predict(&self, input: PredictInput<'_>) -> anyhow::Result<Predictions>;

    /// Class probabilities, or `None` when the model does not support them.
    fn predict_proba(&self, _input: PredictInput<'_>) -> anyhow::Result<Option<ClassProbabilities>> {
        Ok(None)
    }

    /// Measures the model computed itself while fitting.
    fn reported_measures(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }

    /// Whether this (unfitted) model is a hyperparameter-search wrapper.
    fn is_search(&self) -> bool {
        false
    }

    /// Candidate evaluations, available on a fitted search wrapper.
    fn search_results(&self) -> Option<&SearchResults> {
        None
    }

    /// Seed any unseeded randomness.
    fn reseed(&mut self, _seed: u64) {}
}
