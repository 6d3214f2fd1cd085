//! Tasks: a dataset, a task kind and a fixed partition scheme.
//!
//! The engine only reads from a task. Loading datasets and partition files is
//! the caller's concern; see [`crate::split::Splits`] for the in-memory scheme.

use serde::{Deserialize, Serialize};

use crate::errors::{RunError, RunResult};
use crate::split::{PartitionProvider, Splits};

/// Kind of evaluation task.
///
/// Each variant carries what its prediction rows need (see
/// [`crate::engine::encode`]); only classification-like kinds carry labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    Classification { class_labels: Vec<String> },
    Regression,
    LearningCurve { class_labels: Vec<String> },
    Clustering,
    SubgroupDiscovery,
}

impl TaskKind {
    pub const CLASSIFICATION: &'static str = "Supervised Classification";
    pub const REGRESSION: &'static str = "Supervised Regression";
    pub const LEARNING_CURVE: &'static str = "Learning Curve";
    pub const CLUSTERING: &'static str = "Clustering";
    pub const SUBGROUP_DISCOVERY: &'static str = "Subgroup Discovery";

    /// Display name, as stored in the `task_type` field of run documents.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Classification { .. } => Self::CLASSIFICATION,
            Self::Regression => Self::REGRESSION,
            Self::LearningCurve { .. } => Self::LEARNING_CURVE,
            Self::Clustering => Self::CLUSTERING,
            Self::SubgroupDiscovery => Self::SUBGROUP_DISCOVERY,
        }
    }

    /// Numeric task type id used by the tracking service.
    pub fn type_id(&self) -> u32 {
        match self {
            Self::Classification { .. } => 1,
            Self::Regression => 2,
            Self::LearningCurve { .. } => 3,
            Self::Clustering => 5,
            Self::SubgroupDiscovery => 8,
        }
    }

    /// Class label vocabulary, for classification-like kinds.
    pub fn class_labels(&self) -> Option<&[String]> {
        match self {
            Self::Classification { class_labels } | Self::LearningCurve { class_labels } => {
                Some(class_labels)
            }
            _ => None,
        }
    }

    /// Whether train/test label slices are derived for this kind.
    pub fn is_supervised(&self) -> bool {
        matches!(
            self,
            Self::Classification { .. } | Self::Regression | Self::LearningCurve { .. }
        )
    }

    /// Fails with `UnsupportedTaskType` for kinds the engine cannot execute.
    pub fn ensure_supported(&self) -> RunResult<()> {
        match self {
            Self::SubgroupDiscovery => Err(RunError::UnsupportedTaskType {
                task_type: self.name().to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Ground truth for every row of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Targets {
    /// Class indices into the task's label vocabulary.
    Classes(Vec<usize>),
    /// Continuous targets.
    Values(Vec<f64>),
    /// No targets (clustering).
    None,
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Self::Classes(v) => v.len(),
            Self::Values(v) => v.len(),
            Self::None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gather the targets at `indices`, preserving order.
    pub fn select(&self, indices: &[usize]) -> RunResult<Targets> {
        let out_of_range = |i: usize| RunError::InvalidSplit {
            message: format!("row {} is outside the dataset ({} rows)", i, self.len()),
        };
        Ok(match self {
            Self::Classes(v) => Self::Classes(
                indices
                    .iter()
                    .map(|&i| v.get(i).copied().ok_or_else(|| out_of_range(i)))
                    .collect::<RunResult<_>>()?,
            ),
            Self::Values(v) => Self::Values(
                indices
                    .iter()
                    .map(|&i| v.get(i).copied().ok_or_else(|| out_of_range(i)))
                    .collect::<RunResult<_>>()?,
            ),
            Self::None => Self::None,
        })
    }
}

/// Feature matrix and targets of the task's dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskData {
    pub features: Vec<Vec<f64>>,
    pub targets: Option<Targets>,
}

impl TaskData {
    pub fn new(features: Vec<Vec<f64>>, targets: Targets) -> Self {
        let targets = match targets {
            Targets::None => None,
            other => Some(other),
        };
        Self { features, targets }
    }

    pub fn n_rows(&self) -> usize {
        self.features.len()
    }

    /// Gather feature rows at `indices`, preserving order.
    pub fn select_rows(&self, indices: &[usize]) -> RunResult<Vec<Vec<f64>>> {
        indices
            .iter()
            .map(|&i| {
                self.features
                    .get(i)
                    .cloned()
                    .ok_or_else(|| RunError::InvalidSplit {
                        message: format!("row {} is outside the dataset ({} rows)", i, self.n_rows()),
                    })
            })
            .collect()
    }
}

/// An evaluation task.
#[derive(Debug, Clone)]
pub struct Task<P = Splits> {
    pub task_id: i64,
    pub dataset_id: i64,
    pub kind: TaskKind,
    /// Measure the task is optimized for, when the task defines one.
    pub evaluation_measure: Option<String>,
    pub data: TaskData,
    pub splits: P,
}

impl<P: PartitionProvider> Task<P> {
    pub fn new(task_id: i64, dataset_id: i64, kind: TaskKind, data: TaskData, splits: P) -> Self {
        Self {
            task_id,
            dataset_id,
            kind,
            evaluation_measure: None,
            data,
            splits,
        }
    }

    pub fn with_evaluation_measure(mut self, measure: impl Into<String>) -> Self {
        self.evaluation_measure = Some(measure.into());
        self
    }

    /// Number of class labels, for classification-like tasks.
    pub fn n_classes(&self) -> Option<usize> {
        self.kind.class_labels().map(<[String]>::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_type_ids() {
        let kind = TaskKind::LearningCurve {
            class_labels: vec!["a".into()],
        };
        assert_eq!(kind.name(), "Learning Curve");
        assert_eq!(kind.type_id(), 3);
        assert_eq!(kind.class_labels().map(<[String]>::len), Some(1));
        assert!(TaskKind::Regression.class_labels().is_none());
    }

    #[test]
    fn subgroup_discovery_is_unsupported() {
        let err = TaskKind::SubgroupDiscovery.ensure_supported().unwrap_err();
        assert!(matches!(err, RunError::UnsupportedTaskType { task_type } if task_type == "Subgroup Discovery"));
        assert!(TaskKind::Clustering.ensure_supported().is_ok());
    }

    #[test]
    fn clustering_is_not_supervised() {
        assert!(!TaskKind::Clustering.is_supervised());
        assert!(TaskKind::Regression.is_supervised());
    }

    #[test]
    fn select_preserves_order_and_checks_bounds() {
        let targets = Targets::Classes(vec![0, 1, 2, 1]);
        assert_eq!(targets.select(&[3, 0]).unwrap(), Targets::Classes(vec![1, 0]));
        assert!(matches!(
            targets.select(&[9]),
            Err(RunError::InvalidSplit { .. })
        ));

        let data = TaskData::new(vec![vec![1.0], vec![2.0]], Targets::None);
        assert!(data.targets.is_none());
        assert_eq!(data.select_rows(&[1]).unwrap(), vec![vec![2.0]]);
    }
}
