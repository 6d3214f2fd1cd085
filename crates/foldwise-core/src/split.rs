//! Partition schemes: train/test index sets per (repeat, fold, sample).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::{RunError, RunResult};

/// Cardinalities of a partition scheme, fixed for the task's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitDimensions {
    pub repeats: u32,
    pub folds: u32,
    pub samples: u32,
}

impl SplitDimensions {
    /// Total number of partition cells.
    pub fn cells(&self) -> usize {
        self.repeats as usize * self.folds as usize * self.samples as usize
    }
}

/// Source of deterministic train/test splits.
pub trait PartitionProvider {
    fn split_dimensions(&self) -> SplitDimensions;

    /// Train and test row indices for one cell. Repeated calls with the same
    /// triple return the same, disjoint sets.
    fn train_test_indices(&self, repeat: u32, fold: u32, sample: u32)
        -> RunResult<(Vec<usize>, Vec<usize>)>;
}

/// Role of a row within one partition cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SplitRole {
    Train,
    Test,
}

/// One line of a split file: row `row_id` plays `role` in the given cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAssignment {
    #[serde(rename = "type")]
    pub role: SplitRole,
    #[serde(rename = "rowid")]
    pub row_id: usize,
    pub repeat: u32,
    pub fold: u32,
    #[serde(default)]
    pub sample: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Split {
    train: Vec<usize>,
    test: Vec<usize>,
}

/// In-memory partition scheme, indexed by (repeat, fold, sample).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splits {
    dimensions: SplitDimensions,
    cells: BTreeMap<(u32, u32, u32), Split>,
}

impl Splits {
    /// Build the scheme from split-file assignments.
    ///
    /// Dimensions are derived from the largest indices seen. Every cell of the
    /// cross product must be present, and no row may be both train and test
    /// within one cell.
    pub fn from_assignments(
        assignments: impl IntoIterator<Item = SplitAssignment>,
    ) -> RunResult<Self> {
        let mut cells: BTreeMap<(u32, u32, u32), Split> = BTreeMap::new();
        for a in assignments {
            let split = cells.entry((a.repeat, a.fold, a.sample)).or_default();
            match a.role {
                SplitRole::Train => split.train.push(a.row_id),
                SplitRole::Test => split.test.push(a.row_id),
            }
        }

        if cells.is_empty() {
            return Err(RunError::InvalidSplit {
                message: "no split assignments".to_string(),
            });
        }

        let dimensions = SplitDimensions {
            repeats: cells.keys().map(|k| k.0).max().unwrap_or(0) + 1,
            folds: cells.keys().map(|k| k.1).max().unwrap_or(0) + 1,
            samples: cells.keys().map(|k| k.2).max().unwrap_or(0) + 1,
        };
        if cells.len() != dimensions.cells() {
            return Err(RunError::InvalidSplit {
                message: format!(
                    "expected {} cells for {} repeats x {} folds x {} samples, found {}",
                    dimensions.cells(),
                    dimensions.repeats,
                    dimensions.folds,
                    dimensions.samples,
                    cells.len()
                ),
            });
        }

        for (&(repeat, fold, sample), split) in &cells {
            let train: BTreeSet<usize> = split.train.iter().copied().collect();
            if let Some(row) = split.test.iter().find(|r| train.contains(r)) {
                return Err(RunError::InvalidSplit {
                    message: format!(
                        "row {} is in both train and test of repeat {}, fold {}, sample {}",
                        row, repeat, fold, sample
                    ),
                });
            }
        }

        Ok(Self { dimensions, cells })
    }

    pub fn dimensions(&self) -> SplitDimensions {
        self.dimensions
    }
}

impl PartitionProvider for Splits {
    fn split_dimensions(&self) -> SplitDimensions {
        self.dimensions
    }

    fn train_test_indices(
        &self,
        repeat: u32,
        fold: u32,
        sample: u32,
    ) -> RunResult<(Vec<usize>, Vec<usize>)> {
        let split = self
            .cells
            .get(&(repeat, fold, sample))
            .ok_or_else(|| RunError::InvalidSplit {
                message: format!(
                    "no split for repeat {}, fold {}, sample {}",
                    repeat, fold, sample
                ),
            })?;
        Ok((split.train.clone(), split.test.clone()))
    }
}
