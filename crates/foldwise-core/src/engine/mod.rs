//! Partition sweep, fold execution, row encoding and measure aggregation.

pub mod encode;
pub mod evaluation;
pub mod fold;
mod sweep;

pub use encode::{
    CellPredictions, PredictionLayout, PredictionRow, MEAN_ABSOLUTE_ERROR, PREDICTIVE_ACCURACY,
};
pub use evaluation::{EvaluationAggregator, FoldEvaluations, SampleEvaluations};
pub use fold::{run_fold, FoldOutcome, PartitionCell};
pub use sweep::{run_task, SweepOutcome};
