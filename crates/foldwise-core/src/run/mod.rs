//! The run record and its documents.
//!
//! A run is described by three documents: the description (identifiers,
//! parameter settings, evaluations, files, tags), the prediction table and,
//! for search estimators, the optimization trace.

mod codec;
mod predictions;
mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::{FoldEvaluations, SampleEvaluations};
use crate::trace::Trace;

pub use codec::DecodeMode;
pub use predictions::PredictionTable;
pub use store::{RunStore, DESCRIPTION_FILE, PREDICTIONS_FILE, TRACE_FILE};

/// Name of the description file in `output_files`.
pub const DESCRIPTION_OUTPUT: &str = "description";

/// Name of the predictions file in `output_files`.
pub const PREDICTIONS_OUTPUT: &str = "predictions";

/// One flow parameter bound to a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSetting {
    pub name: String,
    pub value: String,
    /// Flow component the parameter belongs to, for nested flows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl ParameterSetting {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            component: None,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

/// A run-level evaluation: a scalar or an opaque array payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvaluationValue {
    Value(f64),
    ArrayData(String),
}

/// One execution of a setup against a task.
///
/// Service-assigned fields (`run_id`, `uploader`, `setup_id`, `output_files`,
/// run-level `evaluations`) stay empty for runs that were only executed
/// locally.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunRecord {
    pub run_id: Option<i64>,
    pub uploader: Option<i64>,
    pub uploader_name: Option<String>,
    pub task_id: i64,
    pub task_type: Option<String>,
    pub task_evaluation_measure: Option<String>,
    /// `None` until the flow is confirmed to exist on the service.
    pub flow_id: Option<i64>,
    pub flow_name: Option<String>,
    pub setup_id: Option<i64>,
    pub setup_string: Option<String>,
    /// Only set once the flow is known to the service.
    pub parameter_settings: Option<Vec<ParameterSetting>>,
    pub dataset_id: Option<i64>,
    /// File name → file id on the service.
    pub output_files: BTreeMap<String, i64>,
    pub evaluations: BTreeMap<String, EvaluationValue>,
    pub fold_evaluations: FoldEvaluations,
    pub sample_evaluations: SampleEvaluations,
    pub tags: Vec<String>,
    pub predictions: Option<PredictionTable>,
    pub trace: Option<Trace>,
}

impl RunRecord {
    pub fn new(task_id: i64) -> Self {
        Self {
            task_id,
            ..Self::default()
        }
    }

    /// Whether the service has assigned an identity to this run.
    pub fn is_published(&self) -> bool {
        self.run_id.is_some()
    }

    /// Names of every measure in the fold or sample maps.
    pub fn measure_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .fold_evaluations
            .keys()
            .chain(self.sample_evaluations.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
