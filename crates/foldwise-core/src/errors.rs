//! Error types for run execution and run document decoding.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::service::ServiceError;

/// Errors raised while executing a run or assembling its record.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The task kind has no execution or encoding support (e.g. subgroup discovery).
    #[error("unsupported task type: {task_type}")]
    UnsupportedTaskType { task_type: String },

    /// The estimator failed while fitting or predicting one partition cell.
    #[error("estimator failed at repeat {repeat}, fold {fold}, sample {sample}: {source}")]
    Estimator {
        repeat: u32,
        fold: u32,
        sample: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Predictions do not line up with the test set or the task kind.
    #[error("prediction mismatch: {message}")]
    PredictionMismatch { message: String },

    /// A predicted or true class index does not exist in the task's label vocabulary.
    #[error("class index {index} out of range for {n_classes} class labels")]
    ClassIndexOutOfRange { index: usize, n_classes: usize },

    /// The partition scheme is inconsistent.
    #[error("invalid split: {message}")]
    InvalidSplit { message: String },

    /// The optimization trace violates its invariants.
    #[error("invalid trace: {message}")]
    InvalidTrace { message: String },

    /// The requested (repeat, fold, iteration) is not part of the trace.
    #[error("trace has no iteration for repeat {repeat}, fold {fold}, iteration {iteration:?}")]
    TraceIterationNotFound {
        repeat: u32,
        fold: u32,
        iteration: Option<u32>,
    },

    /// Local and remote flow identities disagree.
    #[error("flow mismatch: {message}")]
    FlowMismatch { message: String },

    /// The (task, setup) pair already has runs on the service.
    #[error("one or more runs of this setup were already performed on the task: {run_ids:?}")]
    DuplicateRunsExist { run_ids: BTreeSet<i64> },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl RunError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DuplicateRunsExist { .. } => 1,
            Self::UnsupportedTaskType { .. } => 2,
            Self::FlowMismatch { .. } => 2,
            Self::InvalidSplit { .. } => 2,
            Self::Estimator { .. } => 3,
            Self::PredictionMismatch { .. } => 3,
            Self::ClassIndexOutOfRange { .. } => 3,
            Self::InvalidTrace { .. } => 4,
            Self::TraceIterationNotFound { .. } => 4,
            Self::Codec(_) => 4,
            Self::Service(_) => 5,
        }
    }

    /// Whether the caller may choose to continue (only duplicate runs are advisory).
    pub fn is_advisory(&self) -> bool {
        matches!(self, Self::DuplicateRunsExist { .. })
    }

    pub(crate) fn estimator(repeat: u32, fold: u32, sample: u32, err: anyhow::Error) -> Self {
        Self::Estimator {
            repeat,
            fold,
            sample,
            source: err.into(),
        }
    }

    pub(crate) fn prediction_mismatch(message: impl Into<String>) -> Self {
        Self::PredictionMismatch {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_trace(message: impl Into<String>) -> Self {
        Self::InvalidTrace {
            message: message.into(),
        }
    }
}

/// Errors raised while encoding or decoding run, trace and prediction documents.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A field required for authoritative (service-originated) documents is absent.
    #[error("document is missing required field: {field}")]
    IncompleteRemoteDocument { field: String },

    /// A field is present but has the wrong shape or cannot be parsed.
    #[error("malformed field {field}: {reason}")]
    MalformedField { field: String, reason: String },

    /// The document describes a task kind that cannot be decoded.
    #[error("unsupported task type: {task_type}")]
    UnsupportedTaskType { task_type: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CodecError {
    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::IncompleteRemoteDocument {
            field: field.into(),
        }
    }

    pub(crate) fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for run execution.
pub type RunResult<T> = Result<T, RunError>;

/// Result type for document codecs.
pub type CodecResult<T> = Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_runs_are_advisory() {
        let err = RunError::DuplicateRunsExist {
            run_ids: [10, 11].into_iter().collect(),
        };
        assert!(err.is_advisory());
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("{10, 11}"));
    }

    #[test]
    fn estimator_error_keeps_source() {
        let err = RunError::estimator(0, 2, 1, anyhow::anyhow!("singular matrix"));
        assert!(!err.is_advisory());
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "singular matrix");
        assert!(err.to_string().contains("fold 2"));
    }

    #[test]
    fn codec_errors_name_the_field() {
        let err = CodecError::missing("run_id");
        assert_eq!(err.to_string(), "document is missing required field: run_id");
        let err: RunError = CodecError::malformed("flow_id", "not an integer").into();
        assert_eq!(err.exit_code(), 4);
    }
}
