//! The tracking service seam.
//!
//! The engine never talks HTTP itself. Everything remote goes through
//! [`RunService`]; `foldwise-client` provides the HTTP implementation and
//! tests use in-memory fakes.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::CodecError;
use crate::flow::Flow;
use crate::run::{ParameterSetting, RunRecord};
use crate::trace::Trace;

/// Server error code for a query that matched nothing.
pub const NO_RESULTS_CODE: i64 = 512;

/// Format of `upload_time` in run listings.
pub const UPLOAD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors raised by a [`RunService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The query matched nothing (server code 512).
    #[error("no results: {message}")]
    NoResults { message: String },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// The server answered with an error status.
    #[error("server error (HTTP {status}, code {code:?}): {message}")]
    Server {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ServiceError {
    /// Whether the transport may retry the request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network { .. } => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_no_results(&self) -> bool {
        matches!(self, Self::NoResults { .. })
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Filters for run listings. Empty id lists do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFilter {
    #[serde(default)]
    pub ids: Vec<i64>,
    #[serde(default)]
    pub tasks: Vec<i64>,
    #[serde(default)]
    pub setups: Vec<i64>,
    #[serde(default)]
    pub flows: Vec<i64>,
    #[serde(default)]
    pub uploaders: Vec<i64>,
    #[serde(default)]
    pub tag: Option<String>,
    /// Include runs the server marked as failed.
    #[serde(default)]
    pub display_errors: bool,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl RunFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.ids.extend(ids);
        self
    }

    pub fn with_tasks(mut self, tasks: impl IntoIterator<Item = i64>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    pub fn with_setups(mut self, setups: impl IntoIterator<Item = i64>) -> Self {
        self.setups.extend(setups);
        self
    }

    pub fn with_flows(mut self, flows: impl IntoIterator<Item = i64>) -> Self {
        self.flows.extend(flows);
        self
    }

    pub fn with_uploaders(mut self, uploaders: impl IntoIterator<Item = i64>) -> Self {
        self.uploaders.extend(uploaders);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn show_errors(mut self, display_errors: bool) -> Self {
        self.display_errors = display_errors;
        self
    }

    pub fn page(mut self, offset: u64, size: u64) -> Self {
        self.offset = Some(offset);
        self.size = Some(size);
        self
    }

    /// Listing path segments, e.g. `["run", "list", "run", "1,2", "task", "3"]`.
    ///
    /// Segments are unescaped; a client encodes each one on its own.
    pub fn path_segments(&self) -> Vec<String> {
        fn join(ids: &[i64]) -> String {
            ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
        }

        let mut segments = vec!["run".to_string(), "list".to_string()];
        let mut push = |key: &str, value: String| {
            segments.push(key.to_string());
            segments.push(value);
        };
        if let Some(size) = self.size {
            push("limit", size.to_string());
        }
        if let Some(offset) = self.offset {
            push("offset", offset.to_string());
        }
        if let Some(tag) = &self.tag {
            push("tag", tag.clone());
        }
        for (segment, ids) in [
            ("run", &self.ids),
            ("task", &self.tasks),
            ("setup", &self.setups),
            ("flow", &self.flows),
            ("uploader", &self.uploaders),
        ] {
            if !ids.is_empty() {
                push(segment, join(ids));
            }
        }
        if self.display_errors {
            push("show_errors", "true".to_string());
        }
        segments
    }

    /// Render as a listing path, e.g. `run/list/run/1,2/task/3/show_errors/true`.
    pub fn to_path(&self) -> String {
        self.path_segments().join("/")
    }
}

/// One entry of a run listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub task_id: i64,
    pub setup_id: i64,
    pub flow_id: i64,
    pub uploader: i64,
    pub upload_time: NaiveDateTime,
    /// Empty when the run has no error.
    #[serde(default)]
    pub error_message: String,
}

impl RunSummary {
    pub fn has_error(&self) -> bool {
        !self.error_message.is_empty()
    }

    pub fn parse_upload_time(text: &str) -> ServiceResult<NaiveDateTime> {
        NaiveDateTime::parse_from_str(text.trim(), UPLOAD_TIME_FORMAT).map_err(|e| {
            ServiceError::InvalidResponse {
                message: format!("invalid upload_time {:?}: {}", text, e),
            }
        })
    }
}

/// Remote operations needed to check, fetch and publish runs.
///
/// Calls are awaited one at a time; implementations own retry and timeout
/// policy.
#[async_trait]
pub trait RunService: Send + Sync {
    /// Runs matching `filter`, keyed by run id.
    ///
    /// An empty match may be reported as [`ServiceError::NoResults`].
    async fn list_runs(&self, filter: &RunFilter) -> ServiceResult<BTreeMap<i64, RunSummary>>;

    /// Fetch one run description, strictly decoded.
    async fn get_run(&self, run_id: i64) -> ServiceResult<RunRecord>;

    async fn get_run_trace(&self, run_id: i64) -> ServiceResult<Trace>;

    /// Id of the flow with this name and external version, if the service knows it.
    async fn flow_exists(&self, name: &str, external_version: &str) -> ServiceResult<Option<i64>>;

    /// Id of the setup binding `parameters` on `flow_id`, if the service knows it.
    async fn setup_exists(
        &self,
        flow_id: i64,
        parameters: &[ParameterSetting],
    ) -> ServiceResult<Option<i64>>;

    /// Upload a flow description with `tags` and return the id the service assigned.
    async fn publish_flow(&self, flow: &Flow, tags: &[String]) -> ServiceResult<i64>;

    /// Upload a run and return the id the service assigned.
    async fn publish_run(&self, run: &RunRecord) -> ServiceResult<i64>;
}
