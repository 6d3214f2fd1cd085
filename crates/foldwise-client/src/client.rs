//! HTTP client for the run tracking service.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use foldwise_core::service::NO_RESULTS_CODE;
use foldwise_core::{
    CodecError, DecodeMode, Flow, ParameterSetting, RunError, RunFilter, RunRecord, RunService,
    RunSummary, ServiceError, ServiceResult, Trace,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Url;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ServiceConfig;

/// User agent for service requests.
pub const CLIENT_USER_AGENT: &str = concat!("foldwise-client/", env!("CARGO_PKG_VERSION"));

/// First retry waits twice this long; each further retry doubles it.
const BACKOFF_BASE_MS: u64 = 250;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Run tracking service client.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: reqwest::Client,
    base_url: String,
    config: ServiceConfig,
}

impl ServiceClient {
    /// Create a new client.
    pub fn new(config: ServiceConfig) -> ServiceResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let base_url = config.url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url).map_err(|e| ServiceError::Config {
            message: format!("invalid service url {:?}: {}", config.url, e),
        })?;
        if base.cannot_be_a_base() {
            return Err(ServiceError::Config {
                message: format!("service url {:?} cannot take a path", config.url),
            });
        }

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> ServiceResult<Self> {
        Self::new(ServiceConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Endpoint URL; each segment is percent-encoded on its own.
    fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> ServiceResult<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| ServiceError::Config {
            message: format!("invalid service url {:?}: {}", self.base_url, e),
        })?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::Config {
                message: format!("service url {:?} cannot take a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<S: AsRef<str> + Sync>(&self, segments: &[S]) -> ServiceResult<Value> {
        let url = self.endpoint(segments)?;
        let response = self.request(reqwest::Method::GET, &url, None).await?;
        read_json(response).await
    }

    async fn post_json<S: AsRef<str> + Sync>(
        &self,
        segments: &[S],
        body: &Value,
    ) -> ServiceResult<Value> {
        let url = self.endpoint(segments)?;
        let response = self
            .request(reqwest::Method::POST, &url, Some(body))
            .await?;
        read_json(response).await
    }

    /// Make a request with retry and rate limit handling.
    async fn request(
        &self,
        method: reqwest::Method,
        url: &Url,
        body: Option<&Value>,
    ) -> ServiceResult<reqwest::Response> {
        let mut retries = 0;
        let max_retries = self.config.max_retries;

        loop {
            match self.request_once(method.clone(), url, body).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;

                    let backoff = match &e {
                        ServiceError::RateLimited {
                            retry_after: Some(retry_after),
                        } => *retry_after,
                        _ => retry_backoff(retries),
                    };
                    let backoff = backoff.min(MAX_BACKOFF);

                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Make a single request without retry.
    async fn request_once(
        &self,
        method: reqwest::Method,
        url: &Url,
        body: Option<&Value>,
    ) -> ServiceResult<reqwest::Response> {
        debug!(url = %url, method = %method, "service request");

        let mut request = self.client.request(method, url.clone());
        if let Some(api_key) = &self.config.api_key {
            request = request.query(&[("api_key", api_key)]);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(network)?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => Ok(response),

            401 | 403 => Err(ServiceError::Unauthorized {
                message: "invalid or missing API key".to_string(),
            }),

            404 => Err(ServiceError::NotFound {
                resource: url.path().to_string(),
            }),

            429 => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(ServiceError::RateLimited { retry_after })
            }

            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(server_error(status.as_u16(), &text))
            }
        }
    }

    /// Fetch one listing page.
    async fn list_page(&self, filter: &RunFilter) -> ServiceResult<BTreeMap<i64, RunSummary>> {
        let doc = self.get_json(&filter.path_segments()).await?;
        parse_run_list(&doc)
    }
}

#[async_trait]
impl RunService for ServiceClient {
    /// Without an explicit page the listing is fetched in batches of
    /// `list_batch_size` until a short or empty page.
    async fn list_runs(&self, filter: &RunFilter) -> ServiceResult<BTreeMap<i64, RunSummary>> {
        if filter.offset.is_some() || filter.size.is_some() {
            return self.list_page(filter).await;
        }

        let batch = self.config.list_batch_size.max(1);
        let mut runs = BTreeMap::new();
        let mut offset = 0;
        loop {
            let page = match self.list_page(&filter.clone().page(offset, batch)).await {
                Ok(page) => page,
                Err(e) if e.is_no_results() && !runs.is_empty() => break,
                Err(e) => return Err(e),
            };
            let fetched = page.len() as u64;
            runs.extend(page);
            debug!(offset, fetched, total = runs.len(), "listed run page");
            if fetched < batch {
                break;
            }
            offset += batch;
        }
        Ok(runs)
    }

    async fn get_run(&self, run_id: i64) -> ServiceResult<RunRecord> {
        let doc = self.get_json(&["run".to_string(), run_id.to_string()]).await?;
        Ok(RunRecord::from_document(&doc, DecodeMode::Strict)?)
    }

    async fn get_run_trace(&self, run_id: i64) -> ServiceResult<Trace> {
        let doc = self
            .get_json(&["run".to_string(), "trace".to_string(), run_id.to_string()])
            .await?;
        Trace::from_document(&doc).map_err(|e| match e {
            RunError::Codec(codec) => ServiceError::Codec(codec),
            other => ServiceError::InvalidResponse {
                message: other.to_string(),
            },
        })
    }

    async fn flow_exists(&self, name: &str, external_version: &str) -> ServiceResult<Option<i64>> {
        let doc = self
            .get_json(&["flow", "exists", name, external_version])
            .await?;
        existing_id(&doc, "flow_exists")
    }

    async fn setup_exists(
        &self,
        flow_id: i64,
        parameters: &[ParameterSetting],
    ) -> ServiceResult<Option<i64>> {
        let body = json!({
            "setup": {
                "flow_id": flow_id.to_string(),
                "parameter_setting": parameters,
            }
        });
        let doc = self.post_json(&["setup", "exists"], &body).await?;
        existing_id(&doc, "setup_exists")
    }

    async fn publish_flow(&self, flow: &Flow, tags: &[String]) -> ServiceResult<i64> {
        let doc = self.post_json(&["flow"], &flow.to_document(tags)).await?;
        let flow_id = doc
            .get("upload_flow")
            .and_then(|u| u.get("id"))
            .ok_or_else(|| invalid("upload response has no upload_flow.id"))
            .and_then(|v| int_value(v, "upload_flow.id"))?;
        debug!(flow_id, flow = %flow.name, "flow uploaded");
        Ok(flow_id)
    }

    async fn publish_run(&self, run: &RunRecord) -> ServiceResult<i64> {
        let predictions = run.predictions.as_ref().ok_or_else(|| {
            ServiceError::Codec(CodecError::IncompleteRemoteDocument {
                field: "predictions".to_string(),
            })
        })?;
        let mut body = json!({
            "description": run.to_document(),
            "predictions": predictions.to_document()?,
        });
        if let Some(trace) = &run.trace {
            body["trace"] = trace.to_document()?;
        }

        let doc = self.post_json(&["run"], &body).await?;
        let run_id = doc
            .get("upload_run")
            .and_then(|u| u.get("run_id"))
            .ok_or_else(|| invalid("upload response has no upload_run.run_id"))
            .and_then(|v| int_value(v, "upload_run.run_id"))?;
        debug!(run_id, task_id = run.task_id, "run uploaded");
        Ok(run_id)
    }
}

/// Exponential backoff for the `retries`-th retry, capped at [`MAX_BACKOFF`].
fn retry_backoff(retries: u32) -> Duration {
    let factor = 1u64.checked_shl(retries).unwrap_or(u64::MAX);
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(factor)).min(MAX_BACKOFF)
}

fn network(err: reqwest::Error) -> ServiceError {
    ServiceError::Network {
        message: err.to_string(),
    }
}

fn invalid(message: impl Into<String>) -> ServiceError {
    ServiceError::InvalidResponse {
        message: message.into(),
    }
}

async fn read_json(response: reqwest::Response) -> ServiceResult<Value> {
    response
        .json()
        .await
        .map_err(|e| invalid(format!("failed to parse response body: {}", e)))
}

/// Map an error status to a service error.
///
/// Error bodies look like `{"error": {"code": "512", "message": "..."}}`; code
/// 512 is the "no results" answer to a query.
fn server_error(status: u16, body: &str) -> ServiceError {
    let error = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|doc| doc.get("error").cloned());
    let code = error
        .as_ref()
        .and_then(|e| e.get("code"))
        .and_then(|c| int_value(c, "error.code").ok());
    let message = error
        .as_ref()
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());

    if code == Some(NO_RESULTS_CODE) {
        return ServiceError::NoResults { message };
    }
    ServiceError::Server {
        status,
        code,
        message,
    }
}

fn int_value(value: &Value, field: &str) -> ServiceResult<i64> {
    let parsed = match value {
        Value::String(text) => text.trim().parse().ok(),
        Value::Number(number) => number.as_i64(),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(format!("{} is not an integer: {}", field, value)))
}

fn str_value<'a>(entry: &'a Value, field: &str) -> ServiceResult<&'a str> {
    entry
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("run listing entry has no {}", field)))
}

/// `{"<root>": {"exists": "true", "id": "7"}}` → `Some(7)`.
fn existing_id(doc: &Value, root: &str) -> ServiceResult<Option<i64>> {
    let answer = doc
        .get(root)
        .ok_or_else(|| invalid(format!("response has no {}", root)))?;
    let exists = match answer.get("exists") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => return Err(invalid(format!("{}.exists is missing", root))),
    };
    if !exists {
        return Ok(None);
    }
    let id = answer
        .get("id")
        .ok_or_else(|| invalid(format!("{}.id is missing", root)))
        .and_then(|v| int_value(v, "id"))?;
    Ok((id > 0).then_some(id))
}

fn parse_run_list(doc: &Value) -> ServiceResult<BTreeMap<i64, RunSummary>> {
    let entries = doc
        .get("runs")
        .and_then(|r| r.get("run"))
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("run listing has no runs.run sequence"))?;

    entries
        .iter()
        .map(|entry| {
            let field = |name: &str| {
                entry
                    .get(name)
                    .ok_or_else(|| invalid(format!("run listing entry has no {}", name)))
                    .and_then(|v| int_value(v, name))
            };
            let summary = RunSummary {
                run_id: field("run_id")?,
                task_id: field("task_id")?,
                setup_id: field("setup_id")?,
                flow_id: field("flow_id")?,
                uploader: field("uploader")?,
                upload_time: RunSummary::parse_upload_time(str_value(entry, "upload_time")?)?,
                error_message: entry
                    .get("error_message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            };
            Ok((summary.run_id, summary))
        })
        .collect()
}
