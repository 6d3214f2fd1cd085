//! Flow descriptions: the identity and parameter bindings of an estimator.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::run::ParameterSetting;

/// An estimator as known to the tracking service.
///
/// `flow_id` is `None` until the flow has been published or resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    #[serde(default)]
    pub flow_id: Option<i64>,
    pub name: String,
    pub external_version: String,
    #[serde(default)]
    pub setup_string: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterSetting>,
}

impl Flow {
    pub fn new(name: impl Into<String>, external_version: impl Into<String>) -> Self {
        Self {
            flow_id: None,
            name: name.into(),
            external_version: external_version.into(),
            setup_string: None,
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push(ParameterSetting::new(name, value));
        self
    }

    pub fn with_setup_string(mut self, setup_string: impl Into<String>) -> Self {
        self.setup_string = Some(setup_string.into());
        self
    }

    /// Parameter settings in declaration order, as attached to a run.
    pub fn parameter_settings(&self) -> Vec<ParameterSetting> {
        self.parameters.clone()
    }

    /// Flow upload document, `{"flow": {...}}`.
    ///
    /// Parameter defaults are the values bound on this flow.
    pub fn to_document(&self, tags: &[String]) -> Value {
        let mut flow = Map::new();
        flow.insert("name".into(), Value::String(self.name.clone()));
        flow.insert(
            "external_version".into(),
            Value::String(self.external_version.clone()),
        );
        if let Some(setup_string) = &self.setup_string {
            flow.insert("setup_string".into(), Value::String(setup_string.clone()));
        }
        let parameters: Vec<Value> = self
            .parameters
            .iter()
            .map(|p| json!({ "name": p.name, "default_value": p.value }))
            .collect();
        if !parameters.is_empty() {
            flow.insert("parameter".into(), Value::Array(parameters));
        }
        if !tags.is_empty() {
            flow.insert("tag".into(), json!(tags));
        }
        json!({ "flow": flow })
    }
}
