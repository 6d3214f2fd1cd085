use std::path::Path;

use anyhow::Context;
use foldwise_client::{ServiceClient, ServiceConfig};
use foldwise_core::{EvaluationValue, RunRecord};
use serde_json::Value;

pub fn service_client(config: Option<&Path>) -> anyhow::Result<ServiceClient> {
    let config = match config {
        Some(path) => ServiceConfig::from_yaml_file(path)
            .with_context(|| format!("loading service config {}", path.display()))?,
        None => ServiceConfig::from_env(),
    };
    tracing::debug!(url = %config.url, "using tracking service");
    Ok(ServiceClient::new(config)?)
}

pub fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn mean(values: impl Iterator<Item = f64>) -> Option<(f64, usize)> {
    let (sum, count) = values.fold((0.0, 0), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| (sum / count as f64, count))
}

/// Human-readable run summary.
pub fn render_run(run: &RunRecord) -> String {
    let mut out = Vec::new();
    let identity = match run.run_id {
        Some(id) => id.to_string(),
        None => "local (unpublished)".to_string(),
    };
    out.push(format!("run:          {}", identity));
    out.push(format!(
        "task:         {} ({})",
        run.task_id,
        run.task_type.as_deref().unwrap_or("unknown type")
    ));
    out.push(format!(
        "flow:         {} {}",
        or_dash(run.flow_id),
        run.flow_name.as_deref().unwrap_or("")
    ));
    out.push(format!("setup:        {}", or_dash(run.setup_id)));
    out.push(format!("dataset:      {}", or_dash(run.dataset_id)));
    if !run.tags.is_empty() {
        out.push(format!("tags:         {}", run.tags.join(", ")));
    }
    if let Some(predictions) = &run.predictions {
        out.push(format!("predictions:  {} rows", predictions.len()));
    }
    if let Some(trace) = &run.trace {
        out.push(format!("trace:        {} iterations", trace.len()));
    }

    if !run.evaluations.is_empty() || !run.measure_names().is_empty() {
        out.push("measures:".to_string());
    }
    for (name, value) in &run.evaluations {
        match value {
            EvaluationValue::Value(v) => out.push(format!("  {:<36} {:.4}", name, v)),
            EvaluationValue::ArrayData(data) => out.push(format!("  {:<36} {}", name, data)),
        }
    }
    for (name, repeats) in &run.fold_evaluations {
        let values = repeats.values().flat_map(|folds| folds.values().copied());
        if let Some((avg, n)) = mean(values) {
            out.push(format!("  {:<36} {:.4} (mean of {} folds)", name, avg, n));
        }
    }
    for (name, repeats) in &run.sample_evaluations {
        let values = repeats
            .values()
            .flat_map(|folds| folds.values())
            .flat_map(|samples| samples.values().copied());
        if let Some((avg, n)) = mean(values) {
            out.push(format!("  {:<36} {:.4} (mean of {} cells)", name, avg, n));
        }
    }
    out.join("\n")
}
