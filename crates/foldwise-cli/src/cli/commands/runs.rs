use std::path::Path;

use anyhow::Context;
use foldwise_core::{publish_run, run_exists, RunFilter, RunService, RunStore};
use serde_json::json;

use crate::cli::args::{
    OutputFormat, RunsExistsArgs, RunsGetArgs, RunsListArgs, RunsPublishArgs,
};
use crate::cli::helpers::{print_json, render_run, service_client};
use crate::exit_codes::{EXIT_DUPLICATES, EXIT_SUCCESS};

fn filter_from(args: &RunsListArgs) -> RunFilter {
    let mut filter = RunFilter::new()
        .with_ids(args.ids.iter().copied())
        .with_tasks(args.tasks.iter().copied())
        .with_setups(args.setups.iter().copied())
        .with_flows(args.flows.iter().copied())
        .with_uploaders(args.uploaders.iter().copied())
        .show_errors(args.show_errors);
    if let Some(tag) = &args.tag {
        filter = filter.with_tag(tag.clone());
    }
    if let Some(size) = args.size {
        filter = filter.page(args.offset.unwrap_or(0), size);
    }
    filter
}

pub async fn cmd_list(
    args: RunsListArgs,
    config: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<i32> {
    let client = service_client(config)?;
    let runs = match client.list_runs(&filter_from(&args)).await {
        Ok(runs) => runs,
        Err(e) if e.is_no_results() => Default::default(),
        Err(e) => return Err(e).context("listing runs"),
    };

    match format {
        OutputFormat::Text => {
            if runs.is_empty() {
                println!("no runs found");
            }
            for run in runs.values() {
                println!(
                    "{:>10} task {:>6} setup {:>8} flow {:>6} uploader {:>6} {}{}",
                    run.run_id,
                    run.task_id,
                    run.setup_id,
                    run.flow_id,
                    run.uploader,
                    run.upload_time,
                    if run.has_error() { " [error]" } else { "" }
                );
            }
        }
        OutputFormat::Json => {
            print_json(&serde_json::to_value(runs.values().collect::<Vec<_>>())?)?
        }
    }
    Ok(EXIT_SUCCESS)
}

pub async fn cmd_get(
    args: RunsGetArgs,
    config: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<i32> {
    let client = service_client(config)?;
    let run = client
        .get_run(args.run_id)
        .await
        .with_context(|| format!("fetching run {}", args.run_id))?;

    match format {
        OutputFormat::Text => println!("{}", render_run(&run)),
        OutputFormat::Json => print_json(&run.to_document())?,
    }
    Ok(EXIT_SUCCESS)
}

/// Exits with [`EXIT_DUPLICATES`] when matching runs exist.
pub async fn cmd_exists(
    args: RunsExistsArgs,
    config: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<i32> {
    let client = service_client(config)?;
    let ids = run_exists(&client, args.task, args.setup)
        .await
        .context("checking for existing runs")?;

    match format {
        OutputFormat::Text if ids.is_empty() => println!(
            "no runs of setup {} on task {}",
            args.setup, args.task
        ),
        OutputFormat::Text => println!(
            "existing runs: {}",
            ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
        ),
        OutputFormat::Json => print_json(&json!({ "run_ids": ids }))?,
    }
    Ok(if ids.is_empty() {
        EXIT_SUCCESS
    } else {
        EXIT_DUPLICATES
    })
}

/// Uploads the stored run and records the assigned id back into the directory.
pub async fn cmd_publish(
    args: RunsPublishArgs,
    config: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<i32> {
    let mut run = RunStore::load(&args.dir)
        .with_context(|| format!("loading run from {}", args.dir.display()))?;
    if let Some(run_id) = run.run_id {
        anyhow::bail!("run in {} is already published as {}", args.dir.display(), run_id);
    }

    let client = service_client(config)?;
    let run_id = publish_run(&client, &mut run)
        .await
        .context("publishing run")?;
    RunStore::save(&args.dir, &run)
        .with_context(|| format!("recording run id in {}", args.dir.display()))?;

    match format {
        OutputFormat::Text => println!("published run {}", run_id),
        OutputFormat::Json => print_json(&json!({ "run_id": run_id }))?,
    }
    Ok(EXIT_SUCCESS)
}
