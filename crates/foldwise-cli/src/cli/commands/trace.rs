use std::path::Path;

use anyhow::Context;
use foldwise_core::select_trace_iteration;

use crate::cli::args::{OutputFormat, TraceSelectArgs};
use crate::cli::helpers::{print_json, service_client};
use crate::exit_codes::EXIT_SUCCESS;

pub async fn cmd_select(
    args: TraceSelectArgs,
    config: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<i32> {
    let client = service_client(config)?;
    let iteration =
        select_trace_iteration(&client, args.run, args.repeat, args.fold, args.iteration)
            .await
            .with_context(|| format!("looking up trace of run {}", args.run))?;

    match format {
        OutputFormat::Text => {
            println!(
                "repeat {} fold {} iteration {}: evaluation {:.4}{}",
                iteration.repeat,
                iteration.fold,
                iteration.iteration,
                iteration.evaluation,
                if iteration.selected { " (selected)" } else { "" }
            );
            for (name, value) in &iteration.parameters {
                println!("  {} = {}", name, value);
            }
        }
        OutputFormat::Json => print_json(&serde_json::to_value(&iteration)?)?,
    }
    Ok(EXIT_SUCCESS)
}
