use anyhow::Context;
use foldwise_core::RunStore;

use crate::cli::args::{InspectArgs, OutputFormat};
use crate::cli::helpers::{print_json, render_run};
use crate::exit_codes::EXIT_SUCCESS;

pub fn run(args: InspectArgs, format: OutputFormat) -> anyhow::Result<i32> {
    let run = RunStore::load(&args.dir)
        .with_context(|| format!("loading run from {}", args.dir.display()))?;

    match format {
        OutputFormat::Text => println!("{}", render_run(&run)),
        OutputFormat::Json => print_json(&run.to_document())?,
    }
    Ok(EXIT_SUCCESS)
}
