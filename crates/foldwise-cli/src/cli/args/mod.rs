use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod runs;
pub mod trace;
pub use runs::*;
pub use trace::*;

#[derive(Parser)]
#[command(
    name = "foldwise",
    version,
    about = "Inspect, check and publish partitioned model evaluation runs"
)]
pub struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Service config file (YAML). Defaults to FOLDWISE_* environment variables.
    #[arg(long, global = true, env = "FOLDWISE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Summarize a run stored in a local directory
    Inspect(InspectArgs),
    /// Remote run listing, retrieval, duplicate check and upload
    Runs(RunsArgs),
    /// Optimization trace lookups
    Trace(TraceArgs),
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Run directory written by the local run store
    pub dir: PathBuf,
}
