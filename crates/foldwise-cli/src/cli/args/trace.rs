use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
pub struct TraceArgs {
    #[command(subcommand)]
    pub cmd: TraceSub,
}

#[derive(Subcommand, Debug)]
pub enum TraceSub {
    /// Show the selected (or a given) iteration of a run's trace
    Select(TraceSelectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TraceSelectArgs {
    #[arg(long)]
    pub run: i64,

    #[arg(long)]
    pub repeat: u32,

    #[arg(long)]
    pub fold: u32,

    /// Iteration to look up; defaults to the selected one
    #[arg(long)]
    pub iteration: Option<u32>,
}
