//! Remote run command arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
pub struct RunsArgs {
    #[command(subcommand)]
    pub cmd: RunsSub,
}

#[derive(Subcommand, Debug)]
pub enum RunsSub {
    /// List runs matching the given filters
    List(RunsListArgs),
    /// Fetch one run description
    Get(RunsGetArgs),
    /// Check whether runs of a setup on a task already exist
    Exists(RunsExistsArgs),
    /// Upload a locally stored run
    Publish(RunsPublishArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunsListArgs {
    /// Run ids (repeatable)
    #[arg(long = "id")]
    pub ids: Vec<i64>,

    #[arg(long = "task")]
    pub tasks: Vec<i64>,

    #[arg(long = "setup")]
    pub setups: Vec<i64>,

    #[arg(long = "flow")]
    pub flows: Vec<i64>,

    #[arg(long = "uploader")]
    pub uploaders: Vec<i64>,

    #[arg(long)]
    pub tag: Option<String>,

    /// Include runs the server marked as failed
    #[arg(long)]
    pub show_errors: bool,

    /// Start of an explicit page (requires --size)
    #[arg(long, requires = "size")]
    pub offset: Option<u64>,

    /// Size of an explicit page; without it all pages are fetched
    #[arg(long)]
    pub size: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct RunsGetArgs {
    pub run_id: i64,
}

#[derive(Args, Debug, Clone)]
pub struct RunsExistsArgs {
    #[arg(long)]
    pub task: i64,

    #[arg(long)]
    pub setup: i64,
}

#[derive(Args, Debug, Clone)]
pub struct RunsPublishArgs {
    /// Run directory written by the local run store
    pub dir: PathBuf,
}
