use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod run;
mod worker;

/// Time the same page-fetch workload under sequential, async, thread-pool
/// and process-pool execution.
#[derive(Debug, Parser)]
#[command(name = "fanout", version, about, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the experiment (the default).
    Run(RunArgs),
    /// Serve fetch requests over stdin/stdout for the process pool.
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// YAML configuration file. Defaults to `fanout.yaml` when present.
    #[arg(short, long, env = "FANOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seed for batch sampling; overrides the configured one.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip the timing chart.
    #[arg(long)]
    pub no_chart: bool,

    /// Mirror logs to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Args)]
pub struct WorkerArgs {
    /// Fetch settings as JSON, passed down by the parent.
    #[arg(long)]
    pub settings: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Worker(args)) => worker::serve_stdio(&args),
        Some(Command::Run(args)) => run::run(&args),
        None => run::run(&cli.run),
    }
}
