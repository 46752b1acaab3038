use std::io;

use anyhow::{Context, Result};
use fanout_common::observability::{LogConfig, init_logging};
use fanout_fetch::{FetchSettings, Fetcher};

use crate::WorkerArgs;

/// Process-pool child. Stdout belongs to the reply stream, so logs only go
/// to the file sink. A worker without a log file still serves.
pub fn serve_stdio(args: &WorkerArgs) -> Result<()> {
    if let Err(err) = init_logging(LogConfig {
        app_name: "fanout-worker",
        emit_stderr: false,
        ..LogConfig::default()
    }) {
        eprintln!("fanout worker: logging disabled: {err:#}");
    }

    let settings: FetchSettings =
        serde_json::from_str(&args.settings).context("parsing worker settings")?;
    let fetcher = Fetcher::new(settings)?;
    tracing::debug!(pid = std::process::id(), "worker.start");

    let served = fanout_harness::worker::serve(io::stdin().lock(), io::stdout().lock(), &fetcher)
        .context("serving fetch requests")?;
    tracing::debug!(served, "worker.exit");
    Ok(())
}
