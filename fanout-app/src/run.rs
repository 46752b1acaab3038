use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use fanout_common::observability::{LogConfig, init_logging};
use fanout_config::{FanoutConfig, FanoutConfigLoader};
use fanout_fetch::Fetcher;
use fanout_harness::report::{render_chart, render_table};
use fanout_harness::strategy::WorkerCommand;
use fanout_harness::{
    Experiment, StrategyKind, StrategyOptions, TimingMatrix, UrlPool, build_strategies,
};
use fanout_llm::{Summarizer, client_from_config};

use crate::RunArgs;

const DEFAULT_CONFIG_FILE: &str = "fanout.yaml";

pub fn run(args: &RunArgs) -> Result<()> {
    let log_path = init_logging(LogConfig {
        app_name: "fanout",
        emit_stderr: args.verbose,
        ..LogConfig::default()
    })?;
    tracing::debug!(path = %log_path.display(), "logging.ready");

    let config = load_config(args)?;
    let experiment = build_experiment(&config)?;
    let sizes = experiment.batch_sizes().to_vec();
    let kinds = experiment.kinds();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let (matrix, failure) = match experiment.run(&mut out) {
        Ok(matrix) => (matrix, None),
        Err(mut err) => {
            tracing::error!(error = %err, "experiment.failed");
            let partial = std::mem::take(&mut err.partial);
            (partial, Some(err))
        }
    };

    writeln!(out)?;
    write!(out, "{}", render_table(&matrix, &sizes, &kinds))?;
    if let Some(err) = failure {
        return Err(err).context("experiment stopped early; the table above is partial");
    }

    if config.report.chart && !args.no_chart {
        write_chart(&mut out, &config, &matrix, &sizes, &kinds)?;
    }
    out.flush()?;
    Ok(())
}

fn load_config(args: &RunArgs) -> Result<FanoutConfig> {
    let loader = match &args.config {
        Some(path) => FanoutConfigLoader::new().with_file(path),
        None => FanoutConfigLoader::new().with_optional_file(DEFAULT_CONFIG_FILE),
    };
    let mut config = loader.load().context("loading configuration")?;
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    Ok(config)
}

fn build_experiment(config: &FanoutConfig) -> Result<Experiment> {
    let fetcher = Arc::new(Fetcher::new(config.fetch.clone())?);
    let program = match &config.process_pool.program {
        Some(program) => program.clone(),
        None => std::env::current_exe().context("locating the worker executable")?,
    };
    let options = StrategyOptions {
        policy: config.failure_policy,
        thread_workers: config.thread_pool.workers,
        process_workers: config.process_pool.workers,
        worker_command: WorkerCommand::fanout_worker(program, &config.fetch)?,
    };
    let strategies = build_strategies(&config.strategies, fetcher, &options);

    let experiment = Experiment::new(
        UrlPool::new(config.urls.iter().cloned()),
        config.batch_sizes.iter().copied(),
        strategies,
    )?
    .with_seed(config.seed);

    if config.llm.is_disabled() {
        tracing::warn!("no llm configured; summaries disabled");
        return Ok(experiment);
    }
    let client = client_from_config(&config.llm)?;
    let summarizer = Summarizer::new(client)
        .with_max_tokens(config.summary.max_tokens)
        .with_temperature(config.summary.temperature);
    tracing::info!(model = summarizer.model_name(), "summaries.enabled");
    Ok(experiment.with_summarizer(summarizer)?)
}

fn write_chart<W: Write>(
    out: &mut W,
    config: &FanoutConfig,
    matrix: &TimingMatrix,
    sizes: &[usize],
    kinds: &[StrategyKind],
) -> Result<()> {
    let chart = render_chart(
        matrix,
        sizes,
        kinds,
        config.report.chart_width,
        config.report.chart_height,
    )?;
    match &config.report.chart_path {
        Some(path) => {
            std::fs::write(path, chart)
                .with_context(|| format!("writing chart to {}", path.display()))?;
            writeln!(out, "chart written to {}", path.display())?;
        }
        None => {
            writeln!(out)?;
            write!(out, "{chart}")?;
        }
    }
    Ok(())
}
