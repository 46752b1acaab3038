//! The runner contract and its four concurrency models.

mod async_io;
mod process_pool;
mod sequential;
mod thread_pool;

use std::sync::Arc;
use std::time::{Duration, Instant};

use fanout_common::{FailurePolicy, StrategyKind};
use fanout_fetch::Fetcher;

use crate::batch::Batch;
use crate::error::StrategyError;

pub use async_io::AsyncRunner;
pub use process_pool::{ProcessPoolRunner, WorkerCommand};
pub use sequential::SequentialRunner;
pub use thread_pool::ThreadPoolRunner;

/// Apply the fetcher to every URL of a batch under one concurrency model.
///
/// Implementations return pages in batch order and time the invocation from
/// dispatch until the last page is collected, including the execution
/// resources they create for it.
pub trait Strategy {
    fn kind(&self) -> StrategyKind;

    fn run(&self, batch: &Batch) -> Result<StrategyResult, StrategyError>;
}

/// Result of one URL within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Extracted(String),
    /// Only produced under [`FailurePolicy::Isolate`].
    Failed { url: String, reason: String },
}

impl PageOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Extracted(text) => Some(text),
            Self::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyResult {
    pub kind: StrategyKind,
    /// One entry per batch URL, in batch order.
    pub pages: Vec<PageOutcome>,
    pub elapsed_ms: f64,
}

impl StrategyResult {
    pub fn new(kind: StrategyKind, pages: Vec<PageOutcome>, elapsed: Duration) -> Self {
        Self {
            kind,
            pages,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }

    /// Extracted texts of the successful pages, in batch order.
    pub fn texts(&self) -> Vec<String> {
        self.pages
            .iter()
            .filter_map(|p| p.text().map(str::to_string))
            .collect()
    }

    pub fn failures(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| matches!(p, PageOutcome::Failed { .. }))
            .count()
    }
}

/// Settings shared by the runners built from configuration.
#[derive(Debug, Clone)]
pub struct StrategyOptions {
    pub policy: FailurePolicy,
    /// Rayon threads; `0` lets rayon decide.
    pub thread_workers: usize,
    pub process_workers: usize,
    pub worker_command: WorkerCommand,
}

/// One runner per kind, sorted into the driver's fixed order.
pub fn build_strategies(
    kinds: &[StrategyKind],
    fetcher: Arc<Fetcher>,
    options: &StrategyOptions,
) -> Vec<Box<dyn Strategy>> {
    let mut kinds = kinds.to_vec();
    kinds.sort();
    kinds
        .into_iter()
        .map(|kind| -> Box<dyn Strategy> {
            match kind {
                StrategyKind::Sequential => {
                    Box::new(SequentialRunner::new(fetcher.clone(), options.policy))
                }
                StrategyKind::Async => Box::new(AsyncRunner::new(fetcher.clone(), options.policy)),
                StrategyKind::ThreadPool => Box::new(ThreadPoolRunner::new(
                    fetcher.clone(),
                    options.thread_workers,
                    options.policy,
                )),
                StrategyKind::ProcessPool => Box::new(ProcessPoolRunner::new(
                    options.worker_command.clone(),
                    options.process_workers,
                    options.policy,
                )),
            }
        })
        .collect()
}

/// Apply the failure policy to one page. Timeouts are reported under their
/// own event so they can be told apart from refused or broken pages.
pub(crate) fn settle(
    policy: FailurePolicy,
    url: &str,
    result: Result<String, StrategyError>,
) -> Result<PageOutcome, StrategyError> {
    let err = match result {
        Ok(text) => return Ok(PageOutcome::Extracted(text)),
        Err(err) => err,
    };
    if err.is_timeout() {
        tracing::warn!(url = %url, ?policy, error = %err, "strategy.page.timed_out");
    } else {
        tracing::warn!(url = %url, ?policy, error = %err, "strategy.page.failed");
    }
    match policy {
        FailurePolicy::Abort => Err(err),
        FailurePolicy::Isolate => Ok(PageOutcome::Failed {
            url: url.to_string(),
            reason: err.to_string(),
        }),
    }
}

/// Time `body` and wrap its pages, logging start and outcome.
pub(crate) fn timed<F>(
    kind: StrategyKind,
    batch: &Batch,
    body: F,
) -> Result<StrategyResult, StrategyError>
where
    F: FnOnce() -> Result<Vec<PageOutcome>, StrategyError>,
{
    tracing::debug!(strategy = %kind, urls = batch.len(), "strategy.run.start");
    let started = Instant::now();
    let outcome = body();
    let elapsed = started.elapsed();

    match outcome {
        Ok(pages) if pages.len() == batch.len() => {
            let result = StrategyResult::new(kind, pages, elapsed);
            tracing::info!(
                strategy = %kind,
                urls = batch.len(),
                failed = result.failures(),
                elapsed_ms = result.elapsed_ms,
                "strategy.run.done"
            );
            Ok(result)
        }
        Ok(pages) => Err(StrategyError::Pool(format!(
            "{kind} collected {} pages for a batch of {}",
            pages.len(),
            batch.len()
        ))),
        Err(err) => {
            tracing::warn!(
                strategy = %kind,
                error = %err,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "strategy.run.failed"
            );
            Err(err)
        }
    }
}
