use fanout_common::StrategyKind;
use fanout_fetch::FetchError;
use thiserror::Error;

/// Failure of one runner invocation.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A pool worker failed on a page or broke the protocol.
    #[error("worker failed on {url}: {reason}")]
    Worker { url: String, reason: String },

    /// The execution resources themselves could not be set up.
    #[error("worker pool: {0}")]
    Pool(String),
}

impl StrategyError {
    /// The page hit the fetch timeout. Only fetches run in this process can
    /// tell; worker failures arrive as text.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Fetch(err) if err.is_timeout())
    }

    pub(crate) fn worker(url: &str, reason: impl Into<String>) -> Self {
        Self::Worker {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn pool(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Pool(format!("{context}: {err}"))
    }
}

/// An experiment that cannot be set up as described.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HarnessError {
    #[error("url pool is empty")]
    EmptyPool,
    #[error("batch size {size} is outside 1..={pool} for the configured pool")]
    BatchSize { size: usize, pool: usize },
    #[error("no batch sizes configured")]
    NoBatchSizes,
    #[error("no strategies configured")]
    NoStrategies,
    #[error("strategy {0} configured more than once")]
    DuplicateStrategy(StrategyKind),
    #[error("summary runtime: {0}")]
    Runtime(String),
}
