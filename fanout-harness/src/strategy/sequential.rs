use std::sync::Arc;

use fanout_common::{FailurePolicy, StrategyKind};
use fanout_fetch::Fetcher;

use super::{Strategy, StrategyResult, settle, timed};
use crate::batch::Batch;
use crate::error::StrategyError;

/// One fetch after another on the calling thread.
pub struct SequentialRunner {
    fetcher: Arc<Fetcher>,
    policy: FailurePolicy,
}

impl SequentialRunner {
    pub fn new(fetcher: Arc<Fetcher>, policy: FailurePolicy) -> Self {
        Self { fetcher, policy }
    }
}

impl Strategy for SequentialRunner {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    fn run(&self, batch: &Batch) -> Result<StrategyResult, StrategyError> {
        timed(self.kind(), batch, || {
            batch
                .urls()
                .iter()
                .map(|url| settle(self.policy, url, self.fetcher.fetch(url).map_err(Into::into)))
                .collect()
        })
    }
}
