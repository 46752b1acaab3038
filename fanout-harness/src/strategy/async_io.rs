use std::sync::Arc;

use fanout_common::{FailurePolicy, StrategyKind};
use fanout_fetch::Fetcher;
use fanout_runtime::FanoutRuntime;
use futures::future::try_join_all;

use super::{Strategy, StrategyResult, settle, timed};
use crate::batch::Batch;
use crate::error::StrategyError;

/// All fetches in flight at once on a single-threaded event loop, sharing
/// one connection pool.
///
/// The loop and the session are created per invocation and dropped before
/// `run` returns.
pub struct AsyncRunner {
    fetcher: Arc<Fetcher>,
    policy: FailurePolicy,
}

impl AsyncRunner {
    pub fn new(fetcher: Arc<Fetcher>, policy: FailurePolicy) -> Self {
        Self { fetcher, policy }
    }
}

impl Strategy for AsyncRunner {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Async
    }

    fn run(&self, batch: &Batch) -> Result<StrategyResult, StrategyError> {
        timed(self.kind(), batch, || {
            let runtime = FanoutRuntime::current_thread("fanout-async")
                .map_err(|e| StrategyError::pool("event loop", e))?;
            let session = self.fetcher.session()?;

            // Joined in submission order; the first error under Abort drops
            // the fetches still in flight.
            let fetches = batch.urls().iter().map(|url| {
                let session = &session;
                async move {
                    let result = self
                        .fetcher
                        .fetch_async(session, url)
                        .await
                        .map_err(StrategyError::from);
                    settle(self.policy, url, result)
                }
            });
            runtime.block_on(try_join_all(fetches))
        })
    }
}
