use std::sync::Arc;

use fanout_common::{FailurePolicy, StrategyKind};
use fanout_fetch::Fetcher;
use rayon::prelude::*;

use super::{Strategy, StrategyResult, settle, timed};
use crate::batch::Batch;
use crate::error::StrategyError;

/// Blocking fetches spread over a bounded rayon pool built for each
/// invocation and joined before it returns. The fetcher is shared read-only across the workers.
pub struct ThreadPoolRunner {
    fetcher: Arc<Fetcher>,
    workers: usize,
    policy: FailurePolicy,
}

impl ThreadPoolRunner {
    /// `workers == 0` sizes the pool to the available cores.
    pub fn new(fetcher: Arc<Fetcher>, workers: usize, policy: FailurePolicy) -> Self {
        Self {
            fetcher,
            workers,
            policy,
        }
    }
}

impl Strategy for ThreadPoolRunner {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ThreadPool
    }

    fn run(&self, batch: &Batch) -> Result<StrategyResult, StrategyError> {
        timed(self.kind(), batch, || {
            // Workers are joined before `build_scoped` returns.
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .thread_name(|i| format!("fanout-fetch-{i}"))
                .build_scoped(
                    |thread| thread.run(),
                    |pool| {
                        tracing::debug!(threads = pool.current_num_threads(), "thread_pool.ready");
                        // Indexed collect keeps batch order whatever order workers finish in.
                        pool.install(|| {
                            batch
                                .urls()
                                .par_iter()
                                .map(|url| {
                                    settle(self.policy, url, self.fetcher.fetch(url).map_err(Into::into))
                                })
                                .collect::<Result<Vec<_>, _>>()
                        })
                    },
                )
                .map_err(|e| StrategyError::pool("thread pool", e))?
        })
    }
}
