//! Owned Tokio runtimes for code that is otherwise synchronous.
//!
//! The harness driver never runs inside an async context. Whenever it needs
//! to await something (the summarizer, or a batch of async fetches) it builds
//! or borrows a [`FanoutRuntime`] and blocks on it.
use anyhow::Result;
use std::future::Future;
use tokio::runtime::{Builder, Runtime};

pub struct FanoutRuntime {
    runtime: Runtime,
}

impl FanoutRuntime {
    /// A multi-threaded runtime for long-lived service calls.
    ///
    /// ```
    /// use fanout_runtime::FanoutRuntime;
    ///
    /// let runtime = FanoutRuntime::multi_thread("doctest-runtime", Some(1))
    ///     .expect("runtime builds");
    /// let value = runtime.block_on(async { 2 + 2 });
    /// assert_eq!(value, 4);
    /// ```
    pub fn multi_thread(thread_name: &str, worker_threads: Option<usize>) -> Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(thread_name);

        if let Some(workers) = worker_threads {
            builder.worker_threads(workers.max(1));
        }

        let runtime = builder.build()?;
        tracing::debug!(name = thread_name, ?worker_threads, "runtime.started");
        Ok(Self { runtime })
    }

    /// A runtime that drives every task on the calling thread.
    ///
    /// All concurrency comes from interleaving at await points, which is the
    /// event-loop model the async strategy measures.
    ///
    /// ```
    /// use fanout_runtime::FanoutRuntime;
    ///
    /// let runtime = FanoutRuntime::current_thread("event-loop").unwrap();
    /// let caller = std::thread::current().id();
    /// let inside = runtime.block_on(async { std::thread::current().id() });
    /// assert_eq!(caller, inside);
    /// ```
    pub fn current_thread(name: &str) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        tracing::debug!(name, "runtime.started");
        Ok(Self { runtime })
    }

    /// Run a future to completion on the runtime.
    ///
    /// Panics if called from within another runtime.
    ///
    /// ```
    /// use fanout_runtime::FanoutRuntime;
    ///
    /// let runtime = FanoutRuntime::multi_thread("block-on-example", Some(1)).unwrap();
    /// let result = runtime.block_on(async { "done" });
    /// assert_eq!(result, "done");
    /// ```
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}
