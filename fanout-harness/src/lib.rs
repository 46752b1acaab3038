//! Execution-strategy comparison harness.
//!
//! The same fetch workload runs under four concurrency models and the
//! wall-clock cost of each is recorded per batch size:
//!
//! - [`batch`]: the immutable URL pool and random batch sampling
//! - [`strategy`]: the [`Strategy`] contract and its sequential, async,
//!   thread-pool and process-pool runners
//! - [`worker`]: the line protocol spoken by process-pool workers
//! - [`matrix`]: the write-once timing matrix
//! - [`driver`]: the [`Experiment`] loop that ties it together
//! - [`report`]: table and chart rendering of a finished matrix
//!
//! Everything here is synchronous. Runners that need an event loop build
//! their own, so an experiment must not be started from inside a Tokio
//! runtime.

pub mod batch;
pub mod driver;
pub mod error;
pub mod matrix;
pub mod report;
pub mod strategy;
pub mod worker;

pub use batch::{Batch, UrlPool};
pub use driver::{Experiment, ExperimentError, Stage, StageError};
pub use error::{HarnessError, StrategyError};
pub use fanout_common::{FailurePolicy, StrategyKind};
pub use matrix::{MatrixError, TimingMatrix};
pub use strategy::{PageOutcome, Strategy, StrategyOptions, StrategyResult, build_strategies};
