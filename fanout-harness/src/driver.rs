use std::collections::BTreeSet;
use std::io::Write;

use fanout_common::StrategyKind;
use fanout_llm::{SummarizationError, Summarizer};
use fanout_runtime::FanoutRuntime;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

use crate::batch::UrlPool;
use crate::error::{HarnessError, StrategyError};
use crate::matrix::{MatrixError, TimingMatrix};
use crate::strategy::{Strategy, StrategyResult};

/// Where in an iteration the experiment stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sample,
    Run,
    Record,
    Summarize,
    Output,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Sample => "sampling",
            Stage::Run => "run",
            Stage::Record => "recording",
            Stage::Summarize => "summary",
            Stage::Output => "output",
        })
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Harness(#[from] HarnessError),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error(transparent)]
    Summarize(#[from] SummarizationError),
    #[error("writing progress: {0}")]
    Output(#[from] std::io::Error),
}

/// A run stopped early. Carries whatever timings were recorded before it.
#[derive(Debug, Error)]
#[error("{stage} failed at batch size {batch_size}{}: {source}", on_strategy(.strategy))]
pub struct ExperimentError {
    pub stage: Stage,
    pub strategy: Option<StrategyKind>,
    pub batch_size: usize,
    #[source]
    pub source: StageError,
    pub partial: TimingMatrix,
}

fn on_strategy(strategy: &Option<StrategyKind>) -> String {
    strategy.map(|s| format!(" ({s})")).unwrap_or_default()
}

struct SummaryStage {
    summarizer: Summarizer,
    runtime: FanoutRuntime,
}

/// Runs every strategy on the same sampled batch, for each batch size, and
/// records how long each took.
///
/// Progress, per-strategy timings and summaries are written to the sink
/// passed to [`Experiment::run`]:
///
/// ```text
/// == batch size 3 ==
/// [sequential] 3 pages in 812.40 ms
/// [sequential] summary:
/// Three dog breeds ...
/// ```
pub struct Experiment {
    pool: UrlPool,
    batch_sizes: Vec<usize>,
    strategies: Vec<Box<dyn Strategy>>,
    seed: Option<u64>,
    summary: Option<SummaryStage>,
}

impl Experiment {
    /// Batch sizes are run in ascending order without repeats; strategies in
    /// their fixed order.
    pub fn new(
        pool: UrlPool,
        batch_sizes: impl IntoIterator<Item = usize>,
        mut strategies: Vec<Box<dyn Strategy>>,
    ) -> Result<Self, HarnessError> {
        if pool.is_empty() {
            return Err(HarnessError::EmptyPool);
        }
        let batch_sizes: Vec<usize> = batch_sizes
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if batch_sizes.is_empty() {
            return Err(HarnessError::NoBatchSizes);
        }
        for &size in &batch_sizes {
            pool.check_size(size)?;
        }

        if strategies.is_empty() {
            return Err(HarnessError::NoStrategies);
        }
        strategies.sort_by_key(|s| s.kind());
        if let Some(pair) = strategies.windows(2).find(|w| w[0].kind() == w[1].kind()) {
            return Err(HarnessError::DuplicateStrategy(pair[0].kind()));
        }

        Ok(Self {
            pool,
            batch_sizes,
            strategies,
            seed: None,
            summary: None,
        })
    }

    /// Fix batch sampling. `None` samples from entropy.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Summarize each runner's output after it is timed.
    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Result<Self, HarnessError> {
        let runtime = FanoutRuntime::multi_thread("fanout-summary", Some(1))
            .map_err(|e| HarnessError::Runtime(e.to_string()))?;
        self.summary = Some(SummaryStage {
            summarizer,
            runtime,
        });
        Ok(self)
    }

    pub fn batch_sizes(&self) -> &[usize] {
        &self.batch_sizes
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Run the whole grid. Any failure stops the run.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<TimingMatrix, ExperimentError> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut matrix = TimingMatrix::new();
        tracing::info!(
            batch_sizes = ?self.batch_sizes,
            strategies = ?self.kinds(),
            pool = self.pool.len(),
            seed = ?self.seed,
            "experiment.start"
        );

        for &size in &self.batch_sizes {
            let fail = |stage, strategy, source: StageError, partial: &mut TimingMatrix| {
                ExperimentError {
                    stage,
                    strategy,
                    batch_size: size,
                    source,
                    partial: std::mem::take(partial),
                }
            };

            let batch = self
                .pool
                .sample(size, &mut rng)
                .map_err(|e| fail(Stage::Sample, None, e.into(), &mut matrix))?;
            writeln!(out, "== batch size {size} ==")
                .map_err(|e| fail(Stage::Output, None, e.into(), &mut matrix))?;

            for strategy in &self.strategies {
                let kind = strategy.kind();
                let result = strategy
                    .run(&batch)
                    .map_err(|e| fail(Stage::Run, Some(kind), e.into(), &mut matrix))?;
                matrix
                    .record(kind, size, result.elapsed_ms)
                    .map_err(|e| fail(Stage::Record, Some(kind), e.into(), &mut matrix))?;
                self.report(out, &result)
                    .map_err(|(stage, e)| fail(stage, Some(kind), e, &mut matrix))?;
            }
        }

        tracing::info!(cells = matrix.len(), "experiment.done");
        Ok(matrix)
    }

    fn report<W: Write>(
        &self,
        out: &mut W,
        result: &StrategyResult,
    ) -> Result<(), (Stage, StageError)> {
        let kind = result.kind;
        let failed = result.failures();
        let output = |e: std::io::Error| (Stage::Output, StageError::from(e));

        if failed > 0 {
            writeln!(
                out,
                "[{kind}] {} pages in {:.2} ms ({failed} failed)",
                result.pages.len(),
                result.elapsed_ms
            )
            .map_err(output)?;
        } else {
            writeln!(
                out,
                "[{kind}] {} pages in {:.2} ms",
                result.pages.len(),
                result.elapsed_ms
            )
            .map_err(output)?;
        }

        let Some(stage) = &self.summary else {
            return Ok(());
        };
        let texts = result.texts();
        if texts.iter().all(|t| t.trim().is_empty()) {
            writeln!(out, "[{kind}] summary skipped: no text extracted").map_err(output)?;
            return Ok(());
        }
        let summary = stage
            .runtime
            .block_on(stage.summarizer.summarize(&texts))
            .map_err(|e| (Stage::Summarize, StageError::from(e)))?;
        writeln!(out, "[{kind}] summary:\n{summary}").map_err(output)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::strategy::PageOutcome;
    use async_trait::async_trait;
    use fanout_llm::traits::{LlmClient, LlmResponse};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Maps each URL to `text of <url>`, failing on one URL if asked.
    struct Canned {
        kind: StrategyKind,
        fail_on: Option<&'static str>,
        blank: bool,
    }

    impl Strategy for Canned {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn run(&self, batch: &Batch) -> Result<StrategyResult, StrategyError> {
            let pages = batch
                .urls()
                .iter()
                .map(|url| match self.fail_on {
                    Some(bad) if bad == url.as_str() => Err(StrategyError::worker(url, "canned failure")),
                    _ if self.blank => Ok(PageOutcome::Extracted(String::new())),
                    _ => Ok(PageOutcome::Extracted(format!("text of {url}"))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(StrategyResult::new(self.kind, pages, Duration::from_millis(2)))
        }
    }

    fn canned(kinds: &[StrategyKind]) -> Vec<Box<dyn Strategy>> {
        kinds
            .iter()
            .map(|&kind| -> Box<dyn Strategy> {
                Box::new(Canned {
                    kind,
                    fail_on: None,
                    blank: false,
                })
            })
            .collect()
    }

    struct FixedSummary {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for FixedSummary {
        async fn generate(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
            _max_tokens: Option<u32>,
            _temperature: Option<f32>,
        ) -> fanout_common::Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LlmResponse {
                text: "  Dogs are good.  ".to_string(),
                model: None,
                tokens_used: None,
            })
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn pool() -> UrlPool {
        UrlPool::new(["A", "B", "C", "D", "E"])
    }

    #[test]
    fn matrix_has_one_cell_per_strategy_and_size() {
        let experiment = Experiment::new(pool(), [3, 1, 3, 5], canned(&StrategyKind::ALL))
            .unwrap()
            .with_seed(Some(11));
        assert_eq!(experiment.batch_sizes(), &[1, 3, 5]);

        let matrix = experiment.run(&mut Vec::new()).unwrap();

        assert_eq!(matrix.len(), 3 * 4);
        assert!(matrix.is_complete(&StrategyKind::ALL, &[1, 3, 5]));
        assert!(matrix.iter().all(|(_, _, ms)| ms >= 0.0));
    }

    #[test]
    fn progress_lines_follow_the_fixed_order() {
        let strategies = canned(&[StrategyKind::ProcessPool, StrategyKind::Sequential]);
        let experiment = Experiment::new(UrlPool::new(["A", "B", "C"]), [1], strategies).unwrap();

        let mut out = Vec::new();
        experiment.run(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(
            out,
            "== batch size 1 ==\n\
             [sequential] 1 pages in 2.00 ms\n\
             [process-pool] 1 pages in 2.00 ms\n"
        );
    }

    #[test]
    fn fixed_summary_is_printed_verbatim() {
        let client = Arc::new(FixedSummary {
            calls: AtomicUsize::new(0),
        });
        let experiment = Experiment::new(
            UrlPool::new(["A", "B", "C"]),
            [1],
            canned(&[StrategyKind::Sequential, StrategyKind::Async]),
        )
        .unwrap()
        .with_summarizer(Summarizer::new(client.clone()))
        .unwrap();

        let mut out = Vec::new();
        experiment.run(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(
            out.contains("[sequential] summary:\nDogs are good.\n"),
            "{out}"
        );
        assert!(out.contains("[async] summary:\nDogs are good.\n"), "{out}");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn blank_texts_skip_the_summary_call() {
        let client = Arc::new(FixedSummary {
            calls: AtomicUsize::new(0),
        });
        let strategies: Vec<Box<dyn Strategy>> = vec![Box::new(Canned {
            kind: StrategyKind::Async,
            fail_on: None,
            blank: true,
        })];
        let experiment = Experiment::new(pool(), [2], strategies)
            .unwrap()
            .with_summarizer(Summarizer::new(client.clone()))
            .unwrap();

        let mut out = Vec::new();
        experiment.run(&mut out).unwrap();

        assert!(String::from_utf8(out)
            .unwrap()
            .contains("[async] summary skipped: no text extracted"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failure_stops_the_run_and_keeps_earlier_cells() {
        let mut strategies = canned(&[StrategyKind::Sequential, StrategyKind::Async]);
        strategies.push(Box::new(Canned {
            kind: StrategyKind::ThreadPool,
            fail_on: Some("B"),
            blank: false,
        }));
        strategies.extend(canned(&[StrategyKind::ProcessPool]));
        let experiment = Experiment::new(UrlPool::new(["A", "B", "C"]), [3], strategies).unwrap();

        let err = experiment.run(&mut Vec::new()).unwrap_err();

        assert_eq!(err.stage, Stage::Run);
        assert_eq!(err.strategy, Some(StrategyKind::ThreadPool));
        assert_eq!(err.batch_size, 3);
        assert!(matches!(
            err.source,
            StageError::Strategy(StrategyError::Worker { .. })
        ));
        assert_eq!(err.partial.len(), 2);
        assert!(err.partial.get(StrategyKind::ThreadPool, 3).is_none());
        assert!(err.partial.get(StrategyKind::ProcessPool, 3).is_none());
        assert!(err.to_string().contains("(thread-pool)"), "{err}");
    }

    #[test]
    fn invalid_setups_are_rejected() {
        assert_eq!(
            Experiment::new(pool(), [0], canned(&[StrategyKind::Async])).err(),
            Some(HarnessError::BatchSize { size: 0, pool: 5 })
        );
        assert_eq!(
            Experiment::new(pool(), [2, 6], canned(&[StrategyKind::Async])).err(),
            Some(HarnessError::BatchSize { size: 6, pool: 5 })
        );
        assert_eq!(
            Experiment::new(pool(), [], canned(&[StrategyKind::Async])).err(),
            Some(HarnessError::NoBatchSizes)
        );
        assert_eq!(
            Experiment::new(pool(), [1], Vec::new()).err(),
            Some(HarnessError::NoStrategies)
        );
        assert_eq!(
            Experiment::new(
                pool(),
                [1],
                canned(&[StrategyKind::Async, StrategyKind::Sequential, StrategyKind::Async])
            )
            .err(),
            Some(HarnessError::DuplicateStrategy(StrategyKind::Async))
        );
        assert_eq!(
            Experiment::new(UrlPool::new(Vec::<String>::new()), [1], canned(&[StrategyKind::Async]))
                .err(),
            Some(HarnessError::EmptyPool)
        );
    }
}
