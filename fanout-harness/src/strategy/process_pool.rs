use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use fanout_common::{FailurePolicy, StrategyKind};
use fanout_fetch::FetchSettings;

use super::{PageOutcome, Strategy, StrategyResult, settle, timed};
use crate::batch::Batch;
use crate::error::StrategyError;
use crate::worker::{WorkerOutcome, WorkerReply, WorkerRequest};

/// How to launch one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `<program> worker --settings <json>`, the hidden subcommand of the
    /// `fanout` binary.
    ///
    /// ```
    /// use fanout_fetch::FetchSettings;
    /// use fanout_harness::strategy::WorkerCommand;
    ///
    /// let cmd = WorkerCommand::fanout_worker("/usr/bin/fanout", &FetchSettings::default()).unwrap();
    /// assert_eq!(cmd.args()[..2], ["worker", "--settings"]);
    /// ```
    pub fn fanout_worker(
        program: impl Into<PathBuf>,
        settings: &FetchSettings,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(program)
            .arg("worker")
            .arg("--settings")
            .arg(serde_json::to_string(settings)?))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn spawn(&self) -> io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
    }
}

/// Kills and reaps every worker when dropped, whatever path `run` leaves by.
struct Workers(Vec<Child>);

impl Drop for Workers {
    fn drop(&mut self) {
        for child in &mut self.0 {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

struct Pipe {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Fetches in separate worker processes that share no memory with the
/// parent. Pages are handed out from a shared queue by one feeder thread per
/// worker and replies land in their batch slot.
pub struct ProcessPoolRunner {
    command: WorkerCommand,
    workers: usize,
    policy: FailurePolicy,
}

impl ProcessPoolRunner {
    /// Never more than one worker per URL is started.
    pub fn new(command: WorkerCommand, workers: usize, policy: FailurePolicy) -> Self {
        Self {
            command,
            workers,
            policy,
        }
    }

    fn start(&self, count: usize) -> Result<(Workers, Vec<Pipe>), StrategyError> {
        let mut workers = Workers(Vec::with_capacity(count));
        let mut pipes = Vec::with_capacity(count);
        for _ in 0..count {
            let mut child = self.command.spawn().map_err(|e| {
                StrategyError::pool(
                    &format!("spawning {}", self.command.program().display()),
                    e,
                )
            })?;
            let stdin = child.stdin.take();
            let stdout = child.stdout.take();
            workers.0.push(child);
            match (stdin, stdout) {
                (Some(stdin), Some(stdout)) => pipes.push(Pipe {
                    stdin,
                    stdout: BufReader::new(stdout),
                }),
                _ => return Err(StrategyError::Pool("worker pipes were not captured".into())),
            }
        }
        tracing::debug!(workers = count, "process_pool.ready");
        Ok((workers, pipes))
    }

    /// Serve jobs through one worker until the queue drains or any feeder
    /// hits a fatal error.
    fn feed(
        &self,
        mut pipe: Pipe,
        batch: &Batch,
        next: &AtomicUsize,
        abort: &AtomicBool,
    ) -> Result<Vec<(usize, PageOutcome)>, StrategyError> {
        let mut collected = Vec::new();
        let mut line = String::new();
        while !abort.load(Ordering::SeqCst) {
            let index = next.fetch_add(1, Ordering::SeqCst);
            let Some(url) = batch.urls().get(index) else {
                break;
            };
            let settled = exchange(&mut pipe, &mut line, index, url).and_then(|outcome| {
                let result = match outcome {
                    WorkerOutcome::Text(text) => Ok(text),
                    WorkerOutcome::Failed(reason) => Err(StrategyError::worker(url, reason)),
                };
                settle(self.policy, url, result)
            });
            match settled {
                Ok(page) => collected.push((index, page)),
                Err(err) => {
                    abort.store(true, Ordering::SeqCst);
                    return Err(err);
                }
            }
        }
        Ok(collected)
    }
}

/// One request, one reply. Protocol breakage is fatal under every policy
/// since the worker can no longer be trusted with further jobs.
fn exchange(
    pipe: &mut Pipe,
    line: &mut String,
    index: usize,
    url: &str,
) -> Result<WorkerOutcome, StrategyError> {
    let request = WorkerRequest {
        index,
        url: url.to_string(),
    };
    let encoded = serde_json::to_string(&request)
        .map_err(|e| StrategyError::worker(url, format!("encoding request: {e}")))?;
    writeln!(pipe.stdin, "{encoded}")
        .and_then(|_| pipe.stdin.flush())
        .map_err(|e| StrategyError::worker(url, format!("sending request: {e}")))?;

    line.clear();
    let read = pipe
        .stdout
        .read_line(line)
        .map_err(|e| StrategyError::worker(url, format!("reading reply: {e}")))?;
    if read == 0 {
        return Err(StrategyError::worker(url, "worker exited before replying"));
    }
    let reply: WorkerReply = serde_json::from_str(line.trim_end())
        .map_err(|e| StrategyError::worker(url, format!("malformed reply: {e}")))?;
    if reply.index != index {
        return Err(StrategyError::worker(
            url,
            format!("reply for job {} while waiting on job {index}", reply.index),
        ));
    }
    Ok(reply.outcome)
}

impl Strategy for ProcessPoolRunner {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ProcessPool
    }

    fn run(&self, batch: &Batch) -> Result<StrategyResult, StrategyError> {
        timed(self.kind(), batch, || {
            let count = self.workers.clamp(1, batch.len().max(1));
            let (_workers, pipes) = self.start(count)?;

            let next = AtomicUsize::new(0);
            let abort = AtomicBool::new(false);
            let (next, abort) = (&next, &abort);

            let joined: Vec<Result<Vec<(usize, PageOutcome)>, StrategyError>> =
                thread::scope(|scope| {
                    let feeders: Vec<_> = pipes
                        .into_iter()
                        .map(|pipe| scope.spawn(move || self.feed(pipe, batch, next, abort)))
                        .collect();
                    feeders
                        .into_iter()
                        .map(|feeder| {
                            feeder.join().unwrap_or_else(|_| {
                                Err(StrategyError::Pool("feeder thread panicked".into()))
                            })
                        })
                        .collect()
                });

            let mut slots: Vec<Option<PageOutcome>> = vec![None; batch.len()];
            for feeder in joined {
                for (index, page) in feeder? {
                    slots[index] = Some(page);
                }
            }
            slots
                .into_iter()
                .zip(batch.urls())
                .map(|(slot, url)| slot.ok_or_else(|| StrategyError::worker(url, "no reply collected")))
                .collect()
        })
    }
}
