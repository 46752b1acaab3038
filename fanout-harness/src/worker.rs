//! Process-pool worker protocol.
//!
//! Parent and worker exchange newline-delimited JSON over the worker's
//! stdin and stdout, one request and one reply per page:
//!
//! ```text
//! > {"index":0,"url":"https://en.wikipedia.org/wiki/Poodle"}
//! < {"index":0,"outcome":{"text":"The Poodle is ..."}}
//! > {"index":3,"url":"https://example.invalid/"}
//! < {"index":3,"outcome":{"failed":"fetching https://example.invalid/: ..."}}
//! ```
//!
//! A worker holds no state between requests and exits when its stdin closes.
//! Stdout carries nothing but replies.

use std::io::{self, BufRead, Write};

use fanout_fetch::Fetcher;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Position of the URL in its batch; echoed back in the reply.
    pub index: usize,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReply {
    pub index: usize,
    pub outcome: WorkerOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerOutcome {
    Text(String),
    /// The fetch failed inside the worker; the parent applies its failure policy.
    Failed(String),
}

/// Answer requests from `input` until it closes. Returns the number served.
///
/// A malformed request line ends the loop with `InvalidData`.
pub fn serve<R, W>(input: R, mut output: W, fetcher: &Fetcher) -> io::Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut served = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: WorkerRequest = serde_json::from_str(&line).map_err(io::Error::from)?;
        let outcome = match fetcher.fetch(&request.url) {
            Ok(text) => WorkerOutcome::Text(text),
            Err(err) => {
                tracing::warn!(index = request.index, url = %request.url, error = %err, "worker.fetch.failed");
                WorkerOutcome::Failed(err.to_string())
            }
        };
        let reply = WorkerReply {
            index: request.index,
            outcome,
        };
        serde_json::to_writer(&mut output, &reply).map_err(io::Error::from)?;
        output.write_all(b"\n")?;
        output.flush()?;
        served += 1;
        tracing::debug!(index = request.index, "worker.reply.sent");
    }
    Ok(served)
}
