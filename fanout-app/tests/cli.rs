mod common;

use std::path::Path;
use std::process::{Command, Output};

use serde_json::json;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BREEDS: [&str; 3] = ["Beagle", "Corgi", "Samoyed"];
const SUMMARY: &str = "Three sturdy breeds, each with a job.";

struct Site {
    server: MockServer,
    rt: Runtime,
}

impl Site {
    fn start() -> Self {
        common::init_test_tracing();
        let rt = Runtime::new().unwrap();
        let server = rt.block_on(async {
            let server = MockServer::start().await;
            for breed in BREEDS {
                let body = format!("<html><body><p>The {breed} is a dog.</p></body></html>");
                Mock::given(method("GET"))
                    .and(path(format!("/wiki/{breed}")))
                    .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
                    .mount(&server)
                    .await;
            }
            Mock::given(method("GET"))
                .and(path("/wiki/Broken"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server)
                .await;
            server
        });
        Self { server, rt }
    }

    fn urls(&self) -> Vec<String> {
        BREEDS
            .iter()
            .map(|breed| format!("{}/wiki/{breed}", self.server.uri()))
            .collect()
    }

    fn expect_summaries(&self, calls: u64) {
        self.rt.block_on(async {
            Mock::given(method("POST"))
                .and(path("/v1/messages"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "id": "msg_1",
                    "type": "message",
                    "role": "assistant",
                    "model": "claude-test",
                    "content": [{"type": "text", "text": SUMMARY}],
                    "stop_reason": "end_turn",
                    "usage": {"input_tokens": 12, "output_tokens": 9}
                })))
                .expect(calls)
                .mount(&self.server)
                .await;
        });
    }
}

fn yaml_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("  - \"{item}\"\n"))
        .collect()
}

fn fanout(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fanout"))
        .args(args)
        .current_dir(dir)
        .env("FANOUT_LOG_DIR", dir.join("logs"))
        .env_remove("FANOUT_CONFIG")
        .output()
        .unwrap()
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[test]
fn full_run_prints_progress_summaries_table_and_chart() {
    let site = Site::start();
    site.expect_summaries(2 * 4);
    let dir = TempDir::new().unwrap();
    let chart = dir.path().join("timings.txt");
    let config = format!(
        "urls:\n{}batch_sizes: [1, 3]\nseed: 11\nprocess_pool:\n  workers: 2\n\
         llm:\n  provider: anthropic\n  api_key: sk-test\n  model: claude-test\n  base_url: \"{}/v1\"\n\
         report:\n  chart_path: \"{}\"\n",
        yaml_list(&site.urls()),
        site.server.uri(),
        chart.display()
    );
    let config_path = dir.path().join("experiment.yaml");
    std::fs::write(&config_path, config).unwrap();

    let output = fanout(dir.path(), &["--config", config_path.to_str().unwrap()]);
    let stdout = text(&output.stdout);

    assert!(output.status.success(), "stderr: {}", text(&output.stderr));
    assert!(stdout.contains("== batch size 1 =="), "{stdout}");
    assert!(stdout.contains("== batch size 3 =="), "{stdout}");
    assert!(stdout.contains("[process-pool] 3 pages in "), "{stdout}");
    assert_eq!(stdout.matches(&format!("summary:\n{SUMMARY}\n")).count(), 8);

    let header = stdout
        .lines()
        .find(|l| l.starts_with("strategy"))
        .expect("timing table header");
    assert_eq!(
        header.split_whitespace().collect::<Vec<_>>(),
        ["strategy", "1", "3"]
    );
    for kind in ["sequential", "async", "thread-pool", "process-pool"] {
        let row = stdout
            .lines()
            .find(|l| l.starts_with(kind) && l.ends_with(" ms"))
            .unwrap_or_else(|| panic!("no table row for {kind}:\n{stdout}"));
        assert_eq!(row.matches(" ms").count(), 2, "{row}");
    }

    assert!(stdout.contains(&format!("chart written to {}", chart.display())));
    let drawn = std::fs::read_to_string(&chart).unwrap();
    assert!(drawn.contains("fetch time by batch size"), "{drawn}");
    site.rt.block_on(site.server.verify());
}

#[test]
fn run_without_llm_skips_summaries_and_draws_chart_inline() {
    let site = Site::start();
    let dir = TempDir::new().unwrap();
    let config = format!(
        "urls:\n{}batch_sizes: [2]\nstrategies: [sequential, thread-pool]\n",
        yaml_list(&site.urls())
    );
    std::fs::write(dir.path().join("fanout.yaml"), config).unwrap();

    let output = fanout(dir.path(), &["run", "--seed", "4"]);
    let stdout = text(&output.stdout);

    assert!(output.status.success(), "stderr: {}", text(&output.stderr));
    assert!(!stdout.contains("summary"), "{stdout}");
    assert!(stdout.contains("[sequential] 2 pages in "), "{stdout}");
    assert!(stdout.contains("[thread-pool] 2 pages in "), "{stdout}");
    assert!(!stdout.contains("[async]"), "{stdout}");
    assert!(stdout.contains("fetch time by batch size"), "{stdout}");
}

#[test]
fn no_chart_flag_leaves_only_the_table() {
    let site = Site::start();
    let dir = TempDir::new().unwrap();
    let config = format!(
        "urls:\n{}batch_sizes: [1]\nstrategies: [async]\n",
        yaml_list(&site.urls())
    );
    std::fs::write(dir.path().join("fanout.yaml"), config).unwrap();

    let output = fanout(dir.path(), &["--no-chart"]);
    let stdout = text(&output.stdout);

    assert!(output.status.success(), "stderr: {}", text(&output.stderr));
    assert!(stdout.lines().any(|l| l.starts_with("async")), "{stdout}");
    assert!(!stdout.contains("fetch time by batch size"), "{stdout}");
}

#[test]
fn failed_fetch_stops_the_run_and_prints_the_partial_table() {
    let site = Site::start();
    let dir = TempDir::new().unwrap();
    let mut urls = site.urls();
    urls.push(format!("{}/wiki/Broken", site.server.uri()));
    let config = format!(
        "urls:\n{}batch_sizes: [4]\nstrategies: [sequential, async]\n",
        yaml_list(&urls)
    );
    std::fs::write(dir.path().join("fanout.yaml"), config).unwrap();

    let output = fanout(dir.path(), &[]);
    let stdout = text(&output.stdout);
    let stderr = text(&output.stderr);

    assert!(!output.status.success());
    assert!(stdout.contains("== batch size 4 =="), "{stdout}");
    assert!(stdout.lines().any(|l| l.starts_with("strategy")), "{stdout}");
    assert!(stderr.contains("partial"), "{stderr}");
    assert!(stderr.contains("/wiki/Broken"), "{stderr}");
}

#[test]
fn isolate_policy_reports_failures_and_finishes() {
    let site = Site::start();
    let dir = TempDir::new().unwrap();
    let mut urls = site.urls();
    urls.push(format!("{}/wiki/Broken", site.server.uri()));
    let config = format!(
        "urls:\n{}batch_sizes: [4]\nfailure_policy: isolate\nstrategies: [sequential, process-pool]\n",
        yaml_list(&urls)
    );
    std::fs::write(dir.path().join("fanout.yaml"), config).unwrap();

    let output = fanout(dir.path(), &["--no-chart"]);
    let stdout = text(&output.stdout);

    assert!(output.status.success(), "stderr: {}", text(&output.stderr));
    assert!(stdout.contains("[sequential] 4 pages in "), "{stdout}");
    assert_eq!(stdout.matches("(1 failed)").count(), 2, "{stdout}");
}

#[test]
fn explicit_config_must_exist() {
    let dir = TempDir::new().unwrap();

    let output = fanout(dir.path(), &["--config", "missing.yaml"]);

    assert!(!output.status.success());
    assert!(text(&output.stderr).contains("loading configuration"));
}

#[test]
fn batch_larger_than_pool_is_rejected_before_any_fetch() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("fanout.yaml"),
        "urls: [\"http://127.0.0.1:9/a\"]\nbatch_sizes: [2]\n",
    )
    .unwrap();

    let output = fanout(dir.path(), &[]);

    assert!(!output.status.success());
    assert!(text(&output.stdout).is_empty());
}
