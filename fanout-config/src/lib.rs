//! Experiment configuration: an optional YAML file overlaid with
//! `FANOUT__`-prefixed environment variables.
//!
//! Every field has a default, so an empty source yields a runnable
//! experiment over the built-in URL pool. Nested keys are addressed with a
//! double underscore, e.g. `FANOUT__THREAD_POOL__WORKERS=8`. String values may
//! reference other variables as `${VAR}`; references are resolved after the
//! sources are merged, so secrets such as API keys can stay out of the file.
//! A reference left unresolved in `llm.api_key` fails validation.
//!
//! ```yaml
//! urls:
//!   - https://en.wikipedia.org/wiki/Poodle
//!   - https://en.wikipedia.org/wiki/Beagle
//! batch_sizes: [1, 2]
//! failure_policy: isolate
//! strategies: [sequential, thread-pool]
//! llm:
//!   provider: anthropic
//!   api_key: ${ANTHROPIC_API_KEY}
//! ```
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use fanout_common::{FailurePolicy, LlmConfig, StrategyKind};
pub use fanout_fetch::FetchSettings;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const ENV_PREFIX: &str = "FANOUT";

pub const DEFAULT_THREAD_POOL_WORKERS: usize = 20;
pub const DEFAULT_PROCESS_POOL_WORKERS: usize = 4;
pub const DEFAULT_BATCH_SIZES: [usize; 4] = [1, 3, 5, 10];

/// The built-in pool: ten Wikipedia dog breed articles.
pub const DEFAULT_URLS: [&str; 10] = [
    "https://en.wikipedia.org/wiki/Goldendoodle",
    "https://en.wikipedia.org/wiki/Golden_Retriever",
    "https://en.wikipedia.org/wiki/Poodle",
    "https://en.wikipedia.org/wiki/Labrador_Retriever",
    "https://en.wikipedia.org/wiki/German_Shepherd",
    "https://en.wikipedia.org/wiki/Beagle",
    "https://en.wikipedia.org/wiki/Border_Collie",
    "https://en.wikipedia.org/wiki/Dachshund",
    "https://en.wikipedia.org/wiki/Siberian_Husky",
    "https://en.wikipedia.org/wiki/Bulldog",
];

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error(transparent)]
    Source(#[from] ConfigError),
    #[error("config does not match schema: {0}")]
    Schema(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    pub version: Option<String>,
    /// Candidate pages; batches are sampled from here.
    pub urls: Vec<String>,
    pub batch_sizes: Vec<usize>,
    /// Fixes batch sampling for reproducible runs.
    pub seed: Option<u64>,
    pub failure_policy: FailurePolicy,
    pub strategies: Vec<StrategyKind>,
    pub fetch: FetchSettings,
    pub thread_pool: ThreadPoolSettings,
    pub process_pool: ProcessPoolSettings,
    pub llm: LlmConfig,
    pub summary: SummarySettings,
    pub report: ReportSettings,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            version: None,
            urls: DEFAULT_URLS.iter().map(|u| u.to_string()).collect(),
            batch_sizes: DEFAULT_BATCH_SIZES.to_vec(),
            seed: None,
            failure_policy: FailurePolicy::default(),
            strategies: StrategyKind::ALL.to_vec(),
            fetch: FetchSettings::default(),
            thread_pool: ThreadPoolSettings::default(),
            process_pool: ProcessPoolSettings::default(),
            llm: LlmConfig::default(),
            summary: SummarySettings::default(),
            report: ReportSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadPoolSettings {
    /// `0` lets rayon pick one thread per core.
    pub workers: usize,
}

impl Default for ThreadPoolSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_THREAD_POOL_WORKERS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessPoolSettings {
    /// Upper bound on worker processes; never more than the batch size are spawned.
    pub workers: usize,
    /// Worker executable. Defaults to the running binary.
    pub program: Option<PathBuf>,
}

impl Default for ProcessPoolSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_PROCESS_POOL_WORKERS,
            program: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            max_tokens: 300,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Render the timing chart after the table.
    pub chart: bool,
    /// Write the chart here instead of standard output.
    pub chart_path: Option<PathBuf>,
    pub chart_width: u16,
    pub chart_height: u16,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            chart: true,
            chart_path: None,
            chart_width: 80,
            chart_height: 24,
        }
    }
}

impl FanoutConfig {
    /// Reject configurations no experiment could run.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let invalid = |msg: String| Err(ConfigLoadError::Invalid(msg));

        if self.urls.is_empty() {
            return invalid("urls must not be empty".into());
        }
        if self.batch_sizes.is_empty() {
            return invalid("batch_sizes must not be empty".into());
        }
        if let Some(bad) = self
            .batch_sizes
            .iter()
            .find(|&&n| n == 0 || n > self.urls.len())
        {
            return invalid(format!(
                "batch size {bad} must be between 1 and the {} configured urls",
                self.urls.len()
            ));
        }
        if self.strategies.is_empty() {
            return invalid("strategies must not be empty".into());
        }
        let distinct: BTreeSet<_> = self.strategies.iter().collect();
        if distinct.len() != self.strategies.len() {
            return invalid("strategies must not repeat".into());
        }
        if self.fetch.paragraphs == 0 {
            return invalid("fetch.paragraphs must be at least 1".into());
        }
        if self.fetch.timeout_secs == 0 {
            return invalid("fetch.timeout_secs must be at least 1".into());
        }
        if self.process_pool.workers == 0 {
            return invalid("process_pool.workers must be at least 1".into());
        }
        if let Some(key) = self.llm.api_key() {
            if key.trim().is_empty() {
                return invalid("llm.api_key must not be empty".into());
            }
            if key.contains('$') {
                return invalid(format!(
                    "llm.api_key {key} references an unset environment variable"
                ));
            }
        }
        if !(0.0..=2.0).contains(&self.summary.temperature) {
            return invalid(format!(
                "summary.temperature {} is outside 0.0..=2.0",
                self.summary.temperature
            ));
        }
        Ok(())
    }
}

/// Resolve `${VAR}` references in every string, following references found
/// in variable values up to a fixed depth. Unknown variables stay verbatim.
fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) if s.contains('$') => {
            let mut current = std::mem::take(s);
            for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                let Ok(expanded) = shellexpand::env(&current) else {
                    break;
                };
                if expanded == current {
                    break;
                }
                current = expanded.into_owned();
            }
            *s = current;
        }
        Value::Array(items) => items.iter_mut().for_each(expand_env_in_value),
        Value::Object(map) => map.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Non-string scalar keys. Environment overrides arrive as text and only
/// these are parsed, so keys, models and paths stay strings.
const TYPED_KEYS: [&str; 10] = [
    "seed",
    "fetch.paragraphs",
    "fetch.timeout_secs",
    "thread_pool.workers",
    "process_pool.workers",
    "summary.max_tokens",
    "summary.temperature",
    "report.chart",
    "report.chart_width",
    "report.chart_height",
];

fn parse_typed_keys(root: &mut Value) {
    for key in TYPED_KEYS {
        let slot = key
            .split('.')
            .try_fold(&mut *root, |node, part| node.get_mut(part));
        if let Some(slot) = slot {
            if let Some(parsed) = slot.as_str().and_then(parse_scalar) {
                *slot = parsed;
            }
        }
    }
}

fn parse_scalar(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if let Ok(flag) = raw.parse::<bool>() {
        return Some(Value::Bool(flag));
    }
    if let Ok(n) = raw.parse::<u64>() {
        return Some(Value::from(n));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// Builder over the `config` crate sources.
///
/// Later sources override earlier ones; the environment always wins.
pub struct FanoutConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for FanoutConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl FanoutConfigLoader {
    /// ```
    /// use fanout_config::FanoutConfigLoader;
    ///
    /// let config = FanoutConfigLoader::new()
    ///     .with_yaml_str("version: '1'\nbatch_sizes: [2]")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.batch_sizes, vec![2]);
    /// assert_eq!(config.urls.len(), 10);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a required file; the format is inferred from its suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, for env-only deployments.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Merge the sources, overlay the environment, expand `${VAR}`
    /// references, parse numeric and boolean overrides, then deserialize and
    /// validate.
    ///
    /// ```
    /// use fanout_config::{FanoutConfigLoader, LlmConfig};
    ///
    /// unsafe { std::env::set_var("DOCTEST_ANTHROPIC_KEY", "sk-from-env"); }
    ///
    /// let config = FanoutConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// llm:
    ///   provider: anthropic
    ///   api_key: "${DOCTEST_ANTHROPIC_KEY}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// match config.llm {
    ///     LlmConfig::Anthropic { api_key, .. } => assert_eq!(api_key, "sk-from-env"),
    ///     other => panic!("expected anthropic, got {other:?}"),
    /// }
    ///
    /// unsafe { std::env::remove_var("DOCTEST_ANTHROPIC_KEY"); }
    /// ```
    pub fn load(self) -> Result<FanoutConfig, ConfigLoadError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let mut raw: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut raw);
        parse_typed_keys(&mut raw);

        let typed: FanoutConfig = serde_json::from_value(raw)?;
        typed.validate()?;
        Ok(typed)
    }
}
