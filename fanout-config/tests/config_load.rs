use fanout_config::{
    ConfigLoadError, FailurePolicy, FanoutConfigLoader, LlmConfig, StrategyKind,
};
use serial_test::serial;
use std::{fs, path::PathBuf};
use tempfile::TempDir;

/// Helper to write a YAML file in a temp dir and return its path.
fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

const FILE_YAML: &str = r#"
version: "0.1"
urls:
  - https://en.wikipedia.org/wiki/Poodle
  - https://en.wikipedia.org/wiki/Beagle
  - https://en.wikipedia.org/wiki/Dachshund
batch_sizes: [1, 3]
seed: 42
failure_policy: isolate
strategies: [sequential, async, thread-pool, process-pool]
fetch:
  paragraphs: 2
  timeout_secs: 5
thread_pool:
  workers: 6
llm:
  provider: openai
  api_key: "${FANOUT_TEST_OPENAI_KEY}"
summary:
  max_tokens: 120
report:
  chart: false
"#;

#[test]
#[serial]
fn file_values_are_typed() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "fanout.yaml", FILE_YAML);

    let config = temp_env::with_var("FANOUT_TEST_OPENAI_KEY", Some("sk-file"), || {
        FanoutConfigLoader::new().with_file(&p).load()
    })
    .expect("load config");

    assert_eq!(config.urls.len(), 3);
    assert_eq!(config.batch_sizes, vec![1, 3]);
    assert_eq!(config.seed, Some(42));
    assert_eq!(config.failure_policy, FailurePolicy::Isolate);
    assert_eq!(config.strategies, StrategyKind::ALL.to_vec());
    assert_eq!(config.fetch.paragraphs, 2);
    assert_eq!(config.fetch.timeout_secs, 5);
    assert_eq!(config.thread_pool.workers, 6);
    assert_eq!(config.process_pool.workers, 4);
    assert_eq!(config.summary.max_tokens, 120);
    assert!((config.summary.temperature - 0.2).abs() < f32::EPSILON);
    assert!(!config.report.chart);
    match config.llm {
        LlmConfig::OpenAi { api_key, model, .. } => {
            assert_eq!(api_key, "sk-file");
            assert_eq!(model, fanout_common::DEFAULT_OPENAI_MODEL);
        }
        other => panic!("expected openai, got {other:?}"),
    }
}

#[test]
#[serial]
fn environment_overrides_file() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "fanout.yaml", FILE_YAML);

    let config = temp_env::with_vars(
        [
            ("FANOUT_TEST_OPENAI_KEY", Some("sk-file")),
            ("FANOUT__SEED", Some("7")),
            ("FANOUT__FAILURE_POLICY", Some("abort")),
            ("FANOUT__THREAD_POOL__WORKERS", Some("3")),
        ],
        || FanoutConfigLoader::new().with_file(&p).load(),
    )
    .expect("load config");

    assert_eq!(config.seed, Some(7));
    assert_eq!(config.failure_policy, FailurePolicy::Abort);
    assert_eq!(config.thread_pool.workers, 3);
    assert_eq!(config.fetch.paragraphs, 2);
}

#[test]
#[serial]
fn missing_optional_file_falls_back_to_defaults() {
    let tmp = TempDir::new().unwrap();

    let config = FanoutConfigLoader::new()
        .with_optional_file(tmp.path().join("absent.yaml"))
        .load()
        .expect("defaults load");

    assert_eq!(config.urls.len(), 10);
    assert_eq!(config.batch_sizes, vec![1, 3, 5, 10]);
    assert!(config.llm.is_disabled());
}

#[test]
#[serial]
fn missing_required_file_is_an_error() {
    let tmp = TempDir::new().unwrap();

    let err = FanoutConfigLoader::new()
        .with_file(tmp.path().join("absent.yaml"))
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigLoadError::Source(_)), "got {err:?}");
}

#[test]
#[serial]
fn batch_larger_than_pool_fails_validation() {
    let err = FanoutConfigLoader::new()
        .with_yaml_str("urls: [\"https://a.example/one\"]\nbatch_sizes: [1, 2]")
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigLoadError::Invalid(_)), "got {err:?}");
}

#[test]
#[serial]
fn unknown_strategy_is_a_schema_error() {
    let err = FanoutConfigLoader::new()
        .with_yaml_str("strategies: [sequential, green-threads]")
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigLoadError::Schema(_)), "got {err:?}");
}

#[test]
#[serial]
fn unset_api_key_reference_fails_validation() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "fanout.yaml", FILE_YAML);

    let err = temp_env::with_var_unset("FANOUT_TEST_OPENAI_KEY", || {
        FanoutConfigLoader::new().with_file(&p).load()
    })
    .unwrap_err();

    match err {
        ConfigLoadError::Invalid(msg) => assert!(msg.contains("FANOUT_TEST_OPENAI_KEY"), "{msg}"),
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
#[serial]
fn environment_strings_are_not_parsed_as_numbers() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "fanout.yaml", FILE_YAML);

    let config = temp_env::with_vars(
        [
            ("FANOUT_TEST_OPENAI_KEY", Some("sk-file")),
            ("FANOUT__LLM__API_KEY", Some("12345")),
            ("FANOUT__LLM__MODEL", Some("4")),
            ("FANOUT__SUMMARY__TEMPERATURE", Some("0.5")),
            ("FANOUT__REPORT__CHART", Some("true")),
            ("FANOUT__FETCH__TIMEOUT_SECS", Some("9")),
        ],
        || FanoutConfigLoader::new().with_file(&p).load(),
    )
    .expect("load config");

    match config.llm {
        LlmConfig::OpenAi { api_key, model, .. } => {
            assert_eq!(api_key, "12345");
            assert_eq!(model, "4");
        }
        other => panic!("expected openai, got {other:?}"),
    }
    assert!((config.summary.temperature - 0.5).abs() < f32::EPSILON);
    assert!(config.report.chart);
    assert_eq!(config.fetch.timeout_secs, 9);
}
