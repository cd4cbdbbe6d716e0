use super::*;
use crate::errors::EngineError;
use crate::models::Language;
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn test_empty_document_yields_defaults() {
    let config = ConfigLoader::from_str_with_env("", no_env).unwrap();

    assert_eq!(config.execution.playground_timeout_ms, 10_000);
    assert_eq!(config.execution.playground_grace_ms, 1_000);
    assert_eq!(config.execution.test_grace_ms, 5_000);
    assert_eq!(config.pool.min_per_pool, 2);
    assert_eq!(config.pool.max_per_pool, 10);
    assert_eq!(config.pool.warmup_parallelism, 4);
    assert!(!config.pool.enabled);
    assert_eq!(
        config.images.test.get(Language::Python),
        Some("jhypki/ascenddev-python-tester:latest")
    );
    assert_eq!(config.images.run.get(Language::Go), None);
}

#[test]
fn test_partial_sections_keep_other_defaults() {
    let yaml = r#"
execution:
  playground_timeout_ms: 3000
pool:
  enabled: true
  max_per_pool: 4
  warmup:
    - language: python
      framework: pytest
      count: 3
"#;
    let config = ConfigLoader::from_str_with_env(yaml, no_env).unwrap();

    assert_eq!(config.execution.playground_timeout_ms, 3000);
    assert_eq!(config.execution.test_grace_ms, 5_000);
    assert!(config.pool.enabled);
    assert_eq!(config.pool.max_per_pool, 4);
    assert_eq!(config.pool.min_per_pool, 2);
    assert_eq!(config.pool.warmup.len(), 1);
    assert_eq!(config.pool.image_for("Python", "PyTest"), Some("jhypki/ascenddev-python-tester:latest"));
}

#[test]
fn test_min_above_max_is_rejected() {
    let yaml = "pool:\n  min_per_pool: 5\n  max_per_pool: 2\n";
    let err = ConfigLoader::from_str_with_env(yaml, no_env).unwrap_err();
    assert!(matches!(err, EngineError::Config(ref msg) if msg.contains("min_per_pool")));
}

#[test]
fn test_zero_timeout_is_rejected() {
    let yaml = "execution:\n  playground_timeout_ms: 0\n";
    assert!(ConfigLoader::from_str_with_env(yaml, no_env).is_err());
}

#[test]
fn test_warmup_without_image_is_rejected() {
    let yaml = "pool:\n  warmup:\n    - language: ruby\n      framework: rspec\n";
    let err = ConfigLoader::from_str_with_env(yaml, no_env).unwrap_err();
    assert!(err.to_string().contains("ruby/rspec"));
}

#[test]
fn test_deadlines_saturate_on_huge_timeouts() {
    let execution = ExecutionConfig {
        playground_timeout_ms: u64::MAX,
        ..Default::default()
    };

    assert_eq!(execution.test_deadline(u64::MAX), std::time::Duration::from_millis(u64::MAX));
    assert_eq!(execution.playground_deadline(), std::time::Duration::from_millis(u64::MAX));
    assert_eq!(execution.test_deadline(1_000), std::time::Duration::from_millis(6_000));
}

#[test]
fn test_invalid_yaml_is_config_error() {
    let err = ConfigLoader::from_str_with_env("pool: [not, a, map", no_env).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn test_environment_overrides() {
    let vars: HashMap<&str, &str> = [
        ("CODEGRADE_DOCKER_SOCKET", "/tmp/docker.sock"),
        ("CODEGRADE_POOL_ENABLED", "true"),
        ("CODEGRADE_POOL_MAX", "7"),
        ("CODEGRADE_WORK_ROOT", "/var/tmp/grading"),
    ]
    .into_iter()
    .collect();

    let config =
        ConfigLoader::from_str_with_env("", |key| vars.get(key).map(|v| v.to_string())).unwrap();

    assert_eq!(config.docker.socket.as_deref(), Some("/tmp/docker.sock"));
    assert!(config.pool.enabled);
    assert_eq!(config.pool.max_per_pool, 7);
    assert_eq!(
        config.execution.work_root(),
        std::path::PathBuf::from("/var/tmp/grading")
    );
}

#[test]
fn test_malformed_environment_override() {
    let err = ConfigLoader::from_str_with_env("", |key| {
        (key == "CODEGRADE_POOL_MIN").then(|| "many".to_string())
    })
    .unwrap_err();
    assert!(err.to_string().contains("CODEGRADE_POOL_MIN"));
}

#[tokio::test]
async fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "docker:\n  timeout_secs: 30\n").unwrap();

    let config = load_config(file.path()).await.unwrap();
    assert_eq!(config.docker.timeout_secs, 30);
}

#[tokio::test]
async fn test_missing_file_is_config_error() {
    let err = load_config("/definitely/not/here.yaml").await.unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn test_deadlines_include_grace() {
    let execution = ExecutionConfig::default();
    assert_eq!(execution.playground_deadline().as_millis(), 11_000);
    assert_eq!(execution.test_deadline(2_000).as_millis(), 7_000);
}
