use std::io::Write;
use std::path::PathBuf;

use nodeflow_core::config::{AppConfig, Schedule};
use nodeflow_core::error::FlowError;
use nodeflow_core::types::RunMode;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
mode = "live"
use_simulators = true
seed = 7
speed = 0.5
base_delay_ms = 250
step_budget_factor = 3
schedule = "full-order"

[model]
provider = "openai"
model_id = "gpt-4o"
api_key = "sk-test-key"
max_tokens = 4096
temperature = 0.5

[model.retry]
max_retries = 5
initial_backoff_ms = 200

[[fallback_models]]
provider = "gemini"
model_id = "gemini-1.5-flash"
api_key = "g-key"

[log]
log_dir = "/tmp/nodeflow-test/logs"
level = 3

[storage]
data_dir = "/tmp/nodeflow-test"
save_runs = false

[policy]
disallowed_models = ["gpt-3.5-turbo"]
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.mode, RunMode::Live);
    assert!(config.engine.use_simulators);
    assert_eq!(config.engine.seed, 7);
    assert_eq!(config.engine.base_delay_ms, 250);
    assert_eq!(config.engine.step_budget_factor, 3);
    assert_eq!(config.engine.schedule, Schedule::FullOrder);

    assert_eq!(config.model.model_id, "gpt-4o");
    assert_eq!(config.model.api_key, Some("sk-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 4096);
    let retry = config.model.retry.as_ref().expect("retry present");
    assert_eq!(retry.max_retries, 5);
    assert_eq!(retry.initial_backoff_ms, 200);
    assert_eq!(retry.max_backoff_ms, 30000);

    assert_eq!(config.fallback_models.len(), 1);
    assert_eq!(config.fallback_models[0].provider, "gemini");

    assert_eq!(
        config.log_dir(),
        Some(PathBuf::from("/tmp/nodeflow-test/logs"))
    );
    assert_eq!(config.log.as_ref().map(|l| l.level), Some(3));
    assert_eq!(config.data_dir(), PathBuf::from("/tmp/nodeflow-test"));
    assert!(!config.storage.save_runs);
    assert_eq!(config.policy.disallowed_models, vec!["gpt-3.5-turbo"]);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("NODEFLOW_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "test-model"
api_key = "${NODEFLOW_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("NODEFLOW_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[model]
model_id = "llama3.2"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.engine.mode, RunMode::Mock);
    assert!(!config.engine.use_simulators);
    assert_eq!(config.engine.speed, 1.0);
    assert_eq!(config.engine.schedule, Schedule::Chain);
    assert!(config.fallback_models.is_empty());
    assert!(config.log.is_none());
    assert!(config.log_dir().is_none());
    assert!(config.storage.save_runs);
}

#[test]
fn test_disabled_log_section_has_no_dir() {
    let toml_content = r#"
[log]
enabled = false
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert!(config.log.is_some());
    assert!(config.log_dir().is_none());
}

#[test]
fn test_missing_file_is_config_not_found() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/nodeflow.toml")).unwrap_err();
    assert!(matches!(err, FlowError::ConfigNotFound(_)));
}

#[test]
fn test_bad_schedule_is_config_error() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine]\nschedule = \"sideways\"\n")
        .expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, FlowError::Config(_)));
}
