use std::io::Write;
use std::time::Duration;

use rubricgate_core::{ConfigError, EngineConfig, ExhaustionPolicy};
use tempfile::NamedTempFile;

const CUSTOM: &str = r#"
max_attempts = 5
auto_approve_min_score = 9
auto_approve_min_confidence = 0.7
judge_timeout_ms = 1500
exhaustion = "best_score"

[rubric]
pass_threshold = 8
fail_threshold = 5

[[rubric.categories]]
id = "accuracy"
label = "Accuracy"
ceiling = 6
criteria = [
    { id = "facts", ceiling = 4 },
    { id = "units", ceiling = 2 },
]

[[rubric.categories]]
id = "style"
ceiling = 4
criteria = [{ id = "tone", ceiling = 4 }]

[checks]
required_fields = ["prompt"]
text_fields = ["prompt"]
primary_text_field = "prompt"
min_length = 3
max_length = 500
"#;

#[test]
fn loads_custom_rubric_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CUSTOM.as_bytes()).unwrap();

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.max_attempts, 5);
    assert_eq!(config.exhaustion, ExhaustionPolicy::BestScore);
    assert_eq!(config.judge_timeout, Duration::from_millis(1500));
    assert_eq!(config.rubric.total_ceiling(), 10);
    assert_eq!(config.rubric.thresholds().pass, 8);
    assert_eq!(config.policy.auto_approve_min_score, 9);
    assert_eq!(config.checks.primary_text_field, "prompt");
    assert_eq!(config.rubric.labels(), vec!["Accuracy", "style"]);
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EngineConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn category_ceiling_must_match_criteria() {
    let text = CUSTOM.replace("ceiling = 6", "ceiling = 7");
    let err = EngineConfig::from_toml_str(&text).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidRubric(_)));
}

#[test]
fn inverted_thresholds_are_rejected() {
    let text = CUSTOM
        .replace("pass_threshold = 8", "pass_threshold = 4")
        .replace("auto_approve_min_score = 9", "auto_approve_min_score = 4");
    let err = EngineConfig::from_toml_str(&text).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidThresholds { .. }));
}

#[test]
fn min_score_above_rubric_total_is_rejected() {
    let text = CUSTOM.replace("auto_approve_min_score = 9", "auto_approve_min_score = 11");
    let err = EngineConfig::from_toml_str(&text).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPolicy(_)));
}

#[test]
fn negative_timeout_is_rejected() {
    let err = EngineConfig::from_toml_str("judge_timeout_ms = -5").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPolicy(_)));
}

#[test]
fn inverted_length_bounds_are_rejected() {
    let text = CUSTOM.replace("min_length = 3", "min_length = 600");
    let err = EngineConfig::from_toml_str(&text).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidChecks(_)));
}
