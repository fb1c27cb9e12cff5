//! Error taxonomy for the validation engine.

use std::path::PathBuf;

/// Errors raised while loading or validating engine configuration.
///
/// Always fatal: configuration is checked once at load time and never
/// silently defaulted afterwards.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid rubric: {0}")]
    InvalidRubric(String),

    #[error(
        "judgment thresholds must satisfy fail < pass <= total (fail={fail}, pass={pass}, total={total})"
    )]
    InvalidThresholds { fail: u32, pass: u32, total: u32 },

    #[error("invalid decision policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid structural checks: {0}")]
    InvalidChecks(String),
}

/// Failure reported by a caller-supplied candidate generator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("generation failed: {0}")]
    Failed(String),
}

impl GenerationError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Failure reported by a judge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JudgeError {
    /// Transport failure or timeout. Retryable within the attempt budget.
    #[error("judge unavailable: {reason}")]
    Unavailable { reason: String },

    /// The judge answered, but the payload is not a usable rubric score.
    #[error("judge returned a malformed response: {reason}")]
    MalformedResponse { reason: String, raw: String },
}

impl JudgeError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

/// Terminal errors of one validation call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("generation failed on attempt {attempt}: {reason}")]
    GenerationFailed { attempt: u32, reason: String },

    #[error("validation aborted on attempt {attempt}: {reason}")]
    Aborted { attempt: u32, reason: String },

    #[error("validation cancelled before any attempt completed")]
    Cancelled,

    #[error("validation task failed: {0}")]
    TaskFailed(String),
}

impl ValidationError {
    /// Stable machine-readable kind, used in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GenerationFailed { .. } => "generation_failed",
            Self::Aborted { .. } => "validation_aborted",
            Self::Cancelled => "cancelled",
            Self::TaskFailed(_) => "task_failed",
        }
    }
}

/// Umbrella error for the crate.
#[derive(Debug, thiserror::Error)]
pub enum RubricGateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Judge(#[from] JudgeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, RubricGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_error_display() {
        let err = ConfigError::InvalidThresholds {
            fail: 80,
            pass: 60,
            total: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("fail=80"));
        assert!(msg.contains("pass=60"));
    }

    #[test]
    fn test_validation_error_kinds_are_stable() {
        assert_eq!(
            ValidationError::Aborted {
                attempt: 3,
                reason: "timeout".into()
            }
            .kind(),
            "validation_aborted"
        );
        assert_eq!(ValidationError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn test_judge_error_keeps_raw_payload() {
        let err = JudgeError::malformed("missing total_score", "{\"a\": 1}");
        match err {
            JudgeError::MalformedResponse { raw, .. } => assert_eq!(raw, "{\"a\": 1}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_umbrella_wraps_config_error() {
        let err: RubricGateError = ConfigError::InvalidRubric("empty".into()).into();
        assert!(err.to_string().contains("invalid rubric"));
    }
}
