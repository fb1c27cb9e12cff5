//! Engine configuration.
//!
//! Loaded once from TOML and validated as a whole; any inconsistency is a
//! [`ConfigError`] and nothing is silently defaulted afterwards.
//!
//! ```toml
//! max_attempts = 3
//! auto_approve_min_score = 85
//! auto_approve_min_confidence = 0.8
//! judge_timeout_ms = 30000
//! exhaustion = "last_attempt"
//!
//! [rubric]
//! pass_threshold = 80
//! fail_threshold = 60
//!
//! [[rubric.categories]]
//! id = "alignment"
//! ceiling = 30
//! criteria = [{ id = "objective_fit", ceiling = 30 }]
//!
//! [checks]
//! required_fields = ["question", "answer"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::checks::CheckConfig;
use crate::decision::DecisionPolicy;
use crate::domain::{load_rubric, ConfigError, Rubric, RubricConfig};
use crate::orchestrator::ExhaustionPolicy;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.8;
pub const DEFAULT_JUDGE_TIMEOUT_MS: u64 = 30_000;

/// File form. Integers are signed so that negative values surface as
/// validation errors with a useful message.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EngineConfigFile {
    max_attempts: Option<i64>,
    auto_approve_min_score: Option<i64>,
    auto_approve_min_confidence: Option<f64>,
    judge_timeout_ms: Option<i64>,
    #[serde(default)]
    exhaustion: ExhaustionPolicy,
    rubric: Option<RubricConfig>,
    #[serde(default)]
    checks: CheckConfig,
}

/// Validated engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub rubric: Rubric,
    pub max_attempts: u32,
    pub policy: DecisionPolicy,
    pub judge_timeout: Duration,
    pub exhaustion: ExhaustionPolicy,
    pub checks: CheckConfig,
}

impl EngineConfig {
    /// Defaults around `rubric`.
    pub fn new(rubric: Rubric) -> Self {
        Self {
            policy: DecisionPolicy::for_rubric(&rubric),
            rubric,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            judge_timeout: Duration::from_millis(DEFAULT_JUDGE_TIMEOUT_MS),
            exhaustion: ExhaustionPolicy::default(),
            checks: CheckConfig::default(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_auto_approve_min_score(mut self, score: u32) -> Self {
        self.policy.auto_approve_min_score = score;
        self
    }

    pub fn with_auto_approve_min_confidence(mut self, confidence: f64) -> Self {
        self.policy.auto_approve_min_confidence = confidence;
        self
    }

    pub fn with_judge_timeout(mut self, timeout: Duration) -> Self {
        self.judge_timeout = timeout;
        self
    }

    pub fn with_exhaustion(mut self, exhaustion: ExhaustionPolicy) -> Self {
        self.exhaustion = exhaustion;
        self
    }

    pub fn with_checks(mut self, checks: CheckConfig) -> Self {
        self.checks = checks;
        self
    }

    /// Parse and validate a TOML document. Without a `[rubric]` table the
    /// reference rubric is used.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: EngineConfigFile =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let rubric = match &file.rubric {
            Some(raw) => load_rubric(raw)?,
            None => Rubric::reference(),
        };
        let mut config = Self::new(rubric).with_exhaustion(file.exhaustion).with_checks(file.checks);

        if let Some(n) = file.max_attempts {
            config.max_attempts = u32::try_from(n)
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| {
                    ConfigError::InvalidPolicy(format!("max_attempts must be >= 1, got {n}"))
                })?;
        }
        if let Some(score) = file.auto_approve_min_score {
            config.policy.auto_approve_min_score = u32::try_from(score).map_err(|_| {
                ConfigError::InvalidPolicy(format!(
                    "auto_approve_min_score must be non-negative, got {score}"
                ))
            })?;
        }
        if let Some(confidence) = file.auto_approve_min_confidence {
            config.policy.auto_approve_min_confidence = confidence;
        }
        if let Some(ms) = file.judge_timeout_ms {
            let ms = u64::try_from(ms).ok().filter(|ms| *ms > 0).ok_or_else(|| {
                ConfigError::InvalidPolicy(format!("judge_timeout_ms must be > 0, got {ms}"))
            })?;
            config.judge_timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidPolicy(
                "max_attempts must be >= 1, got 0".to_string(),
            ));
        }
        if self.judge_timeout.is_zero() {
            return Err(ConfigError::InvalidPolicy(
                "judge timeout must be > 0".to_string(),
            ));
        }
        if self.policy.thresholds != self.rubric.thresholds() {
            return Err(ConfigError::InvalidPolicy(
                "decision thresholds differ from the rubric's".to_string(),
            ));
        }
        self.policy.validate(&self.rubric)?;
        self.checks.validate()
    }
}
