//! Retry orchestrator.
//!
//! One validation call runs a bounded, strictly sequential loop:
//!
//! ```text
//! Generating -> Formatting -> Judging -> Checking -> Deciding
//!     -> Accepted | Retrying | Exhausted
//! ```
//!
//! Every attempt appends exactly one [`AttemptRecord`]. A judge that is
//! unavailable consumes the attempt like a failed judgment; on the final
//! attempt it aborts the call because no verdict exists. Generator failures
//! propagate immediately.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::cancel::CancelSignal;
use crate::checks::{RuleCheckResult, RuleChecker, StructuralChecker};
use crate::config::EngineConfig;
use crate::decision::{decide, Verdict};
use crate::domain::{
    Candidate, ConfigError, EvaluationContext, FinalJudgment, GenerationError, Issue, IssueCode,
    JudgeError, RubricScore, ValidationError,
};
use crate::format::{CandidateFormatter, FormattedCandidate};
use crate::judge::Judge;
use crate::metrics::METRICS;
use crate::obs;

// ---------------------------------------------------------------------------
// Generator contract
// ---------------------------------------------------------------------------

/// What the previous attempt produced, handed to the generator so it can
/// adapt. Absent on the first attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorAttemptFeedback {
    pub attempt: u32,
    /// `None` when the judge could not be reached.
    pub judgment: Option<FinalJudgment>,
    pub total_score: Option<u32>,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    pub judge_error: Option<String>,
}

impl PriorAttemptFeedback {
    fn from_record(record: &AttemptRecord) -> Self {
        let (judgment, total_score, issues, suggestions) = match &record.verdict {
            Some(v) => (
                Some(v.judgment),
                Some(v.total_score),
                v.issues.clone(),
                v.suggestions.clone(),
            ),
            None => (None, None, record.rule_result.issues.clone(), Vec::new()),
        };
        Self {
            attempt: record.attempt,
            judgment,
            total_score,
            issues,
            suggestions,
            judge_error: record.judge_error.clone(),
        }
    }
}

/// Caller-supplied candidate source.
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    async fn generate(
        &self,
        feedback: Option<&PriorAttemptFeedback>,
    ) -> Result<Candidate, GenerationError>;
}

// ---------------------------------------------------------------------------
// Records and outcome
// ---------------------------------------------------------------------------

/// Step of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    Generating,
    Formatting,
    Judging,
    Checking,
    Deciding,
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Generating => "generating",
            Self::Formatting => "formatting",
            Self::Judging => "judging",
            Self::Checking => "checking",
            Self::Deciding => "deciding",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// Some attempt was judged Pass.
    Accepted,
    /// Attempts ran out, or the loop was cancelled, without a Pass.
    Exhausted,
}

impl TerminalState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Which attempt an exhausted loop returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// The most recent attempt that produced a verdict.
    #[default]
    LastAttempt,
    /// The attempt with the highest recomputed total; ties go to the later one.
    BestScore,
}

/// One loop iteration, whatever its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub candidate: Candidate,
    pub formatted_digest: String,
    pub score: Option<RubricScore>,
    pub rule_result: RuleCheckResult,
    /// `None` only when the judge was unavailable.
    pub verdict: Option<Verdict>,
    pub judge_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Terminal result of one validation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub state: TerminalState,
    pub candidate: Candidate,
    pub verdict: Verdict,
    /// Every attempt in order; `attempts.len() == attempt_count`.
    pub attempts: Vec<AttemptRecord>,
    pub attempt_count: u32,
    /// 1-based attempt the candidate and verdict come from.
    pub selected_attempt: u32,
    pub cancelled: bool,
}

impl ValidationOutcome {
    pub fn selected_record(&self) -> Option<&AttemptRecord> {
        self.attempts
            .iter()
            .find(|r| r.attempt == self.selected_attempt)
    }

    /// Rule issues of the selected attempt.
    pub fn final_rule_issues(&self) -> &[Issue] {
        self.selected_record()
            .map(|r| r.rule_result.issues.as_slice())
            .unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Runs the validation loop for one candidate at a time. Cheap to share
/// behind an `Arc` across concurrent calls.
pub struct Validator {
    config: EngineConfig,
    judge: Arc<dyn Judge>,
    checker: Arc<dyn StructuralChecker>,
    formatter: CandidateFormatter,
}

impl Validator {
    pub fn new(
        config: EngineConfig,
        judge: Arc<dyn Judge>,
        checker: Arc<dyn StructuralChecker>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            formatter: CandidateFormatter::new(&config.rubric),
            config,
            judge,
            checker,
        })
    }

    /// Validator using a [`RuleChecker`] built from `config.checks`.
    pub fn with_rule_checker(
        config: EngineConfig,
        judge: Arc<dyn Judge>,
    ) -> Result<Self, ConfigError> {
        let checker = RuleChecker::new(config.checks.clone())?;
        Self::new(config, judge, Arc::new(checker))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn formatter(&self) -> &CandidateFormatter {
        &self.formatter
    }

    /// Run the loop until Pass, exhaustion, abort or cancellation.
    #[instrument(skip_all, fields(max_attempts = self.config.max_attempts))]
    pub async fn validate(
        &self,
        generator: &dyn CandidateGenerator,
        context: &EvaluationContext,
        cancel: &CancelSignal,
    ) -> Result<ValidationOutcome, ValidationError> {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts;
        let mut records: Vec<AttemptRecord> = Vec::with_capacity(max_attempts as usize);
        let mut feedback: Option<PriorAttemptFeedback> = None;
        let mut cancelled = false;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            METRICS.inc_attempts();
            obs::emit_attempt_started(attempt, max_attempts);
            let started_at = Utc::now();

            phase(attempt, AttemptPhase::Generating);
            let candidate = match generator.generate(feedback.as_ref()).await {
                Ok(candidate) => candidate,
                Err(GenerationError::Failed(reason)) => {
                    let err = ValidationError::GenerationFailed { attempt, reason };
                    obs::emit_validation_failed(&err);
                    return Err(err);
                }
            };

            phase(attempt, AttemptPhase::Formatting);
            let formatted = self.formatter.format(&candidate, context);

            phase(attempt, AttemptPhase::Judging);
            let judged = self.judge_once(&formatted, context).await;

            phase(attempt, AttemptPhase::Checking);
            let rule_result = self.checker.check(&candidate);

            phase(attempt, AttemptPhase::Deciding);
            let (score, verdict, judge_error) = match judged {
                Ok(score) => {
                    let verdict =
                        decide(&score, &rule_result, &self.config.rubric, &self.config.policy);
                    (Some(score), Some(verdict), None)
                }
                Err(err) => {
                    obs::emit_attempt_judge_failed(attempt, &err);
                    let verdict = match &err {
                        JudgeError::MalformedResponse { reason, .. } => {
                            METRICS.inc_judge_malformed();
                            Some(Verdict::malformed_judge_response(reason, &rule_result))
                        }
                        JudgeError::Unavailable { .. } => {
                            METRICS.inc_judge_unavailable();
                            None
                        }
                    };
                    (None, verdict, Some(err.to_string()))
                }
            };
            if let Some(verdict) = &verdict {
                obs::emit_attempt_decided(attempt, verdict);
            }

            let passed = verdict
                .as_ref()
                .is_some_and(|v| v.judgment == FinalJudgment::Pass);
            let unjudged = verdict.is_none();
            let record = AttemptRecord {
                attempt,
                candidate,
                formatted_digest: formatted.digest,
                score,
                rule_result,
                verdict,
                judge_error,
                started_at,
                finished_at: Utc::now(),
            };
            let next_feedback = PriorAttemptFeedback::from_record(&record);
            records.push(record);

            if passed {
                return self.finish(records, TerminalState::Accepted, attempt, false, started);
            }
            if unjudged && attempt == max_attempts {
                let err = ValidationError::Aborted {
                    attempt,
                    reason: next_feedback.judge_error.unwrap_or_default(),
                };
                METRICS.inc_aborted();
                obs::emit_validation_failed(&err);
                return Err(err);
            }
            feedback = Some(next_feedback);
        }

        if records.is_empty() {
            obs::emit_validation_failed(&ValidationError::Cancelled);
            return Err(ValidationError::Cancelled);
        }

        // Without any verdict the selection is empty and `finish` aborts.
        let selected = select_attempt(&records, self.config.exhaustion).unwrap_or(0);
        self.finish(records, TerminalState::Exhausted, selected, cancelled, started)
    }

    async fn judge_once(
        &self,
        formatted: &FormattedCandidate,
        context: &EvaluationContext,
    ) -> Result<RubricScore, JudgeError> {
        METRICS.inc_judge_calls();
        let timeout = self.config.judge_timeout;
        match tokio::time::timeout(timeout, self.judge.score(formatted, context, &self.config.rubric))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(JudgeError::unavailable(format!(
                "judge call timed out after {} ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Assemble the outcome around the selected attempt, which must carry a
    /// verdict.
    fn finish(
        &self,
        records: Vec<AttemptRecord>,
        state: TerminalState,
        selected: u32,
        cancelled: bool,
        started: Instant,
    ) -> Result<ValidationOutcome, ValidationError> {
        let attempt_count = records.len() as u32;
        let Some((candidate, verdict)) = records
            .iter()
            .find(|r| r.attempt == selected)
            .and_then(|r| r.verdict.clone().map(|v| (r.candidate.clone(), v)))
        else {
            let err = ValidationError::Aborted {
                attempt: attempt_count,
                reason: "no attempt produced a verdict".to_string(),
            };
            METRICS.inc_aborted();
            obs::emit_validation_failed(&err);
            return Err(err);
        };

        match state {
            TerminalState::Accepted => METRICS.inc_accepted(),
            TerminalState::Exhausted => METRICS.inc_exhausted(),
        }
        obs::emit_validation_finished(
            state.as_str(),
            attempt_count,
            cancelled,
            elapsed_ms(started),
        );

        Ok(ValidationOutcome {
            state,
            candidate,
            verdict,
            attempts: records,
            attempt_count,
            selected_attempt: selected,
            cancelled,
        })
    }
}

fn phase(attempt: u32, phase: AttemptPhase) {
    tracing::debug!(attempt, phase = %phase, "attempt phase");
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Ranking key for `BestScore`: judgment band first, then whether the judge
/// payload was trustworthy, then the recomputed total.
fn best_score_key(verdict: &Verdict) -> (u8, bool, u32) {
    let band = match verdict.judgment {
        FinalJudgment::Pass => 2,
        FinalJudgment::NeedsRevision => 1,
        FinalJudgment::Fail => 0,
    };
    let trusted = !verdict.has_issue(IssueCode::ScoreIntegrityMismatch)
        && !verdict.has_issue(IssueCode::JudgeMalformedResponse);
    (band, trusted, verdict.total_score)
}

/// Attempt an exhausted loop returns, among attempts that have a verdict.
pub fn select_attempt(records: &[AttemptRecord], policy: ExhaustionPolicy) -> Option<u32> {
    let judged = records.iter().filter_map(|r| r.verdict.as_ref().map(|v| (r.attempt, v)));
    match policy {
        ExhaustionPolicy::LastAttempt => judged.last().map(|(attempt, _)| attempt),
        // max_by_key keeps the last of equal maxima.
        ExhaustionPolicy::BestScore => judged
            .max_by_key(|(_, v)| best_score_key(v))
            .map(|(attempt, _)| attempt),
    }
}
