//! Rubricgate core library.
//!
//! Quality-control loop around generated educational content: rubric model,
//! candidate formatting, the judge contract, deterministic structural checks,
//! the decision combinator, the bounded retry loop and batch aggregation.
//!
//! The engine owns no transport or storage. Callers inject a
//! [`CandidateGenerator`] and a [`Judge`] and receive a [`ValidationOutcome`]
//! or a typed [`ValidationError`] per candidate.

pub mod batch;
pub mod cancel;
pub mod checks;
pub mod config;
pub mod decision;
pub mod domain;
pub mod fakes;
pub mod format;
pub mod judge;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod telemetry;

pub use batch::{
    percentage, run_batch, BatchItem, BatchJob, BatchOptions, BatchReport, BatchSummary,
    IssueFrequency,
};
pub use cancel::{cancel_pair, CancelSignal, CancelTrigger};
pub use checks::{
    AlwaysValidChecker, AnswerAddressing, CheckConfig, ChoiceRules, RuleCheckResult, RuleChecker,
    StructuralChecker,
};
pub use config::EngineConfig;
pub use decision::{decide, integrity_issues, DecisionPolicy, Disposition, Verdict};
pub use domain::{
    load_rubric, Candidate, CandidateBody, CandidateKind, Category, CategoryConfig, CategoryScore,
    Criterion, CriterionConfig, CriterionScore, ConfigError, EvaluationContext, FinalJudgment,
    GenerationError, Issue, IssueCode, JudgeError, JudgmentThresholds, Result, Rubric,
    RubricConfig, RubricGateError, RubricScore, ValidationError,
};
pub use format::{CandidateFormatter, FormattedCandidate};
pub use judge::{parse_judge_response, CachingJudge, ChatJudge, ChatJudgeConfig, Judge, JudgePrompt};
pub use orchestrator::{
    select_attempt, AttemptPhase, AttemptRecord, CandidateGenerator, ExhaustionPolicy,
    PriorAttemptFeedback, TerminalState, ValidationOutcome, Validator,
};

/// Crate version, as recorded in reports.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
