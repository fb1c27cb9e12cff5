//! Domain models for the validation engine.
//!
//! - `Rubric`: categories, criteria, ceilings and judgment thresholds
//! - `Candidate` / `EvaluationContext`: what is scored, and for whom
//! - `RubricScore`: what the judge reported
//! - `Issue`: discrete defects with stable codes

pub mod candidate;
pub mod digest;
pub mod error;
pub mod issue;
pub mod rubric;
pub mod score;

pub use candidate::{Candidate, CandidateBody, CandidateKind, EvaluationContext};
pub use error::{
    ConfigError, GenerationError, JudgeError, Result, RubricGateError, ValidationError,
};
pub use issue::{Issue, IssueCode};
pub use rubric::{
    load_rubric, Category, CategoryConfig, Criterion, CriterionConfig, JudgmentThresholds,
    Rubric, RubricConfig,
};
pub use score::{CategoryScore, CriterionScore, FinalJudgment, RubricScore};
