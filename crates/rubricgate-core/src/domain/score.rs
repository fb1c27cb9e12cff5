//! Judge-produced rubric scores.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Judgment label, as reported by the judge or derived by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalJudgment {
    Pass,
    NeedsRevision,
    Fail,
}

impl FinalJudgment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::NeedsRevision => "needs_revision",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for FinalJudgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FinalJudgment {
    type Err = String;

    /// Accepts `pass`, `needs_revision`, `fail` in any case, with spaces or
    /// hyphens in place of underscores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        match normalized.as_str() {
            "pass" | "passed" => Ok(Self::Pass),
            "needs_revision" | "revise" | "needs_revisions" => Ok(Self::NeedsRevision),
            "fail" | "failed" => Ok(Self::Fail),
            _ => Err(format!("unknown judgment label '{s}'")),
        }
    }
}

/// Score of one criterion. The ceiling is copied from the rubric at parse
/// time so the score can be range-checked without the rubric at hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub category_id: String,
    pub criterion_id: String,
    pub score: u32,
    pub ceiling: u32,
}

/// Judge-reported total and rationale of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category_id: String,
    pub reported_total: u32,
    pub rationale: String,
}

/// Full rubric score for one candidate.
///
/// Reported totals are kept exactly as the judge sent them; use
/// [`RubricScore::recomputed_category_total`] and
/// [`RubricScore::recomputed_total`] for trusted arithmetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricScore {
    pub criteria: Vec<CriterionScore>,
    pub categories: Vec<CategoryScore>,
    pub total_score: u32,
    pub final_judgment: FinalJudgment,
    /// Judge self-reported confidence; not clamped here.
    pub confidence: f64,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl RubricScore {
    /// Sum of the criterion scores belonging to `category_id`.
    ///
    /// Widened to `u64` so that judge-supplied scores cannot overflow.
    pub fn recomputed_category_total(&self, category_id: &str) -> u64 {
        self.criteria
            .iter()
            .filter(|c| c.category_id == category_id)
            .map(|c| u64::from(c.score))
            .sum()
    }

    /// Sum of every criterion score, widened like
    /// [`RubricScore::recomputed_category_total`].
    pub fn recomputed_total(&self) -> u64 {
        self.criteria.iter().map(|c| u64::from(c.score)).sum()
    }

    /// Sum of the judge-reported category totals.
    pub fn reported_category_sum(&self) -> u64 {
        self.categories.iter().map(|c| u64::from(c.reported_total)).sum()
    }

    pub fn category(&self, category_id: &str) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.category_id == category_id)
    }

    pub fn criterion(&self, criterion_id: &str) -> Option<&CriterionScore> {
        self.criteria.iter().find(|c| c.criterion_id == criterion_id)
    }
}
