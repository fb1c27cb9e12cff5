//! Decision combinator.
//!
//! Merges a judge [`RubricScore`] with a [`RuleCheckResult`] into one
//! [`Verdict`]. The judge's arithmetic is never trusted: totals are recomputed
//! from the criteria, and any disagreement forces `Fail`.

use serde::{Deserialize, Serialize};

use crate::checks::RuleCheckResult;
use crate::domain::{
    ConfigError, FinalJudgment, Issue, IssueCode, JudgmentThresholds, Rubric, RubricScore,
};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Auto-approval policy plus the rubric's judgment bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionPolicy {
    pub thresholds: JudgmentThresholds,
    /// Minimum recomputed total for auto-approval.
    pub auto_approve_min_score: u32,
    /// Minimum judge confidence for auto-approval, in `[0, 1]`.
    pub auto_approve_min_confidence: f64,
}

impl DecisionPolicy {
    /// Default policy for a rubric: min score at the pass threshold, min
    /// confidence 0.8.
    pub fn for_rubric(rubric: &Rubric) -> Self {
        Self {
            thresholds: rubric.thresholds(),
            auto_approve_min_score: rubric.thresholds().pass,
            auto_approve_min_confidence: 0.8,
        }
    }

    pub fn validate(&self, rubric: &Rubric) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.auto_approve_min_confidence) {
            return Err(ConfigError::InvalidPolicy(format!(
                "auto_approve_min_confidence must be in [0, 1], got {}",
                self.auto_approve_min_confidence
            )));
        }
        if self.auto_approve_min_score > rubric.total_ceiling() {
            return Err(ConfigError::InvalidPolicy(format!(
                "auto_approve_min_score {} exceeds the rubric total of {}",
                self.auto_approve_min_score,
                rubric.total_ceiling()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Coarse routing of a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    AutoApprove,
    NeedsReview,
    Reject,
}

/// The engine's own decision for one attempt. Always derived, never stored
/// independently of its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub auto_approve: bool,
    pub judgment: FinalJudgment,
    /// Clamped to `[0, 1]`; zero for structurally invalid candidates.
    pub confidence: f64,
    /// Rule issues followed by any integrity issues.
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    /// Total recomputed from criteria scores.
    pub total_score: u32,
}

impl Verdict {
    pub fn disposition(&self) -> Disposition {
        if self.auto_approve {
            Disposition::AutoApprove
        } else if self.judgment == FinalJudgment::Fail {
            Disposition::Reject
        } else {
            Disposition::NeedsReview
        }
    }

    /// Verdict for an attempt whose judge payload could not be parsed.
    pub fn malformed_judge_response(reason: &str, rule: &RuleCheckResult) -> Self {
        let mut issues = rule.issues.clone();
        issues.push(Issue::new(IssueCode::JudgeMalformedResponse, reason));
        Self {
            auto_approve: false,
            judgment: FinalJudgment::Fail,
            confidence: 0.0,
            issues,
            suggestions: Vec::new(),
            total_score: 0,
        }
    }

    pub fn has_issue(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

// ---------------------------------------------------------------------------
// Combinator
// ---------------------------------------------------------------------------

fn mismatch(field: impl Into<String>, message: String) -> Issue {
    Issue::new(IssueCode::ScoreIntegrityMismatch, message).in_field(field)
}

/// Integrity violations in a judge payload, checked against `rubric`.
/// Empty when the payload has the rubric's shape and its arithmetic holds.
///
/// Ceilings reported alongside the scores are ignored; only the rubric's
/// ceilings count.
pub fn integrity_issues(score: &RubricScore, rubric: &Rubric) -> Vec<Issue> {
    let mut issues = Vec::new();

    for (cat, crit) in rubric.criteria() {
        let entries: Vec<_> = score
            .criteria
            .iter()
            .filter(|c| c.criterion_id == crit.id)
            .collect();
        match entries.len() {
            0 => issues.push(mismatch(&crit.id, "criterion was not scored".to_string())),
            1 => {}
            n => issues.push(mismatch(&crit.id, format!("criterion was scored {n} times"))),
        }
        for entry in entries {
            if entry.category_id != cat.id {
                issues.push(mismatch(
                    &crit.id,
                    format!(
                        "criterion scored under category '{}' but belongs to '{}'",
                        entry.category_id, cat.id
                    ),
                ));
            }
            if entry.score > crit.ceiling {
                issues.push(mismatch(
                    &crit.id,
                    format!("criterion score {} exceeds ceiling {}", entry.score, crit.ceiling),
                ));
            }
        }
    }

    let known_criterion = |id: &str| rubric.criteria().any(|(_, crit)| crit.id == id);
    for entry in score.criteria.iter().filter(|c| !known_criterion(&c.criterion_id)) {
        issues.push(mismatch(
            &entry.criterion_id,
            "criterion is not part of the rubric".to_string(),
        ));
    }

    for cat in rubric.categories() {
        match score.categories.iter().filter(|c| c.category_id == cat.id).count() {
            0 => issues.push(mismatch(&cat.id, "category total was not reported".to_string())),
            1 => {}
            n => issues.push(mismatch(&cat.id, format!("category was reported {n} times"))),
        }
    }

    for cat in &score.categories {
        if rubric.category(&cat.category_id).is_none() {
            issues.push(mismatch(
                &cat.category_id,
                "category is not part of the rubric".to_string(),
            ));
            continue;
        }
        let recomputed = score.recomputed_category_total(&cat.category_id);
        if recomputed != u64::from(cat.reported_total) {
            issues.push(mismatch(
                &cat.category_id,
                format!(
                    "reported category total {} but criteria sum to {recomputed}",
                    cat.reported_total
                ),
            ));
        }
    }

    let reported_categories = score.reported_category_sum();
    let recomputed = score.recomputed_total();
    let reported = u64::from(score.total_score);
    if reported != recomputed || reported != reported_categories {
        issues.push(mismatch(
            "total_score",
            format!(
                "reported total {reported} but criteria sum to {recomputed} and categories to {reported_categories}"
            ),
        ));
    }

    issues
}

/// Combine a judge score and rule-check result under `policy`.
///
/// `auto_approve` is a conjunction: Pass, structurally valid, no issues at
/// all, confidence and recomputed total at or above the policy minimums.
pub fn decide(
    score: &RubricScore,
    rule: &RuleCheckResult,
    rubric: &Rubric,
    policy: &DecisionPolicy,
) -> Verdict {
    let integrity = integrity_issues(score, rubric);
    // A clean payload is bounded by the rubric total, so this only
    // saturates for payloads that already failed integrity.
    let total = u32::try_from(score.recomputed_total()).unwrap_or(u32::MAX);

    let judgment = if integrity.is_empty() {
        policy.thresholds.classify(total)
    } else {
        FinalJudgment::Fail
    };

    let reported = if score.confidence.is_nan() {
        0.0
    } else {
        score.confidence.clamp(0.0, 1.0)
    };
    let confidence = if rule.structurally_valid { reported } else { 0.0 };

    let mut issues = rule.issues.clone();
    issues.extend(integrity);

    let auto_approve = judgment == FinalJudgment::Pass
        && rule.structurally_valid
        && rule.issues.is_empty()
        && reported >= policy.auto_approve_min_confidence
        && total >= policy.auto_approve_min_score;

    Verdict {
        auto_approve,
        judgment,
        confidence,
        issues,
        suggestions: score.suggestions.clone(),
        total_score: total,
    }
}
