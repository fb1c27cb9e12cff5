//! In-memory test doubles (testing only).
//!
//! Scripted judges and generators that satisfy the engine's injected
//! contracts without any network access, plus [`ScoreBuilder`] for building
//! consistent or deliberately inconsistent [`RubricScore`]s.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

pub use crate::checks::AlwaysValidChecker;
use crate::domain::{
    Candidate, CategoryScore, CriterionScore, EvaluationContext, FinalJudgment, GenerationError,
    JudgeError, JudgmentThresholds, Rubric, RubricScore,
};
use crate::format::FormattedCandidate;
use crate::judge::Judge;
use crate::orchestrator::{CandidateGenerator, PriorAttemptFeedback};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pops the next scripted item; the last one repeats once the script runs out.
fn next_scripted<T: Clone>(script: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut script = lock(script);
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

// ---------------------------------------------------------------------------
// ScriptedJudge
// ---------------------------------------------------------------------------

/// Judge answering from a script, in call order.
#[derive(Debug, Default)]
pub struct ScriptedJudge {
    script: Mutex<VecDeque<Result<RubricScore, JudgeError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn new(script: Vec<Result<RubricScore, JudgeError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(response: Result<RubricScore, JudgeError>) -> Self {
        Self::new(vec![response])
    }

    /// Sleep (on the tokio clock) before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn score(
        &self,
        _candidate: &FormattedCandidate,
        _context: &EvaluationContext,
        _rubric: &Rubric,
    ) -> Result<RubricScore, JudgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next_scripted(&self.script)
            .unwrap_or_else(|| Err(JudgeError::unavailable("judge script is empty")))
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Generator that always returns the same candidate.
#[derive(Debug)]
pub struct FixedGenerator {
    candidate: Candidate,
    calls: AtomicUsize,
}

impl FixedGenerator {
    pub fn new(candidate: Candidate) -> Self {
        Self {
            candidate,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateGenerator for FixedGenerator {
    async fn generate(
        &self,
        _feedback: Option<&PriorAttemptFeedback>,
    ) -> Result<Candidate, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.candidate.clone())
    }
}

/// Generator answering from a script and recording the feedback it was given.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<Candidate, GenerationError>>>,
    feedback: Mutex<Vec<Option<PriorAttemptFeedback>>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<Candidate, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            feedback: Mutex::new(Vec::new()),
        }
    }

    /// Feedback received by each call, in order.
    pub fn feedback_log(&self) -> Vec<Option<PriorAttemptFeedback>> {
        lock(&self.feedback).clone()
    }

    pub fn calls(&self) -> usize {
        lock(&self.feedback).len()
    }
}

#[async_trait]
impl CandidateGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        feedback: Option<&PriorAttemptFeedback>,
    ) -> Result<Candidate, GenerationError> {
        lock(&self.feedback).push(feedback.cloned());
        next_scripted(&self.script)
            .unwrap_or_else(|| Err(GenerationError::failed("generator script is empty")))
    }
}

// ---------------------------------------------------------------------------
// ScoreBuilder
// ---------------------------------------------------------------------------

/// Builds a [`RubricScore`] shaped like `rubric`.
///
/// Totals are computed from the criteria unless overridden, so the default
/// build is internally consistent; the judgment label defaults to the
/// rubric's band for the total.
#[derive(Debug, Clone)]
pub struct ScoreBuilder {
    thresholds: JudgmentThresholds,
    // (category id, criterion id, ceiling, score) in rubric order.
    criteria: Vec<(String, String, u32, u32)>,
    category_ids: Vec<String>,
    category_overrides: HashMap<String, u32>,
    total_override: Option<u32>,
    judgment: Option<FinalJudgment>,
    confidence: f64,
    suggestions: Option<Vec<String>>,
}

impl ScoreBuilder {
    /// Every criterion at its ceiling, confidence 0.9.
    pub fn new(rubric: &Rubric) -> Self {
        Self {
            thresholds: rubric.thresholds(),
            criteria: rubric
                .criteria()
                .map(|(cat, crit)| (cat.id.clone(), crit.id.clone(), crit.ceiling, crit.ceiling))
                .collect(),
            category_ids: rubric.categories().iter().map(|c| c.id.clone()).collect(),
            category_overrides: HashMap::new(),
            total_override: None,
            judgment: None,
            confidence: 0.9,
            suggestions: None,
        }
    }

    /// Spread `total` over the criteria in rubric order, filling each to its
    /// ceiling before moving on.
    pub fn total(mut self, total: u32) -> Self {
        let mut remaining = total;
        for (_, _, ceiling, score) in &mut self.criteria {
            *score = remaining.min(*ceiling);
            remaining -= *score;
        }
        self
    }

    pub fn criterion(mut self, criterion_id: &str, score: u32) -> Self {
        if let Some(entry) = self.criteria.iter_mut().find(|c| c.1 == criterion_id) {
            entry.3 = score;
        }
        self
    }

    /// Report a category total that may disagree with its criteria.
    pub fn category_total(mut self, category_id: &str, reported: u32) -> Self {
        self.category_overrides.insert(category_id.to_string(), reported);
        self
    }

    /// Report an overall total that may disagree with the categories.
    pub fn reported_total(mut self, reported: u32) -> Self {
        self.total_override = Some(reported);
        self
    }

    pub fn judgment(mut self, judgment: FinalJudgment) -> Self {
        self.judgment = Some(judgment);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = Some(suggestions);
        self
    }

    pub fn build(self) -> RubricScore {
        let criteria: Vec<CriterionScore> = self
            .criteria
            .iter()
            .map(|(cat, crit, ceiling, score)| CriterionScore {
                category_id: cat.clone(),
                criterion_id: crit.clone(),
                score: *score,
                ceiling: *ceiling,
            })
            .collect();

        let categories: Vec<CategoryScore> = self
            .category_ids
            .iter()
            .map(|id| {
                let recomputed = criteria
                    .iter()
                    .filter(|c| &c.category_id == id)
                    .fold(0u32, |acc, c| acc.saturating_add(c.score));
                CategoryScore {
                    category_id: id.clone(),
                    reported_total: self.category_overrides.get(id).copied().unwrap_or(recomputed),
                    rationale: format!("Scored {id}."),
                }
            })
            .collect();

        let recomputed = criteria.iter().fold(0u32, |acc, c| acc.saturating_add(c.score));
        let final_judgment = self
            .judgment
            .unwrap_or_else(|| self.thresholds.classify(recomputed));
        let suggestions = self.suggestions.unwrap_or_else(|| {
            if final_judgment == FinalJudgment::Pass {
                Vec::new()
            } else {
                vec!["Strengthen the weakest criterion.".to_string()]
            }
        });

        RubricScore {
            criteria,
            categories,
            total_score: self.total_override.unwrap_or(recomputed),
            final_judgment,
            confidence: self.confidence,
            suggestions,
        }
    }
}
