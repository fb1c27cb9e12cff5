use std::sync::Arc;

use async_trait::async_trait;
use rubricgate_core::fakes::ScoreBuilder;
use rubricgate_core::{
    parse_judge_response, AlwaysValidChecker, CachingJudge, CancelSignal, Candidate,
    EngineConfig, EvaluationContext, FinalJudgment, FormattedCandidate, IssueCode, Judge,
    JudgeError, JudgePrompt, Rubric, RubricScore, TerminalState, Validator,
};
use serde_json::json;

fn payload(objective_fit: u32, total: u32, judgment: &str) -> serde_json::Value {
    json!({
        "objective_fit": objective_fit, "difficulty_fit": 15,
        "alignment_total": objective_fit + 15,
        "alignment_rationale": "Matches the objective.",
        "accuracy": 15, "clarity": 15, "answerability": 10, "content_quality_total": 40,
        "content_quality_rationale": "Accurate.",
        "correctness": 15, "pedagogy": 15, "explanation_quality_total": 30,
        "explanation_quality_rationale": "Worked steps.",
        "total_score": total,
        "final_judgment": judgment,
        "confidence": 0.92,
        "suggestions": "Consider a harder distractor."
    })
}

/// Judge replaying raw payloads through the wire parser.
struct RawJudge {
    raw: Vec<String>,
    calls: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl Judge for RawJudge {
    async fn score(
        &self,
        _candidate: &FormattedCandidate,
        _context: &EvaluationContext,
        rubric: &Rubric,
    ) -> Result<RubricScore, JudgeError> {
        let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let raw = &self.raw[n.min(self.raw.len() - 1)];
        parse_judge_response(raw, rubric)
    }
}

#[test]
fn single_string_suggestion_is_accepted() {
    let rubric = Rubric::reference();
    let score = parse_judge_response(&payload(15, 100, "pass").to_string(), &rubric).unwrap();
    assert_eq!(score.suggestions, vec!["Consider a harder distractor.".to_string()]);
    assert_eq!(score.final_judgment, FinalJudgment::Pass);
}

#[test]
fn non_passing_judgment_requires_suggestions() {
    let rubric = Rubric::reference();
    let mut raw = payload(15, 100, "needs revision");
    raw["suggestions"] = json!([]);
    let err = parse_judge_response(&raw.to_string(), &rubric).unwrap_err();
    assert!(matches!(err, JudgeError::MalformedResponse { .. }));
}

#[tokio::test]
async fn malformed_payload_then_valid_payload_is_accepted() {
    let judge = RawJudge {
        raw: vec![
            "I cannot grade this item.".to_string(),
            payload(14, 99, "pass").to_string(),
        ],
        calls: Default::default(),
    };
    let config = EngineConfig::new(Rubric::reference()).with_max_attempts(2);
    let validator = Validator::new(config, Arc::new(judge), Arc::new(AlwaysValidChecker)).unwrap();
    let generator = rubricgate_core::fakes::FixedGenerator::new(Candidate::standalone(
        "short_answer",
        json!({"question": "Name the largest planet.", "answer": "Jupiter"}),
    ));

    let outcome = validator
        .validate(&generator, &EvaluationContext::new(), &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(outcome.state, TerminalState::Accepted);
    let first = outcome.attempts[0].verdict.as_ref().unwrap();
    assert!(first.has_issue(IssueCode::JudgeMalformedResponse));
    assert_eq!(outcome.verdict.total_score, 99);
}

#[tokio::test]
async fn caching_judge_reuses_scores_per_candidate_and_context() {
    let rubric = Rubric::reference();
    let inner = rubricgate_core::fakes::ScriptedJudge::always(Ok(ScoreBuilder::new(&rubric)
        .total(90)
        .build()));
    let judge = CachingJudge::new(inner);
    let formatter = rubricgate_core::CandidateFormatter::new(&rubric);
    let candidate = Candidate::standalone("short_answer", json!({"question": "Q?", "answer": "A"}));

    let easy = EvaluationContext::new().with_difficulty("easy");
    let hard = EvaluationContext::new().with_difficulty("hard");
    let easy_text = formatter.format(&candidate, &easy);
    let hard_text = formatter.format(&candidate, &hard);

    judge.score(&easy_text, &easy, &rubric).await.unwrap();
    judge.score(&easy_text, &easy, &rubric).await.unwrap();
    judge.score(&hard_text, &hard, &rubric).await.unwrap();

    assert_eq!(judge.inner().calls(), 2);
    assert_eq!(judge.len().await, 2);
}

#[test]
fn prompt_lists_every_wire_key() {
    let rubric = Rubric::reference();
    let formatter = rubricgate_core::CandidateFormatter::new(&rubric);
    let candidate = Candidate::standalone("short_answer", json!({"question": "Q?", "answer": "A"}));
    let context = EvaluationContext::new();
    let prompt = JudgePrompt::build(&formatter.format(&candidate, &context), &context, &rubric);

    for (category, criterion) in rubric.criteria() {
        assert!(prompt.user.contains(&criterion.id) || prompt.system.contains(&criterion.id));
        let total_key = category.total_key();
        assert!(prompt.user.contains(&total_key) || prompt.system.contains(&total_key));
    }
}
