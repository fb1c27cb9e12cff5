use rubricgate_core::{
    AnswerAddressing, Candidate, CheckConfig, ChoiceRules, IssueCode, RuleChecker,
    StructuralChecker,
};
use serde_json::json;

fn checker() -> RuleChecker {
    RuleChecker::new(CheckConfig::default()).unwrap()
}

#[test]
fn answer_outside_choices_is_reported() {
    let candidate = Candidate::standalone(
        "multiple_choice",
        json!({
            "question": "Which planet is largest?",
            "choices": ["Mars", "Venus", "Jupiter"],
            "answer": "Saturn"
        }),
    );
    let result = checker().check(&candidate);
    assert!(!result.structurally_valid);
    assert!(result.has(IssueCode::AnswerNotInChoices));
}

#[test]
fn clean_multiple_choice_item_passes() {
    let candidate = Candidate::standalone(
        "multiple_choice",
        json!({
            "question": "Evaluate $\\frac{1}{2} + \\frac{1}{2}$.",
            "choices": ["$0$", "$1$", "$2$"],
            "answer": "$1$"
        }),
    );
    let result = checker().check(&candidate);
    assert!(result.structurally_valid, "{:?}", result.issues);
}

#[test]
fn index_addressing_accepts_letters() {
    let config = CheckConfig {
        choices: Some(ChoiceRules {
            addressing: AnswerAddressing::Index,
            ..ChoiceRules::default()
        }),
        ..CheckConfig::default()
    };
    let checker = RuleChecker::new(config).unwrap();
    let candidate = Candidate::standalone(
        "multiple_choice",
        json!({
            "question": "Which planet is largest?",
            "choices": ["Mars", "Jupiter"],
            "answer": "B"
        }),
    );
    assert!(checker.check(&candidate).structurally_valid);
}

#[test]
fn every_defect_is_reported_at_once() {
    let candidate = Candidate::standalone(
        "multiple_choice",
        json!({
            "question": "Solve $x",
            "choices": ["1"],
            "explanation": "Use \\left( x"
        }),
    );
    let result = checker().check(&candidate);
    let codes: Vec<IssueCode> = result.issues.iter().map(|i| i.code).collect();
    for expected in [
        IssueCode::MissingRequiredField,
        IssueCode::UnclosedMathDelimiter,
        IssueCode::UnpairedLeftRight,
        IssueCode::TooFewChoices,
        IssueCode::TextTooShort,
    ] {
        assert!(codes.contains(&expected), "missing {expected:?} in {codes:?}");
    }
}

#[test]
fn passage_items_are_checked_individually() {
    let candidate = Candidate::with_passage(
        "reading",
        json!("The Amazon is the largest rainforest on Earth."),
        vec![
            json!({"question": "What is the Amazon?", "answer": "A rainforest"}),
            json!({"question": "Where is the Amazon?"}),
        ],
    );
    let result = checker().check(&candidate);
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].code, IssueCode::MissingRequiredField);
    assert_eq!(result.issues[0].field.as_deref(), Some("items[1].answer"));
}
