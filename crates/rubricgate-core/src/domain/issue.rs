//! Discrete defects reported by structural checks and by the decision step.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable issue codes. The serialized form is the public contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    MissingRequiredField,
    UnclosedMathDelimiter,
    UnclosedInlineMath,
    MissingEscape,
    MismatchedBrackets,
    UnpairedLeftRight,
    TooFewChoices,
    DuplicateChoices,
    AnswerNotInChoices,
    TextTooShort,
    TextTooLong,
    ScoreIntegrityMismatch,
    JudgeMalformedResponse,
}

impl IssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingRequiredField => "missing_required_field",
            Self::UnclosedMathDelimiter => "unclosed_math_delimiter",
            Self::UnclosedInlineMath => "unclosed_inline_math",
            Self::MissingEscape => "missing_escape",
            Self::MismatchedBrackets => "mismatched_brackets",
            Self::UnpairedLeftRight => "unpaired_left_right",
            Self::TooFewChoices => "too_few_choices",
            Self::DuplicateChoices => "duplicate_choices",
            Self::AnswerNotInChoices => "answer_not_in_choices",
            Self::TextTooShort => "text_too_short",
            Self::TextTooLong => "text_too_long",
            Self::ScoreIntegrityMismatch => "score_integrity_mismatch",
            Self::JudgeMalformedResponse => "judge_malformed_response",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One defect: a stable code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub code: IssueCode,
    pub message: String,
    /// Field the issue was found in, when it maps to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Issue {
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
        }
    }

    pub fn in_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "[{}] {}: {}", self.code, field, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_matches_serde() {
        for code in [
            IssueCode::MissingRequiredField,
            IssueCode::AnswerNotInChoices,
            IssueCode::ScoreIntegrityMismatch,
            IssueCode::JudgeMalformedResponse,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_display_includes_field() {
        let issue = Issue::new(IssueCode::TextTooShort, "3 < 10").in_field("question");
        assert_eq!(issue.to_string(), "[text_too_short] question: 3 < 10");
    }
}
