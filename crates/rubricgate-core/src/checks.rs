//! Deterministic structural checks.
//!
//! [`RuleChecker`] runs a fixed pipeline of independent predicates over every
//! item of a candidate and unions their issues; nothing short-circuits, so a
//! caller sees every defect of a candidate at once:
//!
//! 1. required fields are present and non-empty after trimming
//! 2. free-text fields contain no known-bad notation
//! 3. multiple-choice items have enough distinct choices and a keyed answer
//!    that is one of them
//! 4. the primary text field is within the configured length bounds
//!
//! Notation rules assume LaTeX-style markup in which a literal dollar sign is
//! written `\$`.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Candidate, ConfigError, Issue, IssueCode};

/// Control sequences that take a braced argument and are commonly emitted
/// without their leading backslash.
const BRACED_COMMANDS: &str =
    "frac|dfrac|tfrac|sqrt|binom|text|textbf|mathrm|mathbf|overline|underline|vec|hat|bar";

/// How the keyed answer refers to a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerAddressing {
    /// Zero-based index, or a single letter `A`, `B`, ...
    Index,
    /// The text of the correct choice.
    Value,
}

/// Multiple-choice rules. They apply to items whose candidate type tag is in
/// `item_types`, and to any item carrying `choices_field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoiceRules {
    pub choices_field: String,
    pub answer_field: String,
    pub addressing: AnswerAddressing,
    pub item_types: Vec<String>,
    pub min_choices: usize,
}

impl Default for ChoiceRules {
    fn default() -> Self {
        Self {
            choices_field: "choices".to_string(),
            answer_field: "answer".to_string(),
            addressing: AnswerAddressing::Value,
            item_types: vec!["multiple_choice".to_string()],
            min_choices: 2,
        }
    }
}

/// Structural check configuration (`[checks]` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub required_fields: Vec<String>,
    /// Fields scanned for notation defects. Arrays are scanned element-wise.
    pub text_fields: Vec<String>,
    pub primary_text_field: String,
    /// Inclusive bounds, in characters, on the trimmed primary text.
    pub min_length: usize,
    pub max_length: usize,
    pub choices: Option<ChoiceRules>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            required_fields: vec!["question".to_string(), "answer".to_string()],
            text_fields: vec![
                "question".to_string(),
                "choices".to_string(),
                "explanation".to_string(),
            ],
            primary_text_field: "question".to_string(),
            min_length: 10,
            max_length: 2000,
            choices: Some(ChoiceRules::default()),
        }
    }
}

impl CheckConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.primary_text_field.trim().is_empty() {
            return Err(ConfigError::InvalidChecks(
                "primary_text_field must not be empty".to_string(),
            ));
        }
        if self.max_length == 0 || self.min_length > self.max_length {
            return Err(ConfigError::InvalidChecks(format!(
                "length bounds must satisfy min <= max and max > 0 (min={}, max={})",
                self.min_length, self.max_length
            )));
        }
        if let Some(field) = self
            .required_fields
            .iter()
            .chain(self.text_fields.iter())
            .find(|f| f.trim().is_empty())
        {
            return Err(ConfigError::InvalidChecks(format!(
                "field names must not be empty (got {field:?})"
            )));
        }
        if let Some(rules) = &self.choices {
            if rules.min_choices < 2 {
                return Err(ConfigError::InvalidChecks(format!(
                    "min_choices must be at least 2, got {}",
                    rules.min_choices
                )));
            }
            if rules.choices_field.trim().is_empty() || rules.answer_field.trim().is_empty() {
                return Err(ConfigError::InvalidChecks(
                    "choices_field and answer_field must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Outcome of the structural checks for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCheckResult {
    pub issues: Vec<Issue>,
    pub structurally_valid: bool,
}

impl RuleCheckResult {
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        Self {
            structurally_valid: issues.is_empty(),
            issues,
        }
    }

    pub fn valid() -> Self {
        Self::from_issues(Vec::new())
    }

    pub fn has(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

/// Injectable structural checker.
pub trait StructuralChecker: Send + Sync {
    fn check(&self, candidate: &Candidate) -> RuleCheckResult;
}

/// Checker for domains without deterministic checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysValidChecker;

impl StructuralChecker for AlwaysValidChecker {
    fn check(&self, _candidate: &Candidate) -> RuleCheckResult {
        RuleCheckResult::valid()
    }
}

/// Configured rule pipeline.
#[derive(Debug, Clone)]
pub struct RuleChecker {
    config: CheckConfig,
    missing_escape: Regex,
    left: Regex,
    right: Regex,
}

impl RuleChecker {
    pub fn new(config: CheckConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| ConfigError::InvalidChecks(e.to_string()))
        };
        Ok(Self {
            missing_escape: compile(&format!(r"(?:^|[^\\A-Za-z])({BRACED_COMMANDS})\{{"))?,
            left: compile(r"\\left\b")?,
            right: compile(r"\\right\b")?,
            config,
        })
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    fn check_item(&self, type_tag: &str, item: &Value, prefix: &str, issues: &mut Vec<Issue>) {
        let label = |field: &str| format!("{prefix}{field}");

        for field in &self.config.required_fields {
            if !is_present(item.get(field)) {
                issues.push(
                    Issue::new(
                        IssueCode::MissingRequiredField,
                        format!("required field '{field}' is missing or empty"),
                    )
                    .in_field(label(field)),
                );
            }
        }

        for field in &self.config.text_fields {
            for text in texts_of(item.get(field)) {
                self.scan_notation(text, &label(field), issues);
            }
        }

        if let Some(rules) = &self.config.choices {
            let applies = item.get(&rules.choices_field).is_some()
                || rules.item_types.iter().any(|t| t == type_tag);
            if applies {
                check_choices(rules, item, prefix, issues);
            }
        }

        let primary = &self.config.primary_text_field;
        if let Some(text) = item.get(primary).and_then(Value::as_str) {
            let len = text.trim().chars().count();
            if len < self.config.min_length {
                issues.push(
                    Issue::new(
                        IssueCode::TextTooShort,
                        format!("{len} characters, minimum is {}", self.config.min_length),
                    )
                    .in_field(label(primary)),
                );
            } else if len > self.config.max_length {
                issues.push(
                    Issue::new(
                        IssueCode::TextTooLong,
                        format!("{len} characters, maximum is {}", self.config.max_length),
                    )
                    .in_field(label(primary)),
                );
            }
        }
    }

    fn scan_notation(&self, text: &str, field: &str, issues: &mut Vec<Issue>) {
        let unescaped = text.replace(r"\$", "");
        if unescaped.matches('$').count() % 2 != 0 {
            issues.push(
                Issue::new(
                    IssueCode::UnclosedMathDelimiter,
                    "odd number of unescaped '$' delimiters",
                )
                .in_field(field),
            );
        }

        for (open, close) in [(r"\(", r"\)"), (r"\[", r"\]")] {
            let opened = text.matches(open).count();
            let closed = text.matches(close).count();
            if opened != closed {
                issues.push(
                    Issue::new(
                        IssueCode::UnclosedInlineMath,
                        format!("{opened} '{open}' against {closed} '{close}'"),
                    )
                    .in_field(field),
                );
            }
        }

        for caps in self.missing_escape.captures_iter(text) {
            if let Some(cmd) = caps.get(1) {
                issues.push(
                    Issue::new(
                        IssueCode::MissingEscape,
                        format!("'{0}{{' should be '\\{0}{{'", cmd.as_str()),
                    )
                    .in_field(field),
                );
            }
        }

        let lefts = self.left.find_iter(text).count();
        let rights = self.right.find_iter(text).count();
        if lefts != rights {
            issues.push(
                Issue::new(
                    IssueCode::UnpairedLeftRight,
                    format!("{lefts} '\\left' against {rights} '\\right'"),
                )
                .in_field(field),
            );
        }

        if let Some(detail) = bracket_mismatch(text) {
            issues.push(Issue::new(IssueCode::MismatchedBrackets, detail).in_field(field));
        }
    }
}

impl StructuralChecker for RuleChecker {
    fn check(&self, candidate: &Candidate) -> RuleCheckResult {
        let mut issues = Vec::new();

        match candidate.passage() {
            None => {
                if let Some(item) = candidate.items().first() {
                    self.check_item(&candidate.type_tag, item, "", &mut issues);
                }
            }
            Some(passage) => {
                if !is_present(Some(passage)) {
                    issues.push(
                        Issue::new(IssueCode::MissingRequiredField, "shared passage is empty")
                            .in_field("passage"),
                    );
                }
                for text in passage_texts(passage) {
                    self.scan_notation(text, "passage", &mut issues);
                }
                let items = candidate.items();
                if items.is_empty() {
                    issues.push(
                        Issue::new(
                            IssueCode::MissingRequiredField,
                            "passage bundle contains no items",
                        )
                        .in_field("items"),
                    );
                }
                for (idx, item) in items.into_iter().enumerate() {
                    let prefix = format!("items[{idx}].");
                    self.check_item(&candidate.type_tag, item, &prefix, &mut issues);
                }
            }
        }

        tracing::debug!(
            type_tag = %candidate.type_tag,
            issues = issues.len(),
            "structural checks completed"
        );
        RuleCheckResult::from_issues(issues)
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(_) => true,
    }
}

fn texts_of(value: Option<&Value>) -> Vec<&str> {
    match value {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.as_str()),
                Value::Object(o) => o.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn passage_texts(passage: &Value) -> Vec<&str> {
    match passage {
        Value::String(s) => vec![s.as_str()],
        Value::Object(o) => o.values().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Text a choice is compared by.
fn choice_text(choice: &Value) -> String {
    match choice {
        Value::String(s) => s.trim().to_string(),
        Value::Object(o) => match o.get("text").and_then(Value::as_str) {
            Some(text) => text.trim().to_string(),
            None => choice.to_string(),
        },
        other => other.to_string(),
    }
}

fn answer_index(answer: &Value) -> Option<usize> {
    match answer {
        Value::Number(n) => n.as_u64().and_then(|i| usize::try_from(i).ok()),
        Value::String(s) => {
            let s = s.trim();
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => {
                    Some((c.to_ascii_uppercase() as u8 - b'A') as usize)
                }
                _ => s.parse::<usize>().ok(),
            }
        }
        _ => None,
    }
}

fn check_choices(rules: &ChoiceRules, item: &Value, prefix: &str, issues: &mut Vec<Issue>) {
    let choices_label = format!("{prefix}{}", rules.choices_field);
    let answer_label = format!("{prefix}{}", rules.answer_field);

    let choices: Vec<String> = match item.get(&rules.choices_field) {
        Some(Value::Array(items)) => items.iter().map(choice_text).collect(),
        _ => Vec::new(),
    };

    if choices.len() < rules.min_choices {
        issues.push(
            Issue::new(
                IssueCode::TooFewChoices,
                format!(
                    "{} choice(s), at least {} required",
                    choices.len(),
                    rules.min_choices
                ),
            )
            .in_field(choices_label.clone()),
        );
    }

    let mut seen = HashSet::new();
    let duplicates: Vec<&str> = choices
        .iter()
        .filter(|c| !seen.insert(c.to_lowercase()))
        .map(String::as_str)
        .collect();
    if !duplicates.is_empty() {
        issues.push(
            Issue::new(
                IssueCode::DuplicateChoices,
                format!("duplicate choice(s): {}", duplicates.join(", ")),
            )
            .in_field(choices_label),
        );
    }

    let Some(answer) = item.get(&rules.answer_field).filter(|a| is_present(Some(*a))) else {
        // Absence is reported by the required-field predicate when configured.
        return;
    };

    let member = match rules.addressing {
        AnswerAddressing::Index => answer_index(answer).is_some_and(|i| i < choices.len()),
        AnswerAddressing::Value => {
            let wanted = choice_text(answer);
            choices.iter().any(|c| *c == wanted)
        }
    };
    if !member {
        issues.push(
            Issue::new(
                IssueCode::AnswerNotInChoices,
                format!("keyed answer {answer} is not among the {} choices", choices.len()),
            )
            .in_field(answer_label),
        );
    }
}

/// Balance check: braces everywhere, parentheses and square brackets inside
/// `$...$` math. Escaped characters are skipped.
fn bracket_mismatch(text: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_math = false;
    let mut escaped = false;

    for ch in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '$' => in_math = !in_math,
            '{' => stack.push('}'),
            '(' if in_math => stack.push(')'),
            '[' if in_math => stack.push(']'),
            '}' | ')' | ']' if ch == '}' || in_math => match stack.pop() {
                Some(expected) if expected == ch => {}
                Some(expected) => return Some(format!("found '{ch}' where '{expected}' was expected")),
                None => return Some(format!("unmatched closing '{ch}'")),
            },
            _ => {}
        }
    }

    stack
        .last()
        .map(|expected| format!("{} unclosed bracket(s), expected '{expected}'", stack.len()))
}
