//! Candidate formatter.
//!
//! Renders a [`Candidate`] plus its [`EvaluationContext`] into the Markdown
//! document a judge reads. Output depends only on its inputs: object keys are
//! emitted in sorted order and nested values use compact JSON, so identical
//! `(candidate, context)` pairs always produce byte-identical text and digest.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::digest::digest_bytes;
use crate::domain::{Candidate, CandidateBody, CandidateKind, EvaluationContext, Rubric};

/// Judge-ready rendering of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedCandidate {
    pub kind: CandidateKind,
    pub type_tag: String,
    pub text: String,
    /// SHA-256 of `text`.
    pub digest: String,
}

/// Stateless renderer; holds only the rubric's category labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFormatter {
    labels: Vec<String>,
}

impl CandidateFormatter {
    pub fn new(rubric: &Rubric) -> Self {
        Self {
            labels: rubric.labels().into_iter().map(str::to_string).collect(),
        }
    }

    pub fn format(&self, candidate: &Candidate, context: &EvaluationContext) -> FormattedCandidate {
        let mut md = format!("# Candidate: {}\n", candidate.type_tag);
        md.push_str(&format!("\nShape: {}\n", kind_label(candidate.kind())));

        md.push_str("\n## Evaluation Context\n\n");
        render_context(&mut md, context);

        match &candidate.body {
            CandidateBody::Standalone { item } => {
                md.push_str("\n## Item\n\n");
                render_fields(&mut md, item);
            }
            CandidateBody::WithPassage { passage, items } => {
                // Shared context is rendered once, ahead of every item.
                md.push_str("\n## Shared Passage\n\n");
                match passage {
                    Value::String(text) => {
                        md.push_str(text.trim_end());
                        md.push('\n');
                    }
                    other => render_fields(&mut md, other),
                }
                for (idx, item) in items.iter().enumerate() {
                    md.push_str(&format!("\n## Item {} of {}\n\n", idx + 1, items.len()));
                    render_fields(&mut md, item);
                }
            }
        }

        md.push_str("\n## Assess Against\n\n");
        for label in &self.labels {
            md.push_str(&format!("- {label}\n"));
        }

        FormattedCandidate {
            kind: candidate.kind(),
            type_tag: candidate.type_tag.clone(),
            digest: digest_bytes(md.as_bytes()),
            text: md,
        }
    }
}

fn kind_label(kind: CandidateKind) -> &'static str {
    match kind {
        CandidateKind::Standalone => "standalone item",
        CandidateKind::WithPassage => "items sharing one passage",
    }
}

fn render_context(md: &mut String, context: &EvaluationContext) {
    let unspecified = "unspecified";
    md.push_str(&format!(
        "- difficulty: {}\n",
        context.difficulty.as_deref().unwrap_or(unspecified)
    ));
    md.push_str(&format!(
        "- proficiency band: {}\n",
        context.proficiency_band.as_deref().unwrap_or(unspecified)
    ));
    if context.domain_tags.is_empty() {
        md.push_str(&format!("- domain tags: {unspecified}\n"));
    } else {
        md.push_str(&format!("- domain tags: {}\n", context.domain_tags.join(", ")));
    }
}

fn render_fields(md: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                if let Some(field) = map.get(key) {
                    render_field(md, key, field);
                }
            }
        }
        other => md.push_str(&format!("{}\n", scalar(other))),
    }
}

fn render_field(md: &mut String, key: &str, value: &Value) {
    match value {
        Value::Array(items) => {
            md.push_str(&format!("**{key}**:\n"));
            for (idx, item) in items.iter().enumerate() {
                md.push_str(&format!("  {}. {}\n", letter(idx), scalar(item)));
            }
        }
        other => md.push_str(&format!("**{key}**: {}\n", scalar(other))),
    }
}

/// Strings verbatim, everything else as compact JSON.
fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `A`..`Z`, then numeric labels.
fn letter(idx: usize) -> String {
    match u8::try_from(idx) {
        Ok(i) if i < 26 => char::from(b'A' + i).to_string(),
        _ => (idx + 1).to_string(),
    }
}
