//! Candidates and their evaluation context.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::digest::digest_of;

/// Shape discriminator for candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// A single self-contained item.
    Standalone,
    /// One shared passage followed by the items that depend on it.
    WithPassage,
}

/// Generated content, in one of the two supported shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateBody {
    Standalone { item: Value },
    WithPassage { passage: Value, items: Vec<Value> },
}

/// A generated content object plus the caller's type tag. The engine only
/// reads candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Caller-defined item type, e.g. `multiple_choice` or `short_answer`.
    pub type_tag: String,
    #[serde(flatten)]
    pub body: CandidateBody,
}

impl Candidate {
    pub fn standalone(type_tag: impl Into<String>, item: Value) -> Self {
        Self {
            type_tag: type_tag.into(),
            body: CandidateBody::Standalone { item },
        }
    }

    pub fn with_passage(type_tag: impl Into<String>, passage: Value, items: Vec<Value>) -> Self {
        Self {
            type_tag: type_tag.into(),
            body: CandidateBody::WithPassage { passage, items },
        }
    }

    pub fn kind(&self) -> CandidateKind {
        match self.body {
            CandidateBody::Standalone { .. } => CandidateKind::Standalone,
            CandidateBody::WithPassage { .. } => CandidateKind::WithPassage,
        }
    }

    pub fn passage(&self) -> Option<&Value> {
        match &self.body {
            CandidateBody::Standalone { .. } => None,
            CandidateBody::WithPassage { passage, .. } => Some(passage),
        }
    }

    /// Items in order; a standalone candidate has exactly one.
    pub fn items(&self) -> Vec<&Value> {
        match &self.body {
            CandidateBody::Standalone { item } => vec![item],
            CandidateBody::WithPassage { items, .. } => items.iter().collect(),
        }
    }

    /// Content digest, independent of JSON key order.
    pub fn digest(&self) -> serde_json::Result<String> {
        digest_of(self)
    }
}

/// Learner and target metadata relevant to scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationContext {
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub proficiency_band: Option<String>,
    #[serde(default)]
    pub domain_tags: Vec<String>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = Some(difficulty.into());
        self
    }

    pub fn with_proficiency_band(mut self, band: impl Into<String>) -> Self {
        self.proficiency_band = Some(band.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.domain_tags.push(tag.into());
        self
    }

    pub fn digest(&self) -> serde_json::Result<String> {
        digest_of(self)
    }
}
