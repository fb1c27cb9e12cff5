//! Judge that answers from recorded payloads instead of a live model.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use rubricgate_core::{
    parse_judge_response, CandidateFormatter, EvaluationContext, FormattedCandidate, Judge,
    JudgeError, Rubric, RubricScore,
};
use tokio::sync::Mutex;

use crate::input::ItemEntry;

/// Replays raw judge payloads, keyed by the digest of the formatted
/// candidate they were recorded for. Each call consumes one payload.
pub struct ReplayJudge {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
}

impl ReplayJudge {
    pub fn new(
        formatter: &CandidateFormatter,
        items: &[ItemEntry],
        mut responses: HashMap<String, Vec<String>>,
    ) -> Self {
        let mut queues: HashMap<String, VecDeque<String>> = HashMap::new();
        for entry in items {
            let digest = formatter.format(&entry.candidate, &entry.context).digest;
            if let Some(payloads) = responses.remove(&entry.id) {
                queues.entry(digest).or_default().extend(payloads);
            }
        }
        if !responses.is_empty() {
            tracing::warn!(
                unused = responses.len(),
                "recorded responses for unknown item ids ignored"
            );
        }
        Self {
            queues: Mutex::new(queues),
        }
    }
}

#[async_trait]
impl Judge for ReplayJudge {
    async fn score(
        &self,
        candidate: &FormattedCandidate,
        _context: &EvaluationContext,
        rubric: &Rubric,
    ) -> Result<RubricScore, JudgeError> {
        let raw = self
            .queues
            .lock()
            .await
            .get_mut(&candidate.digest)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| JudgeError::unavailable("no recorded response left for candidate"))?;
        parse_judge_response(&raw, rubric)
    }
}
