//! Caller-scoped memoisation of judge scores.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Judge;
use crate::domain::{EvaluationContext, JudgeError, Rubric, RubricScore};
use crate::format::FormattedCandidate;

/// Wraps a [`Judge`] and memoises successful scores keyed by
/// `(candidate digest, context digest)`.
///
/// Errors are never cached. One cache must only ever be used with one rubric.
pub struct CachingJudge<J> {
    inner: J,
    entries: Mutex<HashMap<(String, String), RubricScore>>,
}

impl<J: Judge> CachingJudge<J> {
    pub fn new(inner: J) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &J {
        &self.inner
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[async_trait]
impl<J: Judge> Judge for CachingJudge<J> {
    async fn score(
        &self,
        candidate: &FormattedCandidate,
        context: &EvaluationContext,
        rubric: &Rubric,
    ) -> Result<RubricScore, JudgeError> {
        // An undigestable context bypasses the cache.
        let key = match context.digest() {
            Ok(ctx) => Some((candidate.digest.clone(), ctx)),
            Err(e) => {
                tracing::warn!(error = %e, "context digest failed; scoring uncached");
                None
            }
        };

        if let Some(key) = &key {
            if let Some(hit) = self.entries.lock().await.get(key) {
                tracing::debug!(digest = %key.0, "judge cache hit");
                return Ok(hit.clone());
            }
        }

        let score = self.inner.score(candidate, context, rubric).await?;
        if let Some(key) = key {
            self.entries.lock().await.insert(key, score.clone());
        }
        Ok(score)
    }
}
