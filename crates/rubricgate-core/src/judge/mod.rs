//! Judge client contract.
//!
//! A [`Judge`] is the external scoring oracle. The engine never talks to a
//! model directly: callers inject a judge, and tests inject scripted ones.
//!
//! The wire contract is fixed here regardless of transport:
//! - the request carries the full rubric ([`JudgePrompt`])
//! - the response is one flat JSON object ([`parse_judge_response`])

pub mod cache;
pub mod http;
pub mod prompt;
pub mod response;

use async_trait::async_trait;

use crate::domain::{EvaluationContext, JudgeError, Rubric, RubricScore};
use crate::format::FormattedCandidate;

pub use cache::CachingJudge;
pub use http::{ChatJudge, ChatJudgeConfig};
pub use prompt::JudgePrompt;
pub use response::parse_judge_response;

/// Injected async scoring capability.
///
/// Implementations map transport failures and timeouts to
/// [`JudgeError::Unavailable`] and unusable payloads to
/// [`JudgeError::MalformedResponse`].
#[async_trait]
pub trait Judge: Send + Sync {
    async fn score(
        &self,
        candidate: &FormattedCandidate,
        context: &EvaluationContext,
        rubric: &Rubric,
    ) -> Result<RubricScore, JudgeError>;
}
