//! OpenAI-compatible `chat/completions` judge.
//!
//! The API key is never logged; response bodies are logged only as sizes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{parse_judge_response, Judge, JudgePrompt};
use crate::domain::{EvaluationContext, JudgeError, Rubric, RubricScore};
use crate::format::FormattedCandidate;

pub const API_KEY_ENV: &str = "RUBRICGATE_JUDGE_API_KEY";
pub const BASE_URL_ENV: &str = "RUBRICGATE_JUDGE_BASE_URL";
pub const MODEL_ENV: &str = "RUBRICGATE_JUDGE_MODEL";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone, PartialEq)]
pub struct ChatJudgeConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Transport-level timeout. The validator applies its own per-call bound.
    pub request_timeout: Duration,
}

impl ChatJudgeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Read from the environment; `None` when no API key is set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty())?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            config.model = model;
        }
        Some(config)
    }
}

impl std::fmt::Debug for ChatJudgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatJudgeConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Live judge backed by an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct ChatJudge {
    client: reqwest::Client,
    config: ChatJudgeConfig,
}

impl ChatJudge {
    pub fn new(config: ChatJudgeConfig) -> Result<Self, JudgeError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| JudgeError::unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ChatJudgeConfig {
        &self.config
    }

    async fn complete(&self, prompt: &JudgePrompt) -> Result<String, JudgeError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
        };

        let res = self
            .client
            .post(&url)
            .header(USER_AGENT, concat!("rubricgate/", env!("CARGO_PKG_VERSION")))
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| JudgeError::unavailable(format!("request failed: {e}")))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| JudgeError::unavailable(format!("failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(JudgeError::unavailable(format!(
                "judge endpoint returned HTTP {status}: {}",
                truncate(&body, 200)
            )));
        }
        tracing::debug!(bytes = body.len(), "judge response received");

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| JudgeError::malformed(format!("invalid completion body: {e}"), &body))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| JudgeError::malformed("completion has no content", &body))
    }
}

#[async_trait]
impl Judge for ChatJudge {
    #[instrument(skip_all, fields(model = %self.config.model, digest = %candidate.digest))]
    async fn score(
        &self,
        candidate: &FormattedCandidate,
        context: &EvaluationContext,
        rubric: &Rubric,
    ) -> Result<RubricScore, JudgeError> {
        let prompt = JudgePrompt::build(candidate, context, rubric);
        let content = self.complete(&prompt).await?;
        parse_judge_response(&content, rubric)
    }
}

/// Char-boundary-safe prefix of at most `max` bytes.
pub(crate) fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
