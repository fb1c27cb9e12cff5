//! Lifecycle events for validation runs.
//!
//! - `validation_span` / `ValidationSpan`: scope every event of one validation call
//! - `emit_*`: one function per lifecycle event, at `info!` unless noted
//!
//! Filter with `RUBRICGATE_LOG`; see [`crate::telemetry`].

use tracing::info;

use crate::decision::Verdict;
use crate::domain::JudgeError;
use crate::judge::http::truncate;

/// Largest prefix of a raw judge payload written to the log.
pub const RAW_PAYLOAD_LOG_LIMIT: usize = 2048;

/// Span for one validation call; attach to futures with `Instrument`.
pub fn validation_span(item_id: &str) -> tracing::Span {
    tracing::info_span!("rubricgate.validation", item_id = %item_id)
}

/// Enters a span tagged with the item id for as long as it lives. For
/// synchronous code; async code uses [`validation_span`].
///
/// ```ignore
/// let _span = ValidationSpan::enter("item-7");
/// ```
pub struct ValidationSpan {
    _span: tracing::span::EnteredSpan,
}

impl ValidationSpan {
    pub fn enter(item_id: &str) -> Self {
        Self {
            _span: validation_span(item_id).entered(),
        }
    }
}

pub fn emit_attempt_started(attempt: u32, max_attempts: u32) {
    info!(event = "attempt.started", attempt, max_attempts);
}

pub fn emit_attempt_decided(attempt: u32, verdict: &Verdict) {
    info!(
        event = "attempt.decided",
        attempt,
        judgment = %verdict.judgment,
        total_score = verdict.total_score,
        confidence = verdict.confidence,
        auto_approve = verdict.auto_approve,
        issues = verdict.issues.len(),
    );
}

/// Judge failure for one attempt. Malformed payloads are logged with their
/// raw text (truncated) for offline diagnosis.
pub fn emit_attempt_judge_failed(attempt: u32, error: &JudgeError) {
    match error {
        JudgeError::Unavailable { reason } => {
            tracing::warn!(event = "attempt.judge_failed", attempt, kind = "unavailable", reason = %reason);
        }
        JudgeError::MalformedResponse { reason, raw } => {
            tracing::warn!(
                event = "attempt.judge_failed",
                attempt,
                kind = "malformed_response",
                reason = %reason,
                raw_len = raw.len(),
                raw = %truncate(raw, RAW_PAYLOAD_LOG_LIMIT),
            );
        }
    }
}

pub fn emit_validation_finished(state: &str, attempts: u32, cancelled: bool, duration_ms: u64) {
    info!(
        event = "validation.finished",
        state = %state,
        attempts,
        cancelled,
        duration_ms,
    );
}

pub fn emit_validation_failed(error: &dyn std::fmt::Display) {
    tracing::warn!(event = "validation.failed", error = %error);
}

pub fn emit_batch_finished(
    run_id: &str,
    total: usize,
    valid: usize,
    auto_approval_rate: f64,
    duration_ms: u64,
) {
    info!(
        event = "batch.finished",
        run_id = %run_id,
        total,
        valid,
        auto_approval_rate,
        duration_ms,
    );
}
