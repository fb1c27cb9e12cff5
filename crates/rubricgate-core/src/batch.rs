//! Batch aggregator.
//!
//! Runs one validation loop per job, concurrently up to a bound, and
//! summarises the results. Output order always matches input order. The
//! summary accumulator is the only state shared between jobs and is only
//! touched under its lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::{Mutex, Semaphore};
use tracing::{instrument, Instrument};
use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::decision::Disposition;
use crate::domain::{EvaluationContext, FinalJudgment, IssueCode, ValidationError};
use crate::metrics::METRICS;
use crate::obs;
use crate::orchestrator::{CandidateGenerator, ValidationOutcome, Validator};

/// Most frequent issue codes kept in a summary.
pub const TOP_ISSUES: usize = 5;

/// One unit of batch work.
pub struct BatchJob {
    pub id: String,
    pub generator: Arc<dyn CandidateGenerator>,
    pub context: EvaluationContext,
}

impl BatchJob {
    pub fn new(
        id: impl Into<String>,
        generator: Arc<dyn CandidateGenerator>,
        context: EvaluationContext,
    ) -> Self {
        Self {
            id: id.into(),
            generator,
            context,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum loops in flight; 0 is treated as 1.
    pub concurrency: usize,
    pub cancel: CancelSignal,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            cancel: CancelSignal::never(),
        }
    }
}

impl BatchOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Per-job result: a terminal outcome or a typed error, never both.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub id: String,
    pub result: Result<ValidationOutcome, ValidationError>,
}

impl Serialize for BatchItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct ErrorView<'a> {
            kind: &'a str,
            message: String,
        }

        #[derive(Serialize)]
        struct ItemView<'a> {
            id: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            outcome: Option<&'a ValidationOutcome>,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<ErrorView<'a>>,
        }

        let view = match &self.result {
            Ok(outcome) => ItemView {
                id: &self.id,
                outcome: Some(outcome),
                error: None,
            },
            Err(err) => ItemView {
                id: &self.id,
                outcome: None,
                error: Some(ErrorView {
                    kind: err.kind(),
                    message: err.to_string(),
                }),
            },
        };
        view.serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFrequency {
    pub code: IssueCode,
    pub count: usize,
}

/// Aggregate statistics. Rates are percentages rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Outcomes whose final judgment is Pass.
    pub valid: usize,
    /// Everything else, errors included.
    pub invalid: usize,
    pub auto_approved: usize,
    pub manual_review_needed: usize,
    pub rejected: usize,
    pub errored: usize,
    pub cancelled: usize,
    pub validity_rate: f64,
    pub auto_approval_rate: f64,
    /// Issue codes of each outcome's final attempt, most frequent first.
    pub top_issues: Vec<IssueFrequency>,
}

impl BatchSummary {
    pub fn from_items(items: &[BatchItem]) -> Self {
        let mut acc = SummaryAccumulator::default();
        for item in items {
            acc.record(&item.result);
        }
        acc.finish()
    }
}

#[derive(Debug, Default)]
struct SummaryAccumulator {
    total: usize,
    valid: usize,
    auto_approved: usize,
    manual_review_needed: usize,
    rejected: usize,
    errored: usize,
    cancelled: usize,
    issues: HashMap<IssueCode, usize>,
}

impl SummaryAccumulator {
    fn record(&mut self, result: &Result<ValidationOutcome, ValidationError>) {
        self.total += 1;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.errored += 1;
                if matches!(err, ValidationError::Cancelled) {
                    self.cancelled += 1;
                }
                return;
            }
        };

        if outcome.cancelled {
            self.cancelled += 1;
        }
        if outcome.verdict.judgment == FinalJudgment::Pass {
            self.valid += 1;
        }
        match outcome.verdict.disposition() {
            Disposition::AutoApprove => self.auto_approved += 1,
            Disposition::NeedsReview => self.manual_review_needed += 1,
            Disposition::Reject => self.rejected += 1,
        }
        for issue in outcome.final_rule_issues() {
            *self.issues.entry(issue.code).or_insert(0) += 1;
        }
    }

    fn finish(self) -> BatchSummary {
        let mut top_issues: Vec<IssueFrequency> = self
            .issues
            .into_iter()
            .map(|(code, count)| IssueFrequency { code, count })
            .collect();
        top_issues.sort_by(|a, b| b.count.cmp(&a.count).then(a.code.cmp(&b.code)));
        top_issues.truncate(TOP_ISSUES);

        BatchSummary {
            total: self.total,
            valid: self.valid,
            invalid: self.total - self.valid,
            auto_approved: self.auto_approved,
            manual_review_needed: self.manual_review_needed,
            rejected: self.rejected,
            errored: self.errored,
            cancelled: self.cancelled,
            validity_rate: percentage(self.valid, self.total),
            auto_approval_rate: percentage(self.auto_approved, self.total),
            top_issues,
        }
    }
}

/// `count / total` as a percentage rounded to two decimals; 0 for an empty batch.
pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub items: Vec<BatchItem>,
    pub summary: BatchSummary,
}

/// Validate every job and summarise. One job's failure never affects its
/// siblings; it is reported as that job's error.
#[instrument(skip_all, fields(jobs = jobs.len(), concurrency = options.concurrency))]
pub async fn run_batch(
    validator: Arc<Validator>,
    jobs: Vec<BatchJob>,
    options: BatchOptions,
) -> BatchReport {
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let started = Instant::now();

    let sem = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let summary = Arc::new(Mutex::new(SummaryAccumulator::default()));

    let mut tasks = Vec::with_capacity(jobs.len());
    for job in jobs {
        let validator = Arc::clone(&validator);
        let sem = Arc::clone(&sem);
        let summary = Arc::clone(&summary);
        let cancel = options.cancel.clone();
        let id = job.id.clone();

        let task = tokio::spawn(async move {
            let result = match sem.acquire_owned().await {
                Ok(_permit) => {
                    validator
                        .validate(job.generator.as_ref(), &job.context, &cancel)
                        .instrument(obs::validation_span(&job.id))
                        .await
                }
                Err(_) => Err(ValidationError::TaskFailed(
                    "concurrency limiter closed".to_string(),
                )),
            };
            summary.lock().await.record(&result);
            result
        });
        tasks.push((id, task));
    }

    let mut items = Vec::with_capacity(tasks.len());
    for (id, task) in tasks {
        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                let result = Err(ValidationError::TaskFailed(e.to_string()));
                summary.lock().await.record(&result);
                result
            }
        };
        items.push(BatchItem { id, result });
    }

    let summary = std::mem::take(&mut *summary.lock().await).finish();
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    obs::emit_batch_finished(
        &run_id,
        summary.total,
        summary.valid,
        summary.auto_approval_rate,
        duration_ms,
    );
    METRICS.flush();

    BatchReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        duration_ms,
        items,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(3, 4), 75.0);
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn test_empty_summary() {
        let summary = BatchSummary::from_items(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.auto_approval_rate, 0.0);
        assert!(summary.top_issues.is_empty());
    }

    #[test]
    fn test_errors_count_as_invalid() {
        let items = vec![
            BatchItem {
                id: "a".into(),
                result: Err(ValidationError::Cancelled),
            },
            BatchItem {
                id: "b".into(),
                result: Err(ValidationError::Aborted {
                    attempt: 3,
                    reason: "judge unavailable".into(),
                }),
            },
        ];
        let summary = BatchSummary::from_items(&items);
        assert_eq!(summary.invalid, 2);
        assert_eq!(summary.errored, 2);
        assert_eq!(summary.cancelled, 1);

        let json = serde_json::to_value(&items[1]).unwrap();
        assert_eq!(json["error"]["kind"], "validation_aborted");
        assert!(json.get("outcome").is_none());
    }
}
