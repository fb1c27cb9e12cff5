//! Rubricgate CLI
//!
//! The `rubricgate` command runs the validation engine over a file of
//! generated items.
//!
//! ## Commands
//!
//! - `config`: Validate a configuration file and print the effective settings
//! - `check`: Run the structural checks only
//! - `format`: Print the judge-ready rendering of each item
//! - `replay`: Validate items against recorded judge responses
//! - `judge`: Validate items against a live chat-completions judge

mod input;
mod replay;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use rubricgate_core::obs::ValidationSpan;
use rubricgate_core::{
    cancel_pair, run_batch, BatchJob, BatchOptions, BatchReport, CachingJudge, Candidate,
    CandidateFormatter, CandidateGenerator, ChatJudge, ChatJudgeConfig, Disposition,
    EngineConfig, GenerationError, Judge, JudgePrompt, PriorAttemptFeedback, Rubric,
    RuleChecker, StructuralChecker, Validator,
};
use tracing::{info, Level};

use crate::input::{load_items, load_responses, ItemEntry};
use crate::replay::ReplayJudge;

#[derive(Parser)]
#[command(name = "rubricgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rubric-based validation and regeneration for generated content", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Engine configuration (TOML). Defaults to the reference rubric.
    #[arg(short, long, global = true, env = "RUBRICGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and print the effective settings
    Config {
        /// Configuration file (TOML); falls back to --config
        path: Option<PathBuf>,
    },

    /// Run the structural checks over every item
    Check {
        /// Items file (JSON array)
        items: PathBuf,
    },

    /// Print the judge-ready rendering of every item
    Format {
        /// Items file (JSON array)
        items: PathBuf,

        /// Print the full judge prompt instead of the rendering
        #[arg(long)]
        prompt: bool,
    },

    /// Validate items against recorded judge responses
    Replay {
        /// Items file (JSON array)
        items: PathBuf,

        /// Recorded responses: JSON object of item id to payloads in attempt order
        #[arg(short, long)]
        responses: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Validate items against a live chat-completions judge
    Judge {
        /// Items file (JSON array)
        items: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Maximum validation loops in flight
    #[arg(long, default_value = "4")]
    concurrency: usize,

    /// Write the full JSON report to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Exit with an error when any item is not valid
    #[arg(long)]
    fail_on_invalid: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    rubricgate_core::telemetry::init_tracing(cli.json, level);

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Config { path } => cmd_config(&load_config(path.as_deref().or(config_path))?),
        Commands::Check { items } => cmd_check(&load_config(config_path)?, &items),
        Commands::Format { items, prompt } => {
            cmd_format(&load_config(config_path)?, &items, prompt)
        }
        Commands::Replay {
            items,
            responses,
            run,
        } => {
            let config = load_config(config_path)?;
            let entries = load_items(&items)?;
            let formatter = CandidateFormatter::new(&config.rubric);
            let judge = ReplayJudge::new(&formatter, &entries, load_responses(&responses)?);
            cmd_run(config, Arc::new(judge), entries, &run).await
        }
        Commands::Judge { items, run } => {
            let judge_config = ChatJudgeConfig::from_env().with_context(|| {
                format!(
                    "{} is not set",
                    rubricgate_core::judge::http::API_KEY_ENV
                )
            })?;
            let judge = ChatJudge::new(judge_config).context("Failed to build judge client")?;
            let config = load_config(config_path)?;
            let entries = load_items(&items)?;
            cmd_run(config, Arc::new(CachingJudge::new(judge)), entries, &run).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load configuration {:?}", path)),
        None => Ok(EngineConfig::new(Rubric::reference())),
    }
}

/// Print the effective configuration
fn cmd_config(config: &EngineConfig) -> Result<()> {
    let thresholds = config.rubric.thresholds();
    println!("Rubric total: {}", config.rubric.total_ceiling());
    println!(
        "Judgment bands: pass >= {}, fail < {}",
        thresholds.pass, thresholds.fail
    );
    for category in config.rubric.categories() {
        println!("  {} ({}) /{}", category.label, category.id, category.ceiling);
        for criterion in &category.criteria {
            println!("    - {} /{}", criterion.id, criterion.ceiling);
        }
    }
    println!("Max attempts: {}", config.max_attempts);
    println!(
        "Auto-approve: score >= {}, confidence >= {}",
        config.policy.auto_approve_min_score, config.policy.auto_approve_min_confidence
    );
    println!("Judge timeout: {} ms", config.judge_timeout.as_millis());
    println!("Exhaustion: {:?}", config.exhaustion);
    Ok(())
}

/// Structural checks only; no judge involved
fn cmd_check(config: &EngineConfig, items: &Path) -> Result<()> {
    let checker = RuleChecker::new(config.checks.clone()).context("Invalid [checks] table")?;
    let entries = load_items(items)?;

    let mut invalid = 0usize;
    for entry in &entries {
        let _span = ValidationSpan::enter(&entry.id);
        let result = checker.check(&entry.candidate);
        if result.structurally_valid {
            println!("{}: ok", entry.id);
            continue;
        }
        invalid += 1;
        println!("{}: {} issue(s)", entry.id, result.issues.len());
        for issue in &result.issues {
            match &issue.field {
                Some(field) => println!("  - [{}] {}: {}", issue.code, field, issue.message),
                None => println!("  - [{}] {}", issue.code, issue.message),
            }
        }
    }

    info!(items = entries.len(), invalid, "structural check finished");
    println!("\n{} of {} item(s) structurally valid", entries.len() - invalid, entries.len());
    Ok(())
}

fn cmd_format(config: &EngineConfig, items: &Path, prompt: bool) -> Result<()> {
    let formatter = CandidateFormatter::new(&config.rubric);
    for entry in load_items(items)? {
        let formatted = formatter.format(&entry.candidate, &entry.context);
        println!("<!-- {} sha256:{} -->", entry.id, formatted.digest);
        if prompt {
            let prompt = JudgePrompt::build(&formatted, &entry.context, &config.rubric);
            println!("{}\n\n{}", prompt.system, prompt.user);
        } else {
            println!("{}", formatted.text);
        }
    }
    Ok(())
}

/// Serves one fixed candidate on every attempt.
struct StaticCandidate(Candidate);

#[async_trait]
impl CandidateGenerator for StaticCandidate {
    async fn generate(
        &self,
        _feedback: Option<&PriorAttemptFeedback>,
    ) -> std::result::Result<Candidate, GenerationError> {
        Ok(self.0.clone())
    }
}

async fn cmd_run(
    config: EngineConfig,
    judge: Arc<dyn Judge>,
    entries: Vec<ItemEntry>,
    args: &RunArgs,
) -> Result<()> {
    let validator =
        Arc::new(Validator::with_rule_checker(config, judge).context("Invalid configuration")?);

    let (trigger, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; finishing in-flight attempts");
            trigger.cancel();
        }
    });

    let jobs = entries
        .into_iter()
        .map(|entry| {
            BatchJob::new(
                entry.id,
                Arc::new(StaticCandidate(entry.candidate)),
                entry.context,
            )
        })
        .collect();
    let options = BatchOptions::default()
        .with_concurrency(args.concurrency)
        .with_cancel(signal);

    let report = run_batch(validator, jobs, options).await;
    print_report(&report);

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report {:?}", path))?;
        println!("Report written to {:?}", path);
    }

    if args.fail_on_invalid && report.summary.invalid > 0 {
        anyhow::bail!(
            "{} of {} item(s) did not pass validation",
            report.summary.invalid,
            report.summary.total
        );
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    for item in &report.items {
        match &item.result {
            Ok(outcome) => println!(
                "{}: {} after {} attempt(s), {} with {} points ({})",
                item.id,
                outcome.state.as_str(),
                outcome.attempt_count,
                outcome.verdict.judgment,
                outcome.verdict.total_score,
                match outcome.verdict.disposition() {
                    Disposition::AutoApprove => "auto-approved",
                    Disposition::NeedsReview => "needs review",
                    Disposition::Reject => "rejected",
                },
            ),
            Err(err) => println!("{}: error ({}): {}", item.id, err.kind(), err),
        }
    }

    let s = &report.summary;
    println!();
    println!("Run {}", report.run_id);
    println!("Valid:        {}/{} ({:.2}%)", s.valid, s.total, s.validity_rate);
    println!("Auto-approved: {} ({:.2}%)", s.auto_approved, s.auto_approval_rate);
    println!("Needs review: {}", s.manual_review_needed);
    println!("Rejected:     {}", s.rejected);
    println!("Errored:      {}", s.errored);
    if s.cancelled > 0 {
        println!("Cancelled:    {}", s.cancelled);
    }
    if !s.top_issues.is_empty() {
        println!("Top issues:");
        for freq in &s.top_issues {
            println!("  {} x{}", freq.code, freq.count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn passing_payload() -> serde_json::Value {
        json!({
            "objective_fit": 15, "difficulty_fit": 14, "alignment_total": 29,
            "alignment_rationale": "On target.",
            "accuracy": 15, "clarity": 14, "answerability": 10, "content_quality_total": 39,
            "content_quality_rationale": "Correct.",
            "correctness": 15, "pedagogy": 13, "explanation_quality_total": 28,
            "explanation_quality_rationale": "Clear steps.",
            "total_score": 96,
            "final_judgment": "pass",
            "confidence": 0.93,
            "suggestions": []
        })
    }

    fn write_fixture(dir: &Path) -> (PathBuf, PathBuf) {
        let items = dir.join("items.json");
        std::fs::write(
            &items,
            json!([
                {"id": "q1", "type_tag": "short_answer", "kind": "standalone",
                    "item": {"question": "Name the largest planet.", "answer": "Jupiter"}},
                {"id": "q2", "type_tag": "short_answer", "kind": "standalone",
                    "item": {"question": "Name the smallest planet.", "answer": "Mercury"}}
            ])
            .to_string(),
        )
        .unwrap();

        let responses = dir.join("responses.json");
        std::fs::write(
            &responses,
            json!({
                "q1": [passing_payload()],
                "q2": ["The item looks fine to me."]
            })
            .to_string(),
        )
        .unwrap();
        (items, responses)
    }

    #[tokio::test]
    async fn test_replay_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let (items, responses) = write_fixture(dir.path());
        let config = EngineConfig::new(Rubric::reference()).with_max_attempts(1);

        let entries = load_items(&items).unwrap();
        let formatter = CandidateFormatter::new(&config.rubric);
        let judge = ReplayJudge::new(&formatter, &entries, load_responses(&responses).unwrap());
        let output = dir.path().join("report.json");
        let args = RunArgs {
            concurrency: 2,
            output: Some(output.clone()),
            fail_on_invalid: false,
        };

        cmd_run(config, Arc::new(judge), entries, &args).await.unwrap();

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(report["summary"]["total"], 2);
        assert_eq!(report["summary"]["auto_approved"], 1);
        assert_eq!(report["items"][0]["outcome"]["state"], "accepted");
        assert_eq!(report["items"][1]["outcome"]["state"], "exhausted");
        assert_eq!(
            report["items"][1]["outcome"]["verdict"]["judgment"],
            "fail"
        );
    }

    #[tokio::test]
    async fn test_fail_on_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let (items, responses) = write_fixture(dir.path());
        let config = EngineConfig::new(Rubric::reference()).with_max_attempts(1);

        let entries = load_items(&items).unwrap();
        let formatter = CandidateFormatter::new(&config.rubric);
        let judge = ReplayJudge::new(&formatter, &entries, load_responses(&responses).unwrap());
        let args = RunArgs {
            concurrency: 1,
            output: None,
            fail_on_invalid: true,
        };

        assert!(cmd_run(config, Arc::new(judge), entries, &args).await.is_err());
    }

    #[test]
    fn test_check_and_format_commands() {
        let dir = tempfile::tempdir().unwrap();
        let (items, _) = write_fixture(dir.path());
        let config = EngineConfig::new(Rubric::reference());
        assert!(cmd_check(&config, &items).is_ok());
        assert!(cmd_format(&config, &items, true).is_ok());
        assert!(cmd_config(&config).is_ok());
    }

    #[test]
    fn test_missing_config_file_is_error() {
        assert!(load_config(Some(Path::new("/nonexistent/rubricgate.toml"))).is_err());
        assert!(load_config(None).is_ok());
    }
}
