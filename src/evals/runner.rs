//! Runs every stage eval and the end-to-end suite, then prints a summary.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::assess_conditions::AssessConditionsEval;
use super::backtest::EstimatedDriveTime;
use super::end_to_end::{AggregateMetrics, EndToEndSuite, EvalResult};
use super::generate_recommendation::GenerateRecommendationEval;
use super::parse_query::ParseQueryEval;
use super::score_mountain::ScoreMountainEval;
use super::{SignatureEval, mean};
use crate::llm::LanguageModel;
use crate::mountains::MountainStore;
use crate::pipeline::SkiPipeline;
use crate::signatures::{Signature, predict};

/// An example passes at or above this score
pub const PASS_THRESHOLD: f64 = 0.8;

const RULE: &str = "============================================================";

fn mark(ok: bool) -> &'static str {
    if ok { "✓" } else { "✗" }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ExampleFailure {
    pub example: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignatureReport {
    pub name: String,
    pub avg_score: f64,
    pub scores: Vec<f64>,
    pub failures: Vec<ExampleFailure>,
    pub total: usize,
    pub passed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndToEndReport {
    pub name: String,
    pub metrics: Value,
    pub detailed_results: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub model: String,
    pub timestamp: String,
    pub signatures: BTreeMap<String, SignatureReport>,
    pub end_to_end: Option<EndToEndReport>,
}

/// Run one stage against its training examples. Model or decoding errors
/// score zero and are recorded as failures.
pub async fn run_signature_eval<E: SignatureEval>(
    model: &dyn LanguageModel,
    verbose: bool,
) -> Result<SignatureReport> {
    let name = <E::Sig as Signature>::NAME;
    println!("\n{RULE}");
    println!("Evaluating: {name}");
    println!("{RULE}");

    let examples = E::trainset()?;
    let mut scores = Vec::with_capacity(examples.len());
    let mut failures = Vec::new();

    for row in &examples {
        let inputs = E::inputs(&row.example);
        match predict::<E::Sig>(model, &inputs).await {
            Ok(prediction) => {
                let score = E::metric(&row.example, &prediction);
                scores.push(score);
                let passed = score >= PASS_THRESHOLD;
                if verbose || !passed {
                    println!("  [{}] {}: {score:.2}", mark(passed), row.id);
                }
                if !passed {
                    let shown = inputs
                        .first()
                        .map(|(_, value)| truncate(value, 80))
                        .unwrap_or_default();
                    println!("      Input: {shown}...");
                }
            }
            Err(err) => {
                warn!(signature = name, example = %row.id, error = %err, "Stage eval errored");
                println!("  [!] {}: ERROR - {err}", row.id);
                scores.push(0.0);
                failures.push(ExampleFailure {
                    example: row.id.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    let passed = scores.iter().filter(|s| **s >= PASS_THRESHOLD).count();
    let avg_score = mean(&scores);
    println!(
        "\n  Average: {:.1}% ({passed}/{} passed)",
        avg_score * 100.0,
        scores.len()
    );

    Ok(SignatureReport {
        name: name.to_string(),
        avg_score,
        scores,
        failures,
        total: examples.len(),
        passed,
    })
}

/// Run the labelled queries through the full pipeline with replayed weather
/// and estimated drive times
pub async fn run_end_to_end(
    model: &dyn LanguageModel,
    store: &MountainStore,
    verbose: bool,
) -> Result<EndToEndReport> {
    println!("\n{RULE}");
    println!("Evaluating: End-to-End Pipeline");
    println!("{RULE}");

    let suite = EndToEndSuite::load()?;
    let routes = EstimatedDriveTime;
    let mut results = Vec::with_capacity(suite.examples.len());

    for example in &suite.examples {
        println!("\n  [{}] {}...", example.id, truncate(&example.query, 50));

        let run = async {
            let replay = suite.replay_for(example)?;
            let location = example.user_location()?;
            let pipeline = SkiPipeline::new(model, store, &replay, &routes);
            pipeline
                .run(&example.query, example.query_date, &location)
                .await
        };

        let result = match run.await {
            Ok(outcome) => {
                let result = EvalResult::evaluate(example, &outcome);
                let satisfied = result.constraint_satisfaction.values().filter(|ok| **ok).count();
                println!(
                    "    Hit@1: {} | Hit@3: {} | Constraints: {satisfied}/{}",
                    mark(result.hit_at_1),
                    mark(result.hit_at_3),
                    result.constraint_satisfaction.len().max(1)
                );
                if verbose || !result.hit_at_1 {
                    println!("    Predicted: {}...", truncate(&outcome.top_pick, 60));
                    println!("    Expected: {:?}", example.expected_top_pick);
                    let failed = result.failed_constraints();
                    if !failed.is_empty() {
                        println!("    Failed constraints: {failed:?}");
                    }
                }
                result
            }
            Err(err) => {
                warn!(example = %example.id, error = %err, "Pipeline errored");
                println!("    ERROR: {err:#}");
                EvalResult::errored(example, &err)
            }
        };
        results.push(result);
    }

    let metrics = AggregateMetrics::from_results(&results);
    println!("\n  Summary: {metrics}");

    let detailed_results = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.example_id,
                "hit_at_1": r.hit_at_1,
                "hit_at_3": r.hit_at_3,
                "constraints": r.constraint_satisfaction,
                "predicted": truncate(&r.predicted_top_pick, 50),
            })
        })
        .collect();

    Ok(EndToEndReport {
        name: "End-to-End Pipeline".to_string(),
        metrics: metrics.to_json(),
        detailed_results,
    })
}

/// Every stage eval, then (unless `signatures_only`) the end-to-end suite
pub async fn run_all(
    model: &dyn LanguageModel,
    store: &MountainStore,
    verbose: bool,
    signatures_only: bool,
) -> Result<EvalReport> {
    let timestamp = Local::now().to_rfc3339();
    println!("\nPowder Evaluation Suite");
    println!("Model: {}", model.name());
    println!("Time: {timestamp}");

    let mut signatures = BTreeMap::new();
    for report in [
        run_signature_eval::<ParseQueryEval>(model, verbose).await?,
        run_signature_eval::<AssessConditionsEval>(model, verbose).await?,
        run_signature_eval::<ScoreMountainEval>(model, verbose).await?,
        run_signature_eval::<GenerateRecommendationEval>(model, verbose).await?,
    ] {
        signatures.insert(report.name.clone(), report);
    }

    let end_to_end = if signatures_only {
        None
    } else {
        Some(run_end_to_end(model, store, verbose).await?)
    };

    let report = EvalReport {
        model: model.name().to_string(),
        timestamp,
        signatures,
        end_to_end,
    };
    println!("{}", summary(&report));
    Ok(report)
}

/// Bar chart of stage scores plus the end-to-end rates
#[must_use]
pub fn summary(report: &EvalReport) -> String {
    let mut lines = vec![
        String::new(),
        RULE.to_string(),
        "EVALUATION SUMMARY".to_string(),
        RULE.to_string(),
        String::new(),
        "Signature Metrics (avg score):".to_string(),
    ];
    for (name, data) in &report.signatures {
        let bar = "█".repeat((data.avg_score * 20.0) as usize);
        lines.push(format!(
            "  {name:25} {:5.1}% {bar}",
            data.avg_score * 100.0
        ));
    }

    if let Some(e2e) = &report.end_to_end {
        let metric = |key: &str| e2e.metrics[key].as_str().unwrap_or("-").to_string();
        lines.push(String::new());
        lines.push("End-to-End Metrics:".to_string());
        lines.push(format!("  Hit@1:                   {}", metric("hit_at_1")));
        lines.push(format!("  Hit@3:                   {}", metric("hit_at_3")));
        lines.push(format!(
            "  Constraint Satisfaction: {}",
            metric("constraint_satisfaction")
        ));
        lines.push(format!("  Exclusion Check:         {}", metric("exclusion_check")));
    }
    lines.join("\n")
}

pub fn save_report(report: &EvalReport, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(report)?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Eval report saved");
    println!("\nResults saved to: {}", path.display());
    Ok(())
}
