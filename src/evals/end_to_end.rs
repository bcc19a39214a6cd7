//! Labelled queries run through the whole pipeline against recorded
//! condition snapshots. Every metric is computed from the output text and the
//! candidate list, without a model in the loop.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::backtest::{FixtureConditions, ReplayConditions};
use super::load_dataset;
use crate::location::UserLocation;
use crate::mountains::PassType;
use crate::pipeline::{Candidate, PipelineOutcome};

const DATASET: &str = include_str!("datasets/end_to_end.json");

/// Hard constraints the top pick must satisfy
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Constraints {
    pub pass_type: Option<PassType>,
    pub max_drive_hours: Option<f64>,
    pub needs_terrain_parks: Option<bool>,
    pub needs_glades: Option<bool>,
    pub needs_night_skiing: Option<bool>,
    pub needs_beginner_terrain: Option<bool>,
    pub needs_expert_terrain: Option<bool>,
}

impl Constraints {
    /// Names of the constraints that are set
    fn names(&self) -> Vec<&'static str> {
        [
            ("pass_type", self.pass_type.is_some()),
            ("max_drive_hours", self.max_drive_hours.is_some()),
            ("needs_terrain_parks", self.needs_terrain_parks.is_some()),
            ("needs_glades", self.needs_glades.is_some()),
            ("needs_night_skiing", self.needs_night_skiing.is_some()),
            ("needs_beginner_terrain", self.needs_beginner_terrain.is_some()),
            ("needs_expert_terrain", self.needs_expert_terrain.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndToEndExample {
    pub id: String,
    pub query: String,
    pub query_date: NaiveDate,
    /// Built-in location key, e.g. `boston`
    pub location: String,
    /// Name of the conditions snapshot to replay
    pub snapshot: String,
    pub expected_top_pick: Vec<String>,
    pub expected_in_top_3: Vec<String>,
    #[serde(default)]
    pub expected_excluded: Vec<String>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub reasoning_keywords: Vec<String>,
}

impl EndToEndExample {
    pub fn user_location(&self) -> anyhow::Result<UserLocation> {
        UserLocation::known(&self.location)
            .ok_or_else(|| anyhow!("Unknown location '{}' in example {}", self.location, self.id))
    }
}

/// The labelled examples with the snapshots they replay
#[derive(Debug, Clone, Deserialize)]
pub struct EndToEndSuite {
    snapshots: HashMap<String, HashMap<String, FixtureConditions>>,
    pub examples: Vec<EndToEndExample>,
}

impl EndToEndSuite {
    pub fn load() -> anyhow::Result<Self> {
        load_dataset("end_to_end", DATASET)
    }

    pub fn replay_for(&self, example: &EndToEndExample) -> anyhow::Result<ReplayConditions> {
        self.snapshots
            .get(&example.snapshot)
            .cloned()
            .map(ReplayConditions::new)
            .ok_or_else(|| anyhow!("Unknown snapshot '{}' in example {}", example.snapshot, example.id))
    }
}

fn lower_contains_any(text: &str, names: &[String]) -> bool {
    let text = text.to_lowercase();
    names.iter().any(|name| text.contains(&name.to_lowercase()))
}

#[must_use]
pub fn hit_at_1(example: &EndToEndExample, top_pick: &str) -> bool {
    lower_contains_any(top_pick, &example.expected_top_pick)
}

#[must_use]
pub fn hit_at_3(example: &EndToEndExample, top_3: &[String]) -> bool {
    lower_contains_any(&top_3.join(" "), &example.expected_in_top_3)
}

/// Check each constraint against the candidate the top pick names. If no
/// candidate is named every constraint fails.
#[must_use]
pub fn constraint_satisfaction(
    example: &EndToEndExample,
    top_pick: &str,
    candidates: &[Candidate],
) -> BTreeMap<String, bool> {
    let constraints = &example.constraints;
    let top_pick = top_pick.to_lowercase();
    let recommended = candidates
        .iter()
        .find(|c| !c.name().is_empty() && top_pick.contains(&c.name().to_lowercase()));

    let Some(candidate) = recommended else {
        return constraints
            .names()
            .into_iter()
            .map(|name| (name.to_string(), false))
            .collect();
    };
    let mountain = &candidate.mountain.mountain;

    let mut results = BTreeMap::new();
    if let Some(pass) = constraints.pass_type {
        results.insert("pass_type".to_string(), mountain.accepts_pass(pass));
    }
    if let Some(hours) = constraints.max_drive_hours {
        results.insert(
            "max_drive_hours".to_string(),
            candidate.drive_time.duration_minutes <= hours * 60.0,
        );
    }
    let facets = [
        ("needs_terrain_parks", constraints.needs_terrain_parks, mountain.has_terrain_parks()),
        ("needs_glades", constraints.needs_glades, mountain.has_glades()),
        ("needs_night_skiing", constraints.needs_night_skiing, mountain.has_night_skiing),
        ("needs_beginner_terrain", constraints.needs_beginner_terrain, mountain.has_beginner_terrain()),
        ("needs_expert_terrain", constraints.needs_expert_terrain, mountain.has_expert_terrain()),
    ];
    for (name, wanted, has) in facets {
        if let Some(wanted) = wanted {
            results.insert(name.to_string(), has == wanted);
        }
    }
    results
}

/// True unless the top pick names an excluded mountain
#[must_use]
pub fn exclusion_check(example: &EndToEndExample, top_pick: &str) -> bool {
    !lower_contains_any(top_pick, &example.expected_excluded)
}

/// Fraction of the reasoning keywords found in the recommendation text
#[must_use]
pub fn reasoning_score(example: &EndToEndExample, text: &str) -> f64 {
    if example.reasoning_keywords.is_empty() {
        return 1.0;
    }
    let text = text.to_lowercase();
    let hits = example
        .reasoning_keywords
        .iter()
        .filter(|kw| text.contains(&kw.to_lowercase()))
        .count();
    hits as f64 / example.reasoning_keywords.len() as f64
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalResult {
    pub example_id: String,
    pub hit_at_1: bool,
    pub hit_at_3: bool,
    pub constraint_satisfaction: BTreeMap<String, bool>,
    pub exclusion_check: bool,
    pub reasoning_score: f64,
    pub predicted_top_pick: String,
    pub predicted_top_3: Vec<String>,
}

impl EvalResult {
    #[must_use]
    pub fn evaluate(example: &EndToEndExample, outcome: &PipelineOutcome) -> Self {
        let top_3: Vec<String> = outcome
            .scores
            .iter()
            .take(3)
            .map(|s| s.mountain.name().to_string())
            .collect();
        let full_text = format!("{} {} {}", outcome.top_pick, outcome.alternatives, outcome.caveat);

        Self {
            example_id: example.id.clone(),
            hit_at_1: hit_at_1(example, &outcome.top_pick),
            hit_at_3: hit_at_3(example, &top_3),
            constraint_satisfaction: constraint_satisfaction(example, &outcome.top_pick, &outcome.candidates),
            exclusion_check: exclusion_check(example, &outcome.top_pick),
            reasoning_score: reasoning_score(example, &full_text),
            predicted_top_pick: outcome.top_pick.chars().take(100).collect(),
            predicted_top_3: top_3,
        }
    }

    /// A run that errored counts as a miss on every metric
    #[must_use]
    pub fn errored(example: &EndToEndExample, error: &anyhow::Error) -> Self {
        Self {
            example_id: example.id.clone(),
            hit_at_1: false,
            hit_at_3: false,
            constraint_satisfaction: BTreeMap::new(),
            exclusion_check: false,
            reasoning_score: 0.0,
            predicted_top_pick: format!("ERROR: {error:#}"),
            predicted_top_3: Vec::new(),
        }
    }

    /// Constraints that were not satisfied
    #[must_use]
    pub fn failed_constraints(&self) -> Vec<&str> {
        self.constraint_satisfaction
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateMetrics {
    pub hit_at_1_rate: f64,
    pub hit_at_3_rate: f64,
    pub constraint_satisfaction_rate: f64,
    pub exclusion_rate: f64,
    pub avg_reasoning_score: f64,
    pub total_examples: usize,
}

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

impl AggregateMetrics {
    #[must_use]
    pub fn from_results(results: &[EvalResult]) -> Self {
        if results.is_empty() {
            return Self::default();
        }
        let n = results.len() as f64;
        let rate = |hit: fn(&EvalResult) -> bool| results.iter().filter(|r| hit(r)).count() as f64 / n;

        let checks: Vec<bool> = results
            .iter()
            .flat_map(|r| r.constraint_satisfaction.values().copied())
            .collect();
        let constraint_satisfaction_rate = if checks.is_empty() {
            1.0
        } else {
            checks.iter().filter(|ok| **ok).count() as f64 / checks.len() as f64
        };

        Self {
            hit_at_1_rate: rate(|r| r.hit_at_1),
            hit_at_3_rate: rate(|r| r.hit_at_3),
            constraint_satisfaction_rate,
            exclusion_rate: rate(|r| r.exclusion_check),
            avg_reasoning_score: results.iter().map(|r| r.reasoning_score).sum::<f64>() / n,
            total_examples: results.len(),
        }
    }

    /// Rates rendered as percentages for reports
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "hit_at_1": percent(self.hit_at_1_rate),
            "hit_at_3": percent(self.hit_at_3_rate),
            "constraint_satisfaction": percent(self.constraint_satisfaction_rate),
            "exclusion_check": percent(self.exclusion_rate),
            "reasoning_score": percent(self.avg_reasoning_score),
            "total_examples": self.total_examples,
        })
    }
}

impl fmt::Display for AggregateMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Hit@1: {} | Hit@3: {} | Constraints: {} | Exclusions: {} | Reasoning: {}",
            percent(self.hit_at_1_rate),
            percent(self.hit_at_3_rate),
            percent(self.constraint_satisfaction_rate),
            percent(self.exclusion_rate),
            percent(self.avg_reasoning_score),
        )
    }
}
