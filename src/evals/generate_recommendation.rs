use serde::Deserialize;
use serde_json::Value;

use super::{Labelled, SignatureEval, check, load_dataset, mean, mentions, mentions_any};
use crate::signatures::{GenerateRecommendation, Recommendation};

const DATASET: &str = include_str!("datasets/generate_recommendation.json");

const PASS_WORDS: &[&str] = &["pass", "ikon", "epic", "indy", "ticket"];

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationExample {
    pub query: String,
    pub day_assessment: String,
    pub scored_candidates: Vec<Value>,
    pub crowd_context: Value,
    pub expected: ExpectedRecommendation,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExpectedRecommendation {
    /// Any of these is an acceptable top pick
    pub top_pick: Vec<String>,
    pub alternatives_mention: Vec<String>,
    pub top_pick_keywords: Vec<String>,
    pub caveat_keywords: Vec<String>,
    pub pass_awareness: bool,
}

fn as_strs(items: &[String]) -> Vec<&str> {
    items.iter().map(String::as_str).collect()
}

pub struct GenerateRecommendationEval;

impl SignatureEval for GenerateRecommendationEval {
    type Sig = GenerateRecommendation;
    type Example = RecommendationExample;

    fn examples() -> anyhow::Result<Vec<Labelled<RecommendationExample>>> {
        load_dataset("generate_recommendation", DATASET)
    }

    fn inputs(example: &RecommendationExample) -> Vec<(&'static str, String)> {
        vec![
            ("query", example.query.clone()),
            ("day_assessment", example.day_assessment.clone()),
            (
                "scored_candidates",
                Value::from(example.scored_candidates.clone()).to_string(),
            ),
            ("crowd_context", example.crowd_context.to_string()),
        ]
    }

    fn metric(example: &RecommendationExample, prediction: &Recommendation) -> f64 {
        let expected = &example.expected;
        let mut scores = Vec::new();

        if !expected.top_pick.is_empty() {
            scores.push(check(mentions_any(
                &prediction.top_pick,
                &as_strs(&expected.top_pick),
            )));
        }

        if !expected.alternatives_mention.is_empty() {
            let score = if mentions_any(&prediction.alternatives, &as_strs(&expected.alternatives_mention)) {
                1.0
            } else if !prediction.alternatives.is_empty() {
                0.5
            } else {
                0.0
            };
            scores.push(score);
        }

        if !expected.top_pick_keywords.is_empty() {
            scores.push(check(mentions_any(
                &prediction.top_pick,
                &as_strs(&expected.top_pick_keywords),
            )));
        }

        let full_text = format!(
            "{} {} {}",
            prediction.top_pick, prediction.alternatives, prediction.caveat
        );

        if !expected.caveat_keywords.is_empty() {
            scores.push(check(
                expected.caveat_keywords.iter().any(|kw| mentions(&full_text, kw)),
            ));
        }

        if expected.pass_awareness {
            scores.push(check(mentions_any(&full_text, PASS_WORDS)));
        }

        let substantial = prediction.top_pick.trim().chars().count() > 10
            && prediction.alternatives.trim().chars().count() > 5;
        scores.push(if substantial { 1.0 } else { 0.5 });

        mean(&scores)
    }
}
