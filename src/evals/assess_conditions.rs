use serde::Deserialize;
use serde_json::Value;

use super::{Labelled, SignatureEval, check, load_dataset, mean, mentions, mentions_any};
use crate::signatures::{AssessConditions, DayAssessment};

const DATASET: &str = include_str!("datasets/assess_conditions.json");

const COLD_WORDS: &[&str] = &["cold", "frigid", "bitter", "freezing", "temperature", "frostbite"];

#[derive(Debug, Clone, Deserialize)]
pub struct AssessExample {
    pub candidates: Vec<Value>,
    pub preferences: Value,
    pub expected: ExpectedAssessment,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpectedAssessment {
    /// Any of these qualities is acceptable
    #[serde(default)]
    pub day_quality: Vec<String>,
    pub best_mountain: Option<String>,
    #[serde(default)]
    pub mention_wind: bool,
    #[serde(default)]
    pub mention_cold: bool,
}

impl AssessExample {
    fn candidate_names(&self) -> impl Iterator<Item = &str> {
        self.candidates
            .iter()
            .filter_map(|c| c.get("name").and_then(Value::as_str))
    }
}

pub struct AssessConditionsEval;

impl SignatureEval for AssessConditionsEval {
    type Sig = AssessConditions;
    type Example = AssessExample;

    fn examples() -> anyhow::Result<Vec<Labelled<AssessExample>>> {
        load_dataset("assess_conditions", DATASET)
    }

    fn inputs(example: &AssessExample) -> Vec<(&'static str, String)> {
        vec![
            ("all_candidates", Value::from(example.candidates.clone()).to_string()),
            ("user_preferences", example.preferences.to_string()),
        ]
    }

    fn metric(example: &AssessExample, prediction: &DayAssessment) -> f64 {
        let expected = &example.expected;
        let quality = prediction.day_quality.trim().to_lowercase();
        let mut scores = vec![check(DayAssessment::QUALITIES.contains(&quality.as_str()))];

        let grounded = example
            .candidate_names()
            .any(|name| mentions(&prediction.best_available, name));
        scores.push(check(grounded));

        if !expected.day_quality.is_empty() {
            scores.push(check(
                expected.day_quality.iter().any(|q| q.to_lowercase() == quality),
            ));
        }

        if let Some(best) = &expected.best_mountain {
            scores.push(check(mentions(&prediction.best_available, best)));
        }

        if expected.mention_wind {
            scores.push(check(mentions(&prediction.day_context, "wind")));
        }

        if expected.mention_cold {
            scores.push(check(mentions_any(&prediction.day_context, COLD_WORDS)));
        }

        mean(&scores)
    }
}
