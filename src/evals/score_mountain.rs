use serde::Deserialize;
use serde_json::Value;

use super::{Labelled, SignatureEval, check, load_dataset, mean};
use crate::signatures::{MountainScore, ScoreMountain};

const DATASET: &str = include_str!("datasets/score_mountain.json");

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreExample {
    /// Mountain record with its `conditions` and `drive_time`
    pub mountain: Value,
    pub preferences: Value,
    pub day_context: String,
    pub expected: ExpectedScore,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpectedScore {
    pub score_min: f64,
    pub score_max: f64,
    #[serde(default)]
    pub pros_mention: Vec<String>,
    #[serde(default)]
    pub cons_mention: Vec<String>,
}

pub struct ScoreMountainEval;

impl SignatureEval for ScoreMountainEval {
    type Sig = ScoreMountain;
    type Example = ScoreExample;

    fn examples() -> anyhow::Result<Vec<Labelled<ScoreExample>>> {
        load_dataset("score_mountain", DATASET)
    }

    fn inputs(example: &ScoreExample) -> Vec<(&'static str, String)> {
        vec![
            ("mountain", example.mountain.to_string()),
            ("user_preferences", example.preferences.to_string()),
            ("day_context", example.day_context.clone()),
        ]
    }

    fn metric(example: &ScoreExample, prediction: &MountainScore) -> f64 {
        let expected = &example.expected;
        let mut scores = Vec::new();

        match prediction.score {
            Some(score) => {
                scores.push(check((0.0..=100.0).contains(&score)));
                scores.push(range_score(score, expected.score_min, expected.score_max));
            }
            None => scores.push(0.0),
        }

        if !expected.pros_mention.is_empty() {
            let hits = keyword_hits(&prediction.key_pros, &expected.pros_mention);
            scores.push((hits as f64 / 2.0).min(1.0));
        }

        if !expected.cons_mention.is_empty() {
            let hits = keyword_hits(&prediction.key_cons, &expected.cons_mention);
            scores.push((hits as f64).min(1.0));
        }

        scores.push(check(prediction.tradeoff_note.trim().chars().count() > 10));

        mean(&scores)
    }
}

/// Full marks inside the band, half within 10 points of it
fn range_score(score: f64, min: f64, max: f64) -> f64 {
    if (min..=max).contains(&score) {
        1.0
    } else if (min - 10.0..=max + 10.0).contains(&score) {
        0.5
    } else {
        0.0
    }
}

fn keyword_hits(text: &str, keywords: &[String]) -> usize {
    let text = text.to_lowercase();
    keywords
        .iter()
        .filter(|kw| text.contains(&kw.to_lowercase()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn example(id: &str) -> ScoreExample {
        ScoreMountainEval::examples()
            .unwrap()
            .into_iter()
            .find(|row| row.id == id)
            .unwrap()
            .example
    }

    fn prediction(score: Option<f64>, pros: &str, cons: &str, tradeoff: &str) -> MountainScore {
        MountainScore {
            score,
            key_pros: pros.to_string(),
            key_cons: cons.to_string(),
            tradeoff_note: tradeoff.to_string(),
        }
    }

    #[test]
    fn test_dataset_split_sizes() {
        assert_eq!(ScoreMountainEval::trainset().unwrap().len(), 6);
        assert_eq!(ScoreMountainEval::valset().unwrap().len(), 2);
    }

    #[test]
    fn test_inputs_carry_mountain_json() {
        let inputs = ScoreMountainEval::inputs(&example("stowe_powder_day"));
        let mountain: Value = serde_json::from_str(&inputs[0].1).unwrap();
        assert_eq!(mountain["conditions"]["fresh_snow_24h_in"], 14);
        assert!(inputs[2].1.starts_with("Day quality: excellent"));
    }

    #[test]
    fn test_good_stowe_score() {
        let pred = prediction(
            Some(92.0),
            "14\" of fresh powder, great glades",
            "Long drive from Boston",
            "Best snow but longest drive",
        );
        let score = ScoreMountainEval::metric(&example("stowe_powder_day"), &pred);
        assert!((score - 1.0).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn test_missing_score_and_thin_text() {
        let pred = prediction(None, "fresh", "", "meh");
        let score = ScoreMountainEval::metric(&example("stowe_powder_day"), &pred);
        // validity 0, pros 0.5, cons 0, tradeoff 0
        assert!((score - 0.125).abs() < 1e-9, "got {score}");
    }

    #[rstest]
    #[case(85.0, 1.0)]
    #[case(100.0, 1.0)]
    #[case(70.0, 0.5)]
    #[case(65.0, 0.0)]
    fn test_range_score(#[case] score: f64, #[case] expected: f64) {
        assert_eq!(range_score(score, 80.0, 100.0), expected);
    }
}
