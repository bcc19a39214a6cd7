use serde::Deserialize;

use super::{Labelled, SignatureEval, check, load_dataset, mean, present};
use crate::signatures::{ParseSkiQuery, ParsedQuery};

const DATASET: &str = include_str!("datasets/parse_query.json");

#[derive(Debug, Deserialize)]
struct Dataset {
    user_context: String,
    examples: Vec<Labelled<ParseQueryExample>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseQueryExample {
    pub query: String,
    /// Filled from the dataset header
    #[serde(default)]
    pub user_context: String,
    pub expected: ExpectedQuery,
}

/// Only the keys present in the dataset are scored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpectedQuery {
    pub target_date: Option<String>,
    pub max_drive_hours: Option<f64>,
    #[serde(default, deserialize_with = "present")]
    pub pass_type: Option<Option<String>>,
    pub needs_terrain_parks: Option<bool>,
    pub needs_glades: Option<bool>,
    pub needs_beginner_terrain: Option<bool>,
    pub needs_expert_terrain: Option<bool>,
    pub needs_night_skiing: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub skill_level: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub activity: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub vibe: Option<Option<String>>,
}

pub struct ParseQueryEval;

impl SignatureEval for ParseQueryEval {
    type Sig = ParseSkiQuery;
    type Example = ParseQueryExample;

    fn examples() -> anyhow::Result<Vec<Labelled<ParseQueryExample>>> {
        let dataset: Dataset = load_dataset("parse_query", DATASET)?;
        Ok(dataset
            .examples
            .into_iter()
            .map(|mut row| {
                row.example.user_context.clone_from(&dataset.user_context);
                row
            })
            .collect())
    }

    fn inputs(example: &ParseQueryExample) -> Vec<(&'static str, String)> {
        vec![
            ("query", example.query.clone()),
            ("user_context", example.user_context.clone()),
        ]
    }

    fn metric(example: &ParseQueryExample, parsed: &ParsedQuery) -> f64 {
        let expected = &example.expected;
        let mut scores = Vec::new();

        let booleans = [
            (expected.needs_terrain_parks, parsed.needs_terrain_parks),
            (expected.needs_glades, parsed.needs_glades),
            (expected.needs_beginner_terrain, parsed.needs_beginner_terrain),
            (expected.needs_expert_terrain, parsed.needs_expert_terrain),
            (expected.needs_night_skiing, parsed.needs_night_skiing),
        ];
        for (want, got) in booleans {
            if let Some(want) = want {
                scores.push(check(want == got));
            }
        }

        let enums = [
            (&expected.pass_type, parsed.pass_type.map(|p| p.as_str())),
            (&expected.skill_level, parsed.skill_level.map(|s| s.as_str())),
            (&expected.activity, parsed.activity.map(|a| a.as_str())),
            (&expected.vibe, parsed.vibe.map(|v| v.as_str())),
        ];
        for (want, got) in enums {
            if let Some(want) = want {
                scores.push(enum_score(want.as_deref(), got));
            }
        }

        if let Some(want) = expected.max_drive_hours {
            scores.push(drive_hours_score(want, parsed.max_drive_hours));
        }

        if let Some(want) = &expected.target_date {
            scores.push(date_score(want, &parsed.target_date));
        }

        mean(&scores)
    }
}

fn normalize_enum(value: &str) -> String {
    value.to_lowercase().replace(['_', '-'], "")
}

fn enum_score(expected: Option<&str>, actual: Option<&str>) -> f64 {
    match (expected, actual) {
        (None, actual) => check(actual.is_none()),
        (Some(_), None) => 0.0,
        (Some(want), Some(got)) => check(normalize_enum(want) == normalize_enum(got)),
    }
}

fn drive_hours_score(expected: f64, actual: Option<f64>) -> f64 {
    let Some(actual) = actual else {
        return 0.0;
    };
    let diff = (actual - expected).abs();
    if diff < 0.1 {
        1.0
    } else if diff < 0.5 {
        0.5
    } else {
        0.0
    }
}

/// Relative dates are judged against the dataset's fixed "today" of 2025-01-15
fn date_score(expected: &str, actual: &str) -> f64 {
    let expected = expected.trim().to_lowercase();
    let actual = actual.trim().to_lowercase();

    let matched = actual == expected
        || (expected == "today" && actual == "2025-01-15")
        || (expected == "tomorrow" && actual == "2025-01-16");
    check(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mountains::PassType;
    use crate::signatures::{Activity, SkillLevel, Vibe};
    use rstest::rstest;

    fn parsed() -> ParsedQuery {
        ParsedQuery {
            target_date: "today".to_string(),
            max_drive_hours: Some(3.0),
            pass_type: Some(PassType::Ikon),
            needs_terrain_parks: false,
            needs_glades: false,
            needs_beginner_terrain: false,
            needs_expert_terrain: false,
            needs_night_skiing: false,
            skill_level: None,
            activity: None,
            vibe: Some(Vibe::PowderChase),
        }
    }

    fn example(id: &str) -> ParseQueryExample {
        ParseQueryEval::examples()
            .unwrap()
            .into_iter()
            .find(|row| row.id == id)
            .unwrap()
            .example
    }

    #[test]
    fn test_dataset_split_sizes() {
        assert_eq!(ParseQueryEval::trainset().unwrap().len(), 9);
        assert_eq!(ParseQueryEval::valset().unwrap().len(), 3);
    }

    #[test]
    fn test_user_context_is_attached() {
        let example = example("powder_chase");
        assert!(example.user_context.contains("2025-01-15"));
        let inputs = ParseQueryEval::inputs(&example);
        assert_eq!(inputs[0].0, "query");
        assert_eq!(inputs[1].0, "user_context");
    }

    #[test]
    fn test_perfect_parse_scores_one() {
        let score = ParseQueryEval::metric(&example("powder_chase"), &parsed());
        assert!((score - 1.0).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn test_resolved_date_counts_as_today() {
        let mut prediction = parsed();
        prediction.target_date = "2025-01-15".to_string();
        let score = ParseQueryEval::metric(&example("powder_chase"), &prediction);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_wrong_fields_lower_score() {
        let mut prediction = parsed();
        prediction.pass_type = Some(PassType::Epic);
        prediction.needs_glades = true;
        let score = ParseQueryEval::metric(&example("powder_chase"), &prediction);
        // 9 checks, 2 wrong
        assert!((score - 7.0 / 9.0).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn test_snowboarder_example() {
        let prediction = ParsedQuery {
            needs_terrain_parks: true,
            skill_level: Some(SkillLevel::Expert),
            activity: Some(Activity::Snowboard),
            vibe: Some(Vibe::ParkDay),
            pass_type: None,
            max_drive_hours: None,
            ..parsed()
        };
        let score = ParseQueryEval::metric(&example("snowboarder"), &prediction);
        assert!(score > 0.8, "got {score}");
    }

    #[rstest]
    #[case(3.0, Some(3.05), 1.0)]
    #[case(3.0, Some(3.3), 0.5)]
    #[case(3.0, Some(4.0), 0.0)]
    #[case(3.0, None, 0.0)]
    fn test_drive_hours_tolerance(#[case] want: f64, #[case] got: Option<f64>, #[case] expected: f64) {
        assert_eq!(drive_hours_score(want, got), expected);
    }

    #[rstest]
    #[case(Some("powder_chase"), Some("powder-chase"), 1.0)]
    #[case(Some("ikon"), Some("IKON"), 1.0)]
    #[case(Some("ikon"), None, 0.0)]
    #[case(None, None, 1.0)]
    #[case(None, Some("epic"), 0.0)]
    fn test_enum_score(#[case] want: Option<&str>, #[case] got: Option<&str>, #[case] expected: f64) {
        assert_eq!(enum_score(want, got), expected);
    }

    #[rstest]
    #[case("tomorrow", "2025-01-16", 1.0)]
    #[case("tomorrow", "Tomorrow", 1.0)]
    #[case("2025-01-20", "2025-01-20", 1.0)]
    #[case("today", "2025-01-16", 0.0)]
    fn test_date_score(#[case] want: &str, #[case] got: &str, #[case] expected: f64) {
        assert_eq!(date_score(want, got), expected);
    }
}
