//! Offline evaluation of the recommender.
//!
//! Each structured stage has a small labelled dataset and a deterministic
//! metric. The end-to-end suite replays recorded weather snapshots through
//! the whole pipeline.

use anyhow::Context;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use crate::signatures::Signature;

pub mod assess_conditions;
pub mod backtest;
pub mod end_to_end;
pub mod fetch_historic;
pub mod generate_recommendation;
pub mod interesting_days;
pub mod parse_query;
pub mod runner;
pub mod score_mountain;

/// Which half of a dataset an example belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
}

/// A dataset row with its id and split
#[derive(Debug, Clone, Deserialize)]
pub struct Labelled<T> {
    pub id: String,
    pub split: Split,
    #[serde(flatten)]
    pub example: T,
}

/// A labelled dataset for one signature, scored without a model in the loop
pub trait SignatureEval {
    type Sig: Signature;
    type Example;

    fn examples() -> anyhow::Result<Vec<Labelled<Self::Example>>>;

    /// Named inputs handed to the signature
    fn inputs(example: &Self::Example) -> Vec<(&'static str, String)>;

    /// Score in `0.0..=1.0`
    fn metric(example: &Self::Example, prediction: &<Self::Sig as Signature>::Output) -> f64;

    fn split(split: Split) -> anyhow::Result<Vec<Labelled<Self::Example>>> {
        Ok(Self::examples()?
            .into_iter()
            .filter(|e| e.split == split)
            .collect())
    }

    fn trainset() -> anyhow::Result<Vec<Labelled<Self::Example>>> {
        Self::split(Split::Train)
    }

    fn valset() -> anyhow::Result<Vec<Labelled<Self::Example>>> {
        Self::split(Split::Val)
    }
}

/// Parse a bundled dataset
pub(crate) fn load_dataset<T: DeserializeOwned>(name: &str, json: &str) -> anyhow::Result<T> {
    serde_json::from_str(json).with_context(|| format!("Malformed eval dataset '{name}'"))
}

/// Distinguishes an absent key (`None`) from an explicit `null` (`Some(None)`)
pub(crate) fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub(crate) fn check(passed: bool) -> f64 {
    if passed { 1.0 } else { 0.0 }
}

pub(crate) fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// Case-insensitive substring test
pub(crate) fn mentions(text: &str, needle: &str) -> bool {
    text.to_lowercase().contains(&needle.to_lowercase())
}

pub(crate) fn mentions_any(text: &str, needles: &[&str]) -> bool {
    let text = text.to_lowercase();
    needles.iter().any(|n| text.contains(&n.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_nothing_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 0.0, 0.5]), 0.5);
    }

    #[test]
    fn test_mentions_ignores_case() {
        assert!(mentions("Head to STOWE early", "stowe"));
        assert!(mentions_any("Bitter wind chill", &["cold", "bitter"]));
        assert!(!mentions_any("Sunny and mild", &["cold", "bitter"]));
    }

    #[test]
    fn test_present_distinguishes_null_from_missing() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(default, deserialize_with = "present")]
            vibe: Option<Option<String>>,
        }
        let missing: Row = serde_json::from_str("{}").unwrap();
        let null: Row = serde_json::from_str(r#"{"vibe": null}"#).unwrap();
        let set: Row = serde_json::from_str(r#"{"vibe": "casual"}"#).unwrap();
        assert_eq!(missing.vibe, None);
        assert_eq!(null.vibe, Some(None));
        assert_eq!(set.vibe, Some(Some("casual".to_string())));
    }
}
