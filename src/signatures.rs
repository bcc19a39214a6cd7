//! Structured LLM stages.
//!
//! Each stage is a [`Signature`]: a task name, instructions, named input and
//! output fields, and the typed output the JSON reply is decoded into.
//! Model replies are decoded leniently since models return `"true"`,
//! `"null"` or lists where scalars were asked for.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::llm::{LanguageModel, LlmError, Prompt, extract_json};
use crate::mountains::PassType;

/// A named prompt field with its description
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub desc: &'static str,
}

const fn field(name: &'static str, desc: &'static str) -> Field {
    Field { name, desc }
}

pub trait Signature {
    const NAME: &'static str;
    const INSTRUCTIONS: &'static str;
    const INPUTS: &'static [Field];
    const OUTPUTS: &'static [Field];
    type Output: DeserializeOwned;
}

/// Render the system and user prompt for a signature
pub fn render_prompt<S: Signature>(inputs: &[(&str, String)]) -> Prompt {
    let describe = |fields: &[Field]| {
        fields
            .iter()
            .map(|f| {
                if f.desc.is_empty() {
                    format!("- {}", f.name)
                } else {
                    format!("- {}: {}", f.name, f.desc)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    let output_names = S::OUTPUTS
        .iter()
        .map(|f| format!("\"{}\"", f.name))
        .collect::<Vec<_>>()
        .join(", ");

    let system = format!(
        "Task: {}\n{}\n\nInput fields:\n{}\n\nOutput fields:\n{}\n\n\
         Respond with a single JSON object with the keys {output_names} and nothing else.",
        S::NAME,
        S::INSTRUCTIONS,
        describe(S::INPUTS),
        describe(S::OUTPUTS),
    );

    let user = inputs
        .iter()
        .map(|(name, value)| format!("[[ ## {name} ## ]]\n{value}"))
        .collect::<Vec<_>>()
        .join("\n\n");

    Prompt::new(system, user)
}

/// Run one signature against the model and decode its output
pub async fn predict<S: Signature>(
    model: &dyn LanguageModel,
    inputs: &[(&str, String)],
) -> Result<S::Output, LlmError> {
    let prompt = render_prompt::<S>(inputs);
    let text = model.complete(&prompt).await?;
    debug!(signature = S::NAME, chars = text.len(), "Model replied");
    decode::<S>(&text)
}

/// Decode a raw model reply for a signature
pub fn decode<S: Signature>(text: &str) -> Result<S::Output, LlmError> {
    let json = extract_json(text).ok_or_else(|| LlmError::NoJson(truncate(text, 200)))?;
    Ok(serde_json::from_str(json)?)
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &text[..i]),
        None => text.to_string(),
    }
}

// ---- lenient field decoding ----

fn is_null_word(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "" | "null" | "none" | "n/a")
}

fn de_opt_enum<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !is_null_word(&s) => s.parse().ok(),
        _ => None,
    })
}

fn de_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

fn de_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if is_null_word(&s) => Ok(None),
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected a number, got '{s}'"))),
        Value::Null => Ok(None),
        other => Err(de::Error::custom(format!("expected a number, got {other}"))),
    }
}

fn de_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    })
}

fn de_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let text = de_text(deserializer)?;
    Ok(if is_null_word(&text) {
        "unspecified".to_string()
    } else {
        text.trim().to_string()
    })
}

fn unspecified() -> String {
    "unspecified".to_string()
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase().replace(['-', ' '], "_")
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match normalize(s).as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{other}'", stringify!($name))),
                }
            }
        }
    };
}

text_enum!(
    /// Self-described ability
    SkillLevel {
        Beginner => "beginner",
        Intermediate => "intermediate",
        Advanced => "advanced",
        Expert => "expert",
    }
);

text_enum!(
    Activity {
        Ski => "ski",
        Snowboard => "snowboard",
        Either => "either",
    }
);

text_enum!(
    /// What kind of day the user is after
    Vibe {
        PowderChase => "powder_chase",
        Casual => "casual",
        ParkDay => "park_day",
        Learning => "learning",
        FamilyDay => "family_day",
    }
);

// ---- ParseSkiQuery ----

/// Hard filters and soft preferences extracted from a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    #[serde(default = "unspecified", deserialize_with = "de_date")]
    pub target_date: String,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub max_drive_hours: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_enum")]
    pub pass_type: Option<PassType>,
    #[serde(default, deserialize_with = "de_bool")]
    pub needs_terrain_parks: bool,
    #[serde(default, deserialize_with = "de_bool")]
    pub needs_glades: bool,
    #[serde(default, deserialize_with = "de_bool")]
    pub needs_beginner_terrain: bool,
    #[serde(default, deserialize_with = "de_bool")]
    pub needs_expert_terrain: bool,
    #[serde(default, deserialize_with = "de_bool")]
    pub needs_night_skiing: bool,
    #[serde(default, deserialize_with = "de_opt_enum")]
    pub skill_level: Option<SkillLevel>,
    #[serde(default, deserialize_with = "de_opt_enum")]
    pub activity: Option<Activity>,
    #[serde(default, deserialize_with = "de_opt_enum")]
    pub vibe: Option<Vibe>,
}

impl ParsedQuery {
    /// Soft preferences handed to the assessment and scoring stages
    #[must_use]
    pub fn preferences(&self) -> Value {
        serde_json::json!({
            "skill_level": self.skill_level,
            "activity": self.activity,
            "vibe": self.vibe,
            "needs_terrain_parks": self.needs_terrain_parks,
            "needs_glades": self.needs_glades,
            "needs_beginner_terrain": self.needs_beginner_terrain,
            "needs_expert_terrain": self.needs_expert_terrain,
        })
    }
}

pub struct ParseSkiQuery;

impl Signature for ParseSkiQuery {
    const NAME: &'static str = "ParseSkiQuery";
    const INSTRUCTIONS: &'static str = "Extract structured constraints from natural language ski query.\n\n\
        Separates HARD FILTERS (used to exclude mountains from DB) from\n\
        SOFT PREFERENCES (used to score/rank candidates).";
    const INPUTS: &'static [Field] = &[
        field("query", ""),
        field("user_context", "Current date, location defaults"),
    ];
    const OUTPUTS: &'static [Field] = &[
        field("target_date", "YYYY-MM-DD, 'today', 'tomorrow', or 'unspecified' if no date mentioned"),
        field("max_drive_hours", "Max drive time, null if not specified"),
        field("pass_type", "epic/ikon/indy or null"),
        field(
            "needs_terrain_parks",
            "True if mentions park, jumps, rails, boxes, halfpipe, pipe, features, freestyle",
        ),
        field("needs_glades", "True if mentions glades, trees, tree skiing, woods, forest"),
        field(
            "needs_beginner_terrain",
            "True if mentions beginner, first-timer, learning, never skied, bunny hill, magic carpet",
        ),
        field(
            "needs_expert_terrain",
            "True if mentions double blacks, expert, extreme, steeps, cliffs, chutes",
        ),
        field("needs_night_skiing", "True if mentions night skiing, evening, after work, lights"),
        field("skill_level", "beginner/intermediate/advanced/expert or null"),
        field("activity", "ski/snowboard/either or null"),
        field("vibe", "powder_chase/casual/park_day/learning/family_day or null"),
    ];
    type Output = ParsedQuery;
}

// ---- AssessConditions ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayAssessment {
    /// excellent, good, fair, poor or stay_home
    #[serde(default, deserialize_with = "de_text")]
    pub day_quality: String,
    #[serde(default, deserialize_with = "de_text")]
    pub best_available: String,
    #[serde(default, deserialize_with = "de_text")]
    pub day_context: String,
}

impl DayAssessment {
    pub const QUALITIES: &'static [&'static str] = &["excellent", "good", "fair", "poor", "stay_home"];

    /// Shared context block for the scoring stage
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Day quality: {}\nBest available: {}\nContext: {}",
            self.day_quality, self.best_available, self.day_context
        )
    }
}

pub struct AssessConditions;

impl Signature for AssessConditions {
    const NAME: &'static str = "AssessConditions";
    const INSTRUCTIONS: &'static str = "Assess overall ski conditions across all candidates for the target date.\n\n\
        Creates shared context for scoring - prevents redundant per-mountain reasoning.";
    const INPUTS: &'static [Field] = &[
        field("all_candidates", "JSON of all candidates with conditions"),
        field("user_preferences", "Parsed preferences from query"),
    ];
    const OUTPUTS: &'static [Field] = &[
        field("day_quality", "excellent/good/fair/poor/stay_home"),
        field("best_available", "Key fact: e.g. 'Stowe has 15\" fresh, everyone else <5\"'"),
        field("day_context", "Notable factors: wind, temp, visibility patterns across region"),
    ];
    type Output = DayAssessment;
}

// ---- ScoreMountain ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountainScore {
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "de_text")]
    pub key_pros: String,
    #[serde(default, deserialize_with = "de_text")]
    pub key_cons: String,
    #[serde(default, deserialize_with = "de_text")]
    pub tradeoff_note: String,
}

pub struct ScoreMountain;

impl Signature for ScoreMountain {
    const NAME: &'static str = "ScoreMountain";
    const INSTRUCTIONS: &'static str = "Score a single mountain given conditions, preferences, and day context.\n\n\
        Applies contextual boosts (e.g., glades on windy days, gondola on cold days).";
    const INPUTS: &'static [Field] = &[
        field("mountain", "Mountain data with current conditions"),
        field("user_preferences", "Parsed preferences from query"),
        field("day_context", "Overall day quality and mode"),
    ];
    const OUTPUTS: &'static [Field] = &[
        field("score", "0-100 appeal score"),
        field("key_pros", "Top 2-3 reasons to go here"),
        field("key_cons", "Top 1-2 drawbacks"),
        field("tradeoff_note", "Notable tradeoff, e.g. 'best snow but longest drive'"),
    ];
    type Output = MountainScore;
}

// ---- GenerateRecommendation ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default, deserialize_with = "de_text")]
    pub top_pick: String,
    #[serde(default, deserialize_with = "de_text")]
    pub alternatives: String,
    #[serde(default, deserialize_with = "de_text")]
    pub caveat: String,
}

pub struct GenerateRecommendation;

impl Signature for GenerateRecommendation {
    const NAME: &'static str = "GenerateRecommendation";
    const INSTRUCTIONS: &'static str = "Generate final recommendation with tradeoff analysis.\n\n\
        Uses day context to frame appropriately (chase powder vs minimize hassle).";
    const INPUTS: &'static [Field] = &[
        field("query", "Original user query"),
        field("day_assessment", "Overall conditions and mode"),
        field("scored_candidates", "Mountains with scores and tradeoffs"),
        field("crowd_context", "Holiday/vacation week info"),
    ];
    const OUTPUTS: &'static [Field] = &[
        field("top_pick", "Primary recommendation with reasoning"),
        field("alternatives", "1-2 alternatives with tradeoff explanation"),
        field("caveat", "Any important caveat, e.g. 'but tomorrow looks better'"),
    ];
    type Output = Recommendation;
}

// ---- SkiRecommendation (agent mode) ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAnswer {
    #[serde(default, deserialize_with = "de_text")]
    pub recommendation: String,
}

pub struct SkiRecommendation;

impl Signature for SkiRecommendation {
    const NAME: &'static str = "SkiRecommendation";
    const INSTRUCTIONS: &'static str = "Given a user's ski/snowboard query and context, recommend the best mountain(s) to visit.\n\n\
        Consider factors like:\n\
        - Fresh snow and conditions at each mountain\n\
        - Drive time from user's location\n\
        - User's skill level and terrain preferences\n\
        - Pass type (Epic, Ikon, Indy) if mentioned\n\
        - Weather conditions (temperature, wind, visibility)";
    const INPUTS: &'static [Field] = &[
        field("query", "User's natural language query about where to ski/snowboard"),
        field("user_context", "Context like current date, location, and any user preferences"),
    ];
    const OUTPUTS: &'static [Field] = &[field(
        "recommendation",
        "Top 1-3 mountain recommendations with reasoning for each. Include snow conditions, drive time, and why it's a good fit.",
    )];
    type Output = AgentAnswer;
}

// ---- SkiAgentStep (one ReAct turn) ----

/// The agent's next move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTurn {
    #[serde(default, deserialize_with = "de_text")]
    pub thought: String,
    #[serde(default, deserialize_with = "de_text")]
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

pub struct SkiAgentStep;

impl Signature for SkiAgentStep {
    const NAME: &'static str = "SkiAgentStep";
    const INSTRUCTIONS: &'static str = "Given a user's ski/snowboard query and context, recommend the best mountain(s) to visit.\n\n\
        You are given the trajectory of tool calls so far. Pick the next tool to call.\n\
        Available tools:\n\
        - search_mountains(max_drive_hours=3.0, pass_type=null, user_lat, user_lon): mountains within driving distance, \
        optionally filtered by pass ('epic', 'ikon' or 'indy')\n\
        - get_mountain_conditions(mountain_name or lat/lon, target_date=null): temperature, wind, visibility, snow depth and \
        fresh snow for a mountain on a YYYY-MM-DD date (default today)\n\
        - get_driving_time(start_lat, start_lon, end_lat, end_lon): driving minutes and distance\n\
        - finish(recommendation): stop and give the final answer\n\
        Consider fresh snow, drive time, skill level and terrain, pass type and weather.";
    const INPUTS: &'static [Field] = &[
        field("query", "User's natural language query about where to ski/snowboard"),
        field("user_context", "Context like current date, location, and any user preferences"),
        field("trajectory", "Tool calls made so far with their observations"),
    ];
    const OUTPUTS: &'static [Field] = &[
        field("thought", "Reasoning about what to do next"),
        field("tool", "search_mountains, get_mountain_conditions, get_driving_time or finish"),
        field("args", "JSON object of arguments for the tool"),
    ];
    type Output = AgentTurn;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_render_prompt_names_task_and_fields() {
        let prompt = render_prompt::<ScoreMountain>(&[
            ("mountain", "{\"name\": \"Stowe\"}".to_string()),
            ("user_preferences", "{}".to_string()),
            ("day_context", "Day quality: good".to_string()),
        ]);
        assert!(prompt.system.starts_with("Task: ScoreMountain\n"));
        assert!(prompt.system.contains("- score: 0-100 appeal score"));
        assert!(prompt.system.contains("\"tradeoff_note\""));
        assert!(prompt.user.starts_with("[[ ## mountain ## ]]\n{\"name\": \"Stowe\"}"));
        assert!(prompt.user.contains("\n\n[[ ## day_context ## ]]\nDay quality: good"));
    }

    #[test]
    fn test_parsed_query_lenient_decoding() {
        let text = r#"```json
        {
            "target_date": "tomorrow",
            "max_drive_hours": "2.5",
            "pass_type": "Ikon",
            "needs_terrain_parks": "true",
            "needs_glades": false,
            "needs_beginner_terrain": "False",
            "needs_expert_terrain": null,
            "needs_night_skiing": 0,
            "skill_level": "null",
            "activity": "Snowboard",
            "vibe": "powder-chase"
        }
        ```"#;
        let parsed = decode::<ParseSkiQuery>(text).unwrap();
        assert_eq!(parsed.target_date, "tomorrow");
        assert_eq!(parsed.max_drive_hours, Some(2.5));
        assert_eq!(parsed.pass_type, Some(PassType::Ikon));
        assert!(parsed.needs_terrain_parks);
        assert!(!parsed.needs_beginner_terrain);
        assert!(!parsed.needs_expert_terrain);
        assert_eq!(parsed.skill_level, None);
        assert_eq!(parsed.activity, Some(Activity::Snowboard));
        assert_eq!(parsed.vibe, Some(Vibe::PowderChase));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let parsed = decode::<ParseSkiQuery>("{}").unwrap();
        assert_eq!(parsed.target_date, "unspecified");
        assert_eq!(parsed.max_drive_hours, None);
        assert!(!parsed.needs_glades);
    }

    #[test]
    fn test_score_from_string_and_lists_joined() {
        let text = r#"{"score": "82", "key_pros": ["fresh snow", "short lift lines"], "key_cons": "long drive", "tradeoff_note": null}"#;
        let score = decode::<ScoreMountain>(text).unwrap();
        assert_eq!(score.score, Some(82.0));
        assert_eq!(score.key_pros, "fresh snow; short lift lines");
        assert_eq!(score.tradeoff_note, "");
    }

    #[test]
    fn test_unparseable_score_is_an_error() {
        let err = decode::<ScoreMountain>(r#"{"score": "high"}"#).unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }

    #[test]
    fn test_no_json_is_reported() {
        let err = decode::<GenerateRecommendation>("I recommend Stowe.").unwrap_err();
        assert!(matches!(err, LlmError::NoJson(_)));
    }

    #[rstest]
    #[case("Family Day", Some(Vibe::FamilyDay))]
    #[case("park_day", Some(Vibe::ParkDay))]
    #[case("party", None)]
    fn test_vibe_parsing(#[case] input: &str, #[case] expected: Option<Vibe>) {
        assert_eq!(input.parse::<Vibe>().ok(), expected);
    }

    #[test]
    fn test_preferences_json() {
        let mut parsed = decode::<ParseSkiQuery>("{}").unwrap();
        parsed.skill_level = Some(SkillLevel::Expert);
        parsed.needs_glades = true;
        let prefs = parsed.preferences();
        assert_eq!(prefs["skill_level"], "expert");
        assert!(prefs["activity"].is_null());
        assert_eq!(prefs["needs_glades"], true);
        assert!(prefs.get("needs_night_skiing").is_none());
    }

    #[test]
    fn test_agent_turn_decoding() {
        let turn = decode::<SkiAgentStep>(
            r#"Thinking... {"thought": "Look for Ikon mountains", "tool": "search_mountains", "args": {"pass_type": "ikon"}}"#,
        )
        .unwrap();
        assert_eq!(turn.tool, "search_mountains");
        assert_eq!(turn.args["pass_type"], "ikon");

        let finish = decode::<SkiAgentStep>(r#"{"thought": "done", "tool": "finish"}"#).unwrap();
        assert!(finish.args.is_null());
    }

    #[test]
    fn test_day_assessment_summary() {
        let assessment = DayAssessment {
            day_quality: "good".to_string(),
            best_available: "Jay Peak has 8\" fresh".to_string(),
            day_context: "Windy up north".to_string(),
        };
        assert_eq!(
            assessment.summary(),
            "Day quality: good\nBest available: Jay Peak has 8\" fresh\nContext: Windy up north"
        );
    }
}
