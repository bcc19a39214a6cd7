//! Full recommendation runs against the seed data, a replayed fixture and a
//! scripted language model.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;

use powder::agent::SkiAgent;
use powder::evals::backtest::{EstimatedDriveTime, ReplayConditions, load_fixture};
use powder::llm::{LanguageModel, LlmError, Prompt};
use powder::mountains::PassType;
use powder::pipeline::NO_MATCHES_TOP_PICK;
use powder::{MountainStore, SkiPipeline, UserLocation};

/// Replies by task name. Scores favour one mountain; the agent searches once
/// and then finishes unless `agent_finishes` is false.
struct Scripted {
    parsed: serde_json::Value,
    favourite: &'static str,
    agent_finishes: bool,
    tasks: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(parsed: serde_json::Value, favourite: &'static str) -> Self {
        Self {
            parsed,
            favourite,
            agent_finishes: true,
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn tasks(&self) -> Vec<String> {
        self.tasks.lock().unwrap().clone()
    }

    fn count(&self, task: &str) -> usize {
        self.tasks().iter().filter(|t| *t == task).count()
    }
}

#[async_trait]
impl LanguageModel for Scripted {
    fn name(&self) -> &str {
        "test/scripted"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let task = prompt
            .system
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("Task: "))
            .unwrap_or_default()
            .to_string();
        self.tasks.lock().unwrap().push(task.clone());

        let reply = match task.as_str() {
            "ParseSkiQuery" => self.parsed.clone(),
            "AssessConditions" => json!({
                "day_quality": "excellent",
                "best_available": format!("{} has the most fresh snow", self.favourite),
                "day_context": "Cold and calm, storm favoured the north",
            }),
            "ScoreMountain" => {
                let favourite = prompt.user.contains(&format!("\"name\":\"{}\"", self.favourite));
                json!({
                    "score": if favourite { 95 } else { 60 },
                    "key_pros": "fresh snow",
                    "key_cons": "drive",
                    "tradeoff_note": "Worth the drive on a day like this",
                })
            }
            "GenerateRecommendation" => json!({
                "top_pick": format!("{}: deepest fresh snow on the Ikon pass", self.favourite),
                "alternatives": "Sugarbush if you want a shorter drive",
                "caveat": "Presidents' Day crowds, arrive early",
            }),
            "SkiAgentStep" => {
                if self.agent_finishes && self.count("SkiAgentStep") > 1 {
                    json!({
                        "thought": "Enough to decide",
                        "tool": "finish",
                        "args": {"recommendation": format!("Go to {}", self.favourite)},
                    })
                } else {
                    json!({
                        "thought": "Find Ikon mountains",
                        "tool": "search_mountains",
                        "args": {"max_drive_hours": 5, "pass_type": "ikon"},
                    })
                }
            }
            "SkiRecommendation" => json!({"recommendation": "Out of steps, try Killington"}),
            other => panic!("unexpected task {other}"),
        };
        Ok(format!("```json\n{reply}\n```"))
    }
}

fn crate_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(relative)
}

fn store() -> MountainStore {
    let mountains = MountainStore::load_jsonl(&crate_path("data/mountains.jsonl")).unwrap();
    let mut store = MountainStore::in_memory().unwrap();
    store.seed(&mountains).unwrap();
    store
}

fn presidents_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 17).unwrap()
}

fn replay() -> ReplayConditions {
    let fixture = load_fixture("2025-02-17", &crate_path("fixtures")).unwrap();
    ReplayConditions::from_fixture(fixture).unwrap()
}

fn ikon_query() -> serde_json::Value {
    json!({
        "target_date": "today",
        "max_drive_hours": 5,
        "pass_type": "ikon",
        "needs_terrain_parks": false,
        "needs_glades": false,
        "needs_beginner_terrain": false,
        "needs_expert_terrain": false,
        "needs_night_skiing": false,
        "skill_level": "advanced",
        "activity": "ski",
        "vibe": "powder_chase",
    })
}

#[tokio::test]
async fn test_pipeline_runs_every_step() {
    let model = Scripted::new(ikon_query(), "Jay Peak");
    let store = store();
    let conditions = replay();
    let routes = EstimatedDriveTime;

    let outcome = SkiPipeline::new(&model, &store, &conditions, &routes)
        .run("Best powder on my Ikon pass?", presidents_day(), &UserLocation::boston())
        .await
        .unwrap();

    assert_eq!(outcome.target_date, presidents_day());
    assert!(!outcome.candidates.is_empty());
    assert!(
        outcome
            .candidates
            .iter()
            .all(|c| c.mountain.mountain.accepts_pass(PassType::Ikon))
    );

    let jay = outcome
        .candidates
        .iter()
        .find(|c| c.name() == "Jay Peak")
        .expect("Jay Peak is within five hours of Boston");
    assert!(jay.conditions.fresh_snow_24h_in > 0.0);
    assert!(jay.drive_time.duration_minutes > 0.0);

    assert_eq!(outcome.scores[0].mountain.name(), "Jay Peak");
    assert!(outcome.scores.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(outcome.top_pick.starts_with("Jay Peak"));
    assert!(outcome.crowd_context.is_some());
    assert!(outcome.render().starts_with("**Jay Peak"));

    let tasks = model.tasks();
    assert_eq!(tasks.first().map(String::as_str), Some("ParseSkiQuery"));
    assert_eq!(tasks[1], "AssessConditions");
    assert_eq!(tasks.last().map(String::as_str), Some("GenerateRecommendation"));
    assert_eq!(model.count("ScoreMountain"), outcome.candidates.len());
}

#[tokio::test]
async fn test_pipeline_stops_when_nothing_matches() {
    // Nothing within half an hour of Boston has glades
    let parsed = json!({"target_date": "tomorrow", "max_drive_hours": 0.5, "needs_glades": true});
    let model = Scripted::new(parsed, "Nashoba Valley");
    let store = store();
    let conditions = replay();
    let routes = EstimatedDriveTime;

    let outcome = SkiPipeline::new(&model, &store, &conditions, &routes)
        .run("Tree skiing after work", presidents_day(), &UserLocation::boston())
        .await
        .unwrap();

    assert_eq!(outcome.top_pick, NO_MATCHES_TOP_PICK);
    assert!(outcome.candidates.is_empty());
    assert!(outcome.day_assessment.is_none());
    assert_eq!(outcome.target_date, NaiveDate::from_ymd_opt(2025, 2, 18).unwrap());
    assert_eq!(model.tasks(), vec!["ParseSkiQuery"]);
}

#[tokio::test]
async fn test_agent_searches_then_finishes() {
    let model = Scripted::new(ikon_query(), "Jay Peak");
    let store = store();
    let conditions = replay();
    let routes = EstimatedDriveTime;

    let outcome = SkiAgent::new(&model, &store, &conditions, &routes)
        .run("Ikon powder?", presidents_day(), &UserLocation::boston())
        .await
        .unwrap();

    assert_eq!(outcome.recommendation, "Go to Jay Peak");
    assert_eq!(outcome.trajectory.len(), 1);
    assert_eq!(outcome.trajectory[0].tool, "search_mountains");
    assert!(outcome.trajectory[0].observation.contains("Jay Peak"));
    assert!(!outcome.trajectory[0].observation.contains("Stowe"));
}

#[tokio::test]
async fn test_agent_summarises_after_iteration_limit() {
    let mut model = Scripted::new(ikon_query(), "Jay Peak");
    model.agent_finishes = false;
    let store = store();
    let conditions = replay();
    let routes = EstimatedDriveTime;

    let agent = SkiAgent::new(&model, &store, &conditions, &routes);
    let outcome = agent
        .run("Ikon powder?", presidents_day(), &UserLocation::boston())
        .await
        .unwrap();

    assert_eq!(outcome.trajectory.len(), agent.max_iterations);
    assert_eq!(outcome.recommendation, "Out of steps, try Killington");
    assert_eq!(model.tasks().last().map(String::as_str), Some("SkiRecommendation"));
}
