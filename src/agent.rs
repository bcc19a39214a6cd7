//! Tool-using recommendation mode.
//!
//! The model drives a ReAct loop: each turn it picks one tool, we run it and
//! append the observation to the trajectory. The loop ends on `finish` or
//! after [`MAX_ITERATIONS`] turns, in which case a final
//! `SkiRecommendation` prediction summarises what was gathered.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::geo::{Point, estimate_max_distance_km};
use crate::llm::LanguageModel;
use crate::location::UserLocation;
use crate::mountains::{MountainSearch, MountainStore, PassType};
use crate::pipeline::DEFAULT_MAX_DRIVE_HOURS;
use crate::providers::{ConditionsProvider, DriveTimeProvider};
use crate::signatures::{SkiAgentStep, SkiRecommendation, predict};

pub const MAX_ITERATIONS: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct AgentStep {
    pub thought: String,
    pub tool: String,
    pub args: Value,
    pub observation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    pub recommendation: String,
    pub trajectory: Vec<AgentStep>,
}

pub struct SkiAgent<'a> {
    pub model: &'a dyn LanguageModel,
    pub store: &'a MountainStore,
    pub conditions: &'a dyn ConditionsProvider,
    pub routes: &'a dyn DriveTimeProvider,
    pub max_iterations: usize,
}

fn arg_f64(args: &Value, key: &str) -> Option<f64> {
    match args.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn arg_str<'v>(args: &'v Value, key: &str) -> Option<&'v str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
}

fn render_trajectory(steps: &[AgentStep]) -> String {
    if steps.is_empty() {
        return "(no tool calls yet)".to_string();
    }
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            format!(
                "Step {}\nThought: {}\nTool: {}\nArgs: {}\nObservation: {}",
                i + 1,
                step.thought,
                step.tool,
                step.args,
                step.observation
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl<'a> SkiAgent<'a> {
    pub fn new(
        model: &'a dyn LanguageModel,
        store: &'a MountainStore,
        conditions: &'a dyn ConditionsProvider,
        routes: &'a dyn DriveTimeProvider,
    ) -> Self {
        Self {
            model,
            store,
            conditions,
            routes,
            max_iterations: MAX_ITERATIONS,
        }
    }

    pub async fn run(
        &self,
        query: &str,
        current_date: NaiveDate,
        location: &UserLocation,
    ) -> Result<AgentOutcome> {
        let user_context = location.user_context(current_date);
        let mut trajectory: Vec<AgentStep> = Vec::new();

        for iteration in 0..self.max_iterations {
            let turn = predict::<SkiAgentStep>(
                self.model,
                &[
                    ("query", query.to_string()),
                    ("user_context", user_context.clone()),
                    ("trajectory", render_trajectory(&trajectory)),
                ],
            )
            .await
            .with_context(|| format!("Agent step {} failed", iteration + 1))?;

            let tool = turn.tool.trim().to_lowercase();
            debug!(iteration, tool = %tool, thought = %turn.thought, "Agent turn");

            if tool == "finish" {
                if let Some(answer) = arg_str(&turn.args, "recommendation") {
                    info!(steps = trajectory.len(), "Agent finished");
                    return Ok(AgentOutcome {
                        recommendation: answer.to_string(),
                        trajectory,
                    });
                }
                trajectory.push(AgentStep {
                    thought: turn.thought,
                    tool,
                    args: turn.args,
                    observation: "Completed.".to_string(),
                });
                break;
            }

            let observation = match self
                .call_tool(&tool, &turn.args, current_date, location)
                .await
            {
                Ok(observation) => observation,
                Err(err) => {
                    warn!(tool = %tool, error = %err, "Tool call failed");
                    format!("Error: {err:#}")
                }
            };
            trajectory.push(AgentStep {
                thought: turn.thought,
                tool,
                args: turn.args,
                observation,
            });
        }

        let answer = predict::<SkiRecommendation>(
            self.model,
            &[
                ("query", query.to_string()),
                ("user_context", user_context),
                ("trajectory", render_trajectory(&trajectory)),
            ],
        )
        .await
        .context("Failed to produce the final recommendation")?;

        Ok(AgentOutcome {
            recommendation: answer.recommendation,
            trajectory,
        })
    }

    async fn call_tool(
        &self,
        tool: &str,
        args: &Value,
        current_date: NaiveDate,
        location: &UserLocation,
    ) -> Result<String> {
        match tool {
            "search_mountains" => self.search_mountains(args, location),
            "get_mountain_conditions" => self.mountain_conditions(args, current_date).await,
            "get_driving_time" => self.driving_time(args, location).await,
            other => anyhow::bail!(
                "Unknown tool '{other}', use search_mountains, get_mountain_conditions, get_driving_time or finish"
            ),
        }
    }

    fn search_mountains(&self, args: &Value, location: &UserLocation) -> Result<String> {
        let hours = arg_f64(args, "max_drive_hours").unwrap_or(DEFAULT_MAX_DRIVE_HOURS);
        let pass_type = match arg_str(args, "pass_type") {
            Some(pass) => Some(pass.parse::<PassType>().map_err(anyhow::Error::msg)?),
            None => None,
        };
        let origin = Point::new(
            arg_f64(args, "user_lat").unwrap_or(location.lat),
            arg_f64(args, "user_lon").unwrap_or(location.lon),
        );

        let search = MountainSearch::around(origin)
            .within_km(estimate_max_distance_km(hours))
            .with_pass(pass_type);
        let results = self.store.search(&search)?;
        Ok(serde_json::to_string_pretty(&results)?)
    }

    async fn mountain_conditions(&self, args: &Value, current_date: NaiveDate) -> Result<String> {
        let mountain = match arg_str(args, "mountain_name").or_else(|| arg_str(args, "name")) {
            Some(name) => self
                .store
                .find_by_name(name)?
                .with_context(|| format!("Mountain not found: {name}"))?,
            None => {
                let lat = arg_f64(args, "lat").context("get_mountain_conditions needs mountain_name or lat/lon")?;
                let lon = arg_f64(args, "lon").context("get_mountain_conditions needs lon with lat")?;
                self.store
                    .nearest(Point::new(lat, lon))?
                    .context("No mountains in the database")?
            }
        };

        let date = match arg_str(args, "target_date") {
            Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("Invalid target_date '{date}', expected YYYY-MM-DD"))?,
            None => current_date,
        };

        let conditions = self.conditions.conditions(&mountain, date).await?;
        Ok(serde_json::to_string_pretty(&conditions)?)
    }

    async fn driving_time(&self, args: &Value, location: &UserLocation) -> Result<String> {
        let origin = Point::new(
            arg_f64(args, "start_lat").unwrap_or(location.lat),
            arg_f64(args, "start_lon").unwrap_or(location.lon),
        );
        let destination = Point::new(
            arg_f64(args, "end_lat").context("get_driving_time needs end_lat")?,
            arg_f64(args, "end_lon").context("get_driving_time needs end_lon")?,
        );
        let drive_time = self.routes.drive_time(origin, destination).await?;
        Ok(serde_json::to_string_pretty(&drive_time)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evals::backtest::{EstimatedDriveTime, FixtureConditions, ReplayConditions};
    use crate::llm::{LlmError, Prompt};
    use crate::mountains::test_support::mountain;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;

    struct Unused;

    #[async_trait]
    impl LanguageModel for Unused {
        fn name(&self) -> &str {
            "test/unused"
        }

        async fn complete(&self, _prompt: &Prompt) -> Result<String, LlmError> {
            Err(LlmError::EmptyContent)
        }
    }

    #[tokio::test]
    async fn test_conditions_tool_resolves_coordinates_to_nearest_mountain() {
        let mut store = MountainStore::in_memory().unwrap();
        store
            .seed(&[
                mountain("Stowe", "VT", 44.5258, -72.7858, "epic"),
                mountain("Killington", "VT", 43.6045, -72.8201, "ikon"),
            ])
            .unwrap();
        let conditions = ReplayConditions::new(HashMap::from([(
            "Killington".to_string(),
            FixtureConditions {
                fresh_snow_24h_in: Some(9.0),
                ..FixtureConditions::default()
            },
        )]));
        let routes = EstimatedDriveTime;
        let agent = SkiAgent::new(&Unused, &store, &conditions, &routes);
        let date = NaiveDate::from_ymd_opt(2025, 2, 17).unwrap();

        let by_coordinates = agent
            .mountain_conditions(&json!({"lat": 43.62, "lon": "-72.80", "target_date": "2025-02-17"}), date)
            .await
            .unwrap();
        let by_name = agent
            .mountain_conditions(&json!({"mountain_name": "killington"}), date)
            .await
            .unwrap();
        assert_eq!(by_coordinates, by_name);
        assert!(by_coordinates.contains("\"fresh_snow_24h_in\": 9.0"));

        let err = agent.mountain_conditions(&json!({"lat": 43.62}), date).await.unwrap_err();
        assert!(err.to_string().contains("lon"));
    }

    #[test]
    fn test_arg_helpers_accept_strings() {
        let args = json!({"max_drive_hours": "2.5", "user_lat": 44.1, "pass_type": "null", "name": " Stowe "});
        assert_eq!(arg_f64(&args, "max_drive_hours"), Some(2.5));
        assert_eq!(arg_f64(&args, "user_lat"), Some(44.1));
        assert_eq!(arg_f64(&args, "missing"), None);
        assert_eq!(arg_str(&args, "pass_type"), None);
        assert_eq!(arg_str(&args, "name"), Some("Stowe"));
    }

    #[test]
    fn test_render_trajectory() {
        assert_eq!(render_trajectory(&[]), "(no tool calls yet)");
        let steps = vec![AgentStep {
            thought: "Find mountains".to_string(),
            tool: "search_mountains".to_string(),
            args: json!({"max_drive_hours": 3.0}),
            observation: "[]".to_string(),
        }];
        assert_eq!(
            render_trajectory(&steps),
            "Step 1\nThought: Find mountains\nTool: search_mountains\nArgs: {\"max_drive_hours\":3.0}\nObservation: []"
        );
    }
}
