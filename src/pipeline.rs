//! Fixed-order recommendation pipeline.
//!
//! Parse the query, search the mountain table, enrich candidates with
//! conditions and drive times, assess the day, score each mountain and
//! write the final recommendation. Every LLM step goes through a
//! [`Signature`](crate::signatures::Signature) so it can be evaluated alone.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::crowds::{CrowdContext, crowd_context};
use crate::geo::estimate_max_distance_km;
use crate::llm::LanguageModel;
use crate::location::UserLocation;
use crate::mountains::{MountainMatch, MountainSearch, MountainStore};
use crate::providers::{ConditionsProvider, DriveTimeProvider};
use crate::routing::DriveTime;
use crate::signatures::{
    AssessConditions, DayAssessment, GenerateRecommendation, ParseSkiQuery, ParsedQuery,
    ScoreMountain, predict,
};
use crate::weather::Conditions;

pub const DEFAULT_MAX_DRIVE_HOURS: f64 = 3.0;
/// Scored candidates handed to the final recommendation
const RECOMMENDATION_POOL: usize = 5;

pub const NO_MATCHES_TOP_PICK: &str = "No mountains found matching your criteria.";
pub const NO_MATCHES_ALTERNATIVES: &str = "Try relaxing your filters (drive time, pass type, etc.)";

/// A search hit with its conditions and drive time attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub mountain: MountainMatch,
    pub conditions: Conditions,
    pub drive_time: DriveTime,
}

impl Candidate {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.mountain.mountain.name
    }

    #[must_use]
    pub fn state(&self) -> &str {
        &self.mountain.mountain.state
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub mountain: Candidate,
    pub score: f64,
    pub key_pros: String,
    pub key_cons: String,
    pub tradeoff_note: String,
}

/// Final answer plus the intermediate results of every step
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub top_pick: String,
    pub alternatives: String,
    pub caveat: String,
    pub target_date: NaiveDate,
    pub parsed: ParsedQuery,
    pub candidates: Vec<Candidate>,
    pub day_assessment: Option<DayAssessment>,
    pub scores: Vec<ScoredCandidate>,
    pub crowd_context: Option<CrowdContext>,
}

impl PipelineOutcome {
    /// Text shown to the user
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "**{}**\n\nAlternatives: {}\n\n{}",
            self.top_pick, self.alternatives, self.caveat
        )
    }
}

/// Turn the parsed `target_date` into a calendar date.
///
/// `today`, `unspecified` and anything unparseable resolve to `current_date`.
#[must_use]
pub fn resolve_date(target_date: &str, current_date: NaiveDate) -> NaiveDate {
    match target_date.trim().to_lowercase().as_str() {
        "today" | "unspecified" => current_date,
        "tomorrow" => current_date
            .checked_add_days(Days::new(1))
            .unwrap_or(current_date),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d").unwrap_or(current_date),
    }
}

/// Ask which day an open-ended query means and append the answer.
///
/// Queries that already name a day come back unchanged. On the prompt "1"
/// picks today and anything else tomorrow.
pub async fn clarify_date<R: BufRead, W: Write>(
    model: &dyn LanguageModel,
    query: &str,
    current_date: NaiveDate,
    location: &UserLocation,
    input: &mut R,
    output: &mut W,
) -> Result<String> {
    let parsed = predict::<ParseSkiQuery>(
        model,
        &[
            ("query", query.to_string()),
            ("user_context", location.user_context(current_date)),
        ],
    )
    .await
    .context("Failed to parse the query")?;
    if !parsed.target_date.trim().eq_ignore_ascii_case("unspecified") {
        return Ok(query.to_string());
    }

    write!(output, "When are you looking to ski?\n  1. Today\n  2. Tomorrow\nEnter 1 or 2: ")?;
    output.flush()?;
    let mut choice = String::new();
    input.read_line(&mut choice)?;
    let day = if choice.trim() == "1" { "today" } else { "tomorrow" };
    debug!(day, "Date clarified");
    Ok(format!("{query} {day}"))
}

/// Mountain search implied by a parsed query
#[must_use]
pub fn search_for(parsed: &ParsedQuery, location: &UserLocation, default_hours: f64) -> MountainSearch {
    let hours = parsed
        .max_drive_hours
        .filter(|h| *h > 0.0)
        .unwrap_or(default_hours);

    let mut search = MountainSearch::around(location.point())
        .within_km(estimate_max_distance_km(hours))
        .with_pass(parsed.pass_type);
    search.needs_terrain_parks = parsed.needs_terrain_parks;
    search.needs_glades = parsed.needs_glades;
    search.needs_beginner_terrain = parsed.needs_beginner_terrain;
    search.needs_expert_terrain = parsed.needs_expert_terrain;
    search.needs_night_skiing = parsed.needs_night_skiing;
    search
}

pub struct SkiPipeline<'a> {
    pub model: &'a dyn LanguageModel,
    pub store: &'a MountainStore,
    pub conditions: &'a dyn ConditionsProvider,
    pub routes: &'a dyn DriveTimeProvider,
    pub default_max_drive_hours: f64,
}

impl<'a> SkiPipeline<'a> {
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
            default_max_drive_hours: DEFAULT_MAX_DRIVE_HOURS,
        }
    }

    #[must_use]
    pub fn with_default_drive_hours(mut self, hours: f64) -> Self {
        self.default_max_drive_hours = hours;
        self
    }

    #[instrument(skip(self, location), fields(location = %location.name))]
    pub async fn run(
        &self,
        query: &str,
        current_date: NaiveDate,
        location: &UserLocation,
    ) -> Result<PipelineOutcome> {
        let parsed = predict::<ParseSkiQuery>(
            self.model,
            &[
                ("query", query.to_string()),
                ("user_context", location.user_context(current_date)),
            ],
        )
        .await
        .context("Failed to parse the query")?;

        let target_date = resolve_date(&parsed.target_date, current_date);
        debug!(?parsed, %target_date, "Parsed query");

        let search = search_for(&parsed, location, self.default_max_drive_hours);
        let matches = self.store.search(&search)?;
        info!(count = matches.len(), radius_km = search.max_distance_km, "Found candidates");

        if matches.is_empty() {
            return Ok(PipelineOutcome {
                top_pick: NO_MATCHES_TOP_PICK.to_string(),
                alternatives: NO_MATCHES_ALTERNATIVES.to_string(),
                caveat: String::new(),
                target_date,
                parsed,
                candidates: Vec::new(),
                day_assessment: None,
                scores: Vec::new(),
                crowd_context: None,
            });
        }

        let candidates = self.enrich(matches, target_date, location).await?;
        let preferences = parsed.preferences().to_string();

        let day_assessment = predict::<AssessConditions>(
            self.model,
            &[
                ("all_candidates", serde_json::to_string(&candidates)?),
                ("user_preferences", preferences.clone()),
            ],
        )
        .await
        .context("Failed to assess conditions")?;
        let day_context = day_assessment.summary();

        let scores = self.score(&candidates, &preferences, &day_context).await?;

        let top = &scores[0].mountain;
        let crowds = crowd_context(target_date, top.state());

        let pool = &scores[..scores.len().min(RECOMMENDATION_POOL)];
        let recommendation = predict::<GenerateRecommendation>(
            self.model,
            &[
                ("query", query.to_string()),
                ("day_assessment", day_context),
                ("scored_candidates", serde_json::to_string(pool)?),
                ("crowd_context", serde_json::to_string(&crowds)?),
            ],
        )
        .await
        .context("Failed to generate the recommendation")?;

        Ok(PipelineOutcome {
            top_pick: recommendation.top_pick,
            alternatives: recommendation.alternatives,
            caveat: recommendation.caveat,
            target_date,
            parsed,
            candidates,
            day_assessment: Some(day_assessment),
            scores,
            crowd_context: Some(crowds),
        })
    }

    async fn enrich(
        &self,
        matches: Vec<MountainMatch>,
        target_date: NaiveDate,
        location: &UserLocation,
    ) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::with_capacity(matches.len());
        for found in matches {
            let conditions = self
                .conditions
                .conditions(&found.mountain, target_date)
                .await
                .with_context(|| format!("Failed to get conditions for {}", found.mountain.name))?;

            let drive_time = match self
                .routes
                .drive_time(location.point(), found.mountain.point())
                .await
            {
                Ok(drive_time) => drive_time,
                Err(err) => {
                    warn!(mountain = %found.mountain.name, error = %err, "Routing failed, estimating drive time");
                    DriveTime::estimated(found.distance_km)
                }
            };

            candidates.push(Candidate {
                mountain: found,
                conditions,
                drive_time,
            });
        }
        Ok(candidates)
    }

    async fn score(
        &self,
        candidates: &[Candidate],
        preferences: &str,
        day_context: &str,
    ) -> Result<Vec<ScoredCandidate>> {
        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let result = predict::<ScoreMountain>(
                self.model,
                &[
                    ("mountain", serde_json::to_string(candidate)?),
                    ("user_preferences", preferences.to_string()),
                    ("day_context", day_context.to_string()),
                ],
            )
            .await
            .with_context(|| format!("Failed to score {}", candidate.name()))?;

            let score = result.score.unwrap_or_else(|| {
                warn!(mountain = candidate.name(), "Model returned no score, using 0");
                0.0
            });
            scored.push(ScoredCandidate {
                mountain: candidate.clone(),
                score,
                key_pros: result.key_pros,
                key_cons: result.key_cons,
                tradeoff_note: result.tradeoff_note,
            });
        }
        // stable: ties keep search order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scored)
    }
}
