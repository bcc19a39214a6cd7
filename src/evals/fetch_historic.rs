//! Season-long weather fixtures from the Open-Meteo archive.
//!
//! One request per mountain covers the whole date range. Each day is sampled
//! at local noon, with fresh snow summed over the 24 hours before it.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::backtest::FixtureConditions;
use crate::API_CLIENT;
use crate::config::WeatherConfig;
use crate::geo::round_to;
use crate::mountains::Mountain;
use crate::weather::c_to_f;
use crate::weather::open_meteo::{ForecastResponse, value_at};

const HOURLY_FIELDS: &str = "temperature_2m,wind_speed_10m,visibility,weather_code,snowfall,snow_depth";
const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,snowfall_sum";
const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(60);
/// Pause between mountains to stay under the archive rate limit
const REQUEST_PAUSE: Duration = Duration::from_secs(1);
const DEFAULT_VISIBILITY_M: f64 = 10_000.0;

#[must_use]
pub fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 1).unwrap_or_default()
}

#[must_use]
pub fn default_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 15).unwrap_or_default()
}

/// Per-date conditions for every mountain that fetched successfully
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricIndex {
    pub start_date: String,
    pub end_date: String,
    pub mountains: Vec<String>,
    pub dates: BTreeMap<String, BTreeMap<String, FixtureConditions>>,
}

impl HistoricIndex {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join("by_date.json");
        let text = fs::read_to_string(&path).with_context(|| {
            format!(
                "No fixtures found at {}. Run 'powder fetch-historic' first.",
                path.display()
            )
        })?;
        serde_json::from_str(&text).with_context(|| format!("Malformed {}", path.display()))
    }
}

/// One mountain's season, written to `{mountain}.json`
#[derive(Debug, Serialize)]
struct MountainSeason<'a> {
    mountain: &'a str,
    state: &'a str,
    lat: f64,
    lon: f64,
    start_date: String,
    end_date: String,
    conditions: &'a BTreeMap<String, FixtureConditions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Metadata {
    start_date: String,
    end_date: String,
    mountains: Vec<String>,
    total_days: usize,
    total_mountains: usize,
    fetched_at: String,
}

/// File-name friendly mountain name: `Smugglers' Notch` -> `smugglers_notch`
#[must_use]
pub fn safe_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_").replace('\'', "")
}

/// Turn an archive response into one record per day
#[must_use]
pub fn season_from_archive(archive: &ForecastResponse) -> BTreeMap<String, FixtureConditions> {
    let Some(daily) = archive.daily.as_ref() else {
        return BTreeMap::new();
    };
    let hourly = archive.hourly.as_ref();
    let hourly_len = hourly
        .and_then(|h| h.temperature.as_ref())
        .map_or(0, Vec::len);

    daily
        .time
        .iter()
        .enumerate()
        .map(|(i, date)| {
            let temp_max = value_at(daily.temperature_max.as_ref(), i);
            let temp_min = value_at(daily.temperature_min.as_ref(), i);
            let snowfall_sum = value_at(daily.snowfall_sum.as_ref(), i);
            let noon = i * 24 + 12;

            let (temp_c, wind_kph, visibility_m, weather_code, depth_m) = match hourly {
                Some(h) if noon < hourly_len => (
                    value_at(h.temperature.as_ref(), noon).unwrap_or(0.0),
                    value_at(h.wind_speed.as_ref(), noon).unwrap_or(0.0),
                    value_at(h.visibility.as_ref(), noon).unwrap_or(DEFAULT_VISIBILITY_M),
                    value_at(h.weather_code.as_ref(), noon).unwrap_or(0),
                    value_at(h.snow_depth.as_ref(), noon).unwrap_or(0.0),
                ),
                _ => {
                    let temp = match (temp_max, temp_min) {
                        (Some(max), Some(min)) => (max + min) / 2.0,
                        _ => 0.0,
                    };
                    (temp, 10.0, DEFAULT_VISIBILITY_M, 0, 0.0)
                }
            };

            let fresh_cm = match hourly.and_then(|h| h.snowfall.as_ref()) {
                Some(snowfall) if noon >= 24 => snowfall
                    .iter()
                    .skip(noon - 24)
                    .take(24)
                    .map(|s| s.unwrap_or(0.0))
                    .sum(),
                _ => snowfall_sum.unwrap_or(0.0),
            };
            let depth_cm = depth_m * 100.0;

            let record = FixtureConditions {
                fresh_snow_24h_cm: Some(round_to(fresh_cm, 1)),
                fresh_snow_24h_in: Some(round_to(fresh_cm / 2.54, 1)),
                snow_depth_cm: Some(round_to(depth_cm, 1)),
                snow_depth_in: Some(round_to(depth_cm / 2.54, 1)),
                temp_c: Some(round_to(temp_c, 1)),
                temp_f: Some(round_to(c_to_f(temp_c), 1)),
                temp_max_f: temp_max.map(|t| round_to(c_to_f(t), 1)),
                temp_min_f: temp_min.map(|t| round_to(c_to_f(t), 1)),
                wind_kph: Some(round_to(wind_kph, 1)),
                wind_mph: Some(round_to(wind_kph / 1.609, 1)),
                visibility_m: Some(round_to(visibility_m, 0)),
                visibility_km: Some(round_to(visibility_m / 1000.0, 1)),
                visibility_mi: Some(round_to(visibility_m / 1609.0, 1)),
                weather_code: Some(weather_code),
                weather_description: None,
            };
            (date.clone(), record)
        })
        .collect()
}

/// Fetch one mountain's season from the archive API
#[instrument(skip(config, mountain), fields(mountain = %mountain.name))]
pub async fn fetch_mountain_season(
    config: &WeatherConfig,
    mountain: &Mountain,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<BTreeMap<String, FixtureConditions>> {
    let url = Url::parse_with_params(
        &config.archive_url,
        &[
            ("latitude", mountain.lat.to_string()),
            ("longitude", mountain.lon.to_string()),
            ("start_date", start.to_string()),
            ("end_date", end.to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
            ("daily", DAILY_FIELDS.to_string()),
            ("timezone", config.timezone.clone()),
        ],
    )
    .context("Invalid weather archive URL")?;

    let response = API_CLIENT
        .get(url)
        .timeout(ARCHIVE_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;

    let archive: ForecastResponse = response
        .json()
        .await
        .context("Failed to parse OpenMeteo archive response")?;

    Ok(season_from_archive(&archive))
}

fn write_json<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

/// Fetch every mountain and write the per-mountain files, `by_date.json` and
/// `metadata.json` into `output_dir`. Mountains that fail are reported and
/// left out.
pub async fn fetch_full_season(
    config: &WeatherConfig,
    mountains: &[Mountain],
    start: NaiveDate,
    end: NaiveDate,
    output_dir: &Path,
) -> Result<HistoricIndex> {
    if end < start {
        bail!("End date {end} is before start date {start}");
    }
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    println!("Fetching {start} to {end}");
    println!("Mountains: {}", mountains.len());
    println!("Days: {}", (end - start).num_days() + 1);
    println!();

    let mut seasons: Vec<(&Mountain, BTreeMap<String, FixtureConditions>)> = Vec::new();

    for (n, mountain) in mountains.iter().enumerate() {
        if n > 0 {
            tokio::time::sleep(REQUEST_PAUSE).await;
        }
        match fetch_mountain_season(config, mountain, start, end).await {
            Ok(season) => {
                println!("Fetching {}... OK ({} days)", mountain.name, season.len());
                let file = output_dir.join(format!("{}.json", safe_name(&mountain.name)));
                write_json(
                    &file,
                    &MountainSeason {
                        mountain: &mountain.name,
                        state: &mountain.state,
                        lat: mountain.lat,
                        lon: mountain.lon,
                        start_date: start.to_string(),
                        end_date: end.to_string(),
                        conditions: &season,
                    },
                    true,
                )?;
                seasons.push((mountain, season));
            }
            Err(err) => {
                warn!(mountain = %mountain.name, error = %err, "Archive fetch failed");
                println!("Fetching {}... ERROR: {err:#}", mountain.name);
            }
        }
    }

    let index = build_index(start, end, &seasons);
    write_json(&output_dir.join("by_date.json"), &index, false)?;
    println!(
        "Saved by_date.json ({} dates, {} mountains)",
        index.dates.len(),
        index.mountains.len()
    );

    let metadata = Metadata {
        start_date: index.start_date.clone(),
        end_date: index.end_date.clone(),
        mountains: index.mountains.clone(),
        total_days: index.dates.len(),
        total_mountains: index.mountains.len(),
        fetched_at: Local::now().date_naive().to_string(),
    };
    write_json(&output_dir.join("metadata.json"), &metadata, true)?;

    info!(dir = %output_dir.display(), "Historic fixtures written");
    Ok(index)
}

/// Pivot per-mountain seasons into `{date: {mountain: record}}`. The dates of
/// the first season define the index.
fn build_index(
    start: NaiveDate,
    end: NaiveDate,
    seasons: &[(&Mountain, BTreeMap<String, FixtureConditions>)],
) -> HistoricIndex {
    let mut dates: BTreeMap<String, BTreeMap<String, FixtureConditions>> = BTreeMap::new();
    if let Some((_, first)) = seasons.first() {
        for date in first.keys() {
            let day = seasons
                .iter()
                .filter_map(|(mountain, season)| {
                    season
                        .get(date)
                        .map(|record| (mountain.name.clone(), record.clone()))
                })
                .collect();
            dates.insert(date.clone(), day);
        }
    }

    HistoricIndex {
        start_date: start.to_string(),
        end_date: end.to_string(),
        mountains: seasons.iter().map(|(m, _)| m.name.clone()).collect(),
        dates,
    }
}

/// Summary of fetched fixtures: the range, the top powder days (6"+) and the
/// sub-zero days.
pub fn summarize(dir: &Path) -> Result<String> {
    let meta_path = dir.join("metadata.json");
    if !meta_path.exists() {
        return Ok("No fixtures found. Run 'powder fetch-historic' first.".to_string());
    }
    let metadata: Metadata = serde_json::from_str(&fs::read_to_string(&meta_path)?)
        .with_context(|| format!("Malformed {}", meta_path.display()))?;

    let mut out = String::new();
    out.push_str("\n=== Historic Weather Fixtures ===\n\n");
    out.push_str(&format!(
        "Date range: {} to {}\n",
        metadata.start_date, metadata.end_date
    ));
    out.push_str(&format!("Total days: {}\n", metadata.total_days));
    out.push_str(&format!("Mountains: {}\n", metadata.mountains.len()));
    out.push_str(&format!("Fetched: {}\n", metadata.fetched_at));

    if !dir.join("by_date.json").exists() {
        return Ok(out);
    }
    let index = HistoricIndex::load(dir)?;

    let mut powder_days: Vec<(&str, &str, f64)> = index
        .dates
        .iter()
        .filter_map(|(date, day)| {
            day.iter()
                .map(|(name, c)| (name.as_str(), c.fresh_snow_24h_in.unwrap_or(0.0)))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .filter(|(_, fresh)| *fresh >= 6.0)
                .map(|(name, fresh)| (date.as_str(), name, fresh))
        })
        .collect();
    powder_days.sort_by(|a, b| b.2.total_cmp(&a.2));

    out.push_str("\nTop 10 powder days:\n");
    for (date, name, fresh) in powder_days.iter().take(10) {
        out.push_str(&format!("  {date}: {name} - {fresh:.1}\" fresh\n"));
    }

    let mut cold_days: Vec<(&str, f64)> = index
        .dates
        .iter()
        .filter_map(|(date, day)| {
            day.values()
                .map(|c| c.temp_f.unwrap_or(100.0))
                .min_by(f64::total_cmp)
                .filter(|t| *t < 0.0)
                .map(|t| (date.as_str(), t))
        })
        .collect();
    cold_days.sort_by(|a, b| a.1.total_cmp(&b.1));

    out.push_str("\nColdest days:\n");
    for (date, temp) in cold_days.iter().take(5) {
        out.push_str(&format!("  {date}: {temp:.0}°F\n"));
    }

    Ok(out)
}
