//! Replay of recorded weather for reproducible runs.
//!
//! Fixtures are produced by `fetch-historic`: `by_date.json` maps each date to
//! per-mountain conditions, and each `{mountain}.json` holds one mountain's
//! season. Replayed runs swap these in for the forecast and routing APIs.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::PowderError;
use crate::geo::{Point, haversine_km, round_to};
use crate::mountains::Mountain;
use crate::providers::{ConditionsProvider, DriveTimeProvider};
use crate::routing::DriveTime;
use crate::weather::{Conditions, c_to_f, cm_to_in, kmh_to_mph, m_to_ft, weather_code_to_description};

const KM_PER_MILE: f64 = 1.609;
/// Road distance over straight-line distance
const ROAD_FACTOR: f64 = 1.3;
const AVERAGE_SPEED_KMH: f64 = 80.0;

/// Load a fixture by date or scenario name.
///
/// A date is looked up in `by_date.json` first. Otherwise the first `*.json`
/// whose file stem contains `name` is used: its `conditions` object if it has
/// one, the whole document if not.
pub fn load_fixture(name: &str, dir: &Path) -> crate::Result<Map<String, Value>> {
    let by_date = dir.join("by_date.json");
    if by_date.exists() {
        let document = read_json(&by_date)?;
        if let Some(Value::Object(day)) = document.get("dates").and_then(|d| d.get(name)) {
            debug!(fixture = name, "Loaded fixture from by_date.json");
            return Ok(day.clone());
        }
    }

    let mut files: Vec<_> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();

    for path in files {
        let matches = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| stem.contains(name));
        if !matches {
            continue;
        }
        debug!(fixture = name, path = %path.display(), "Loaded fixture file");
        return match read_json(&path)? {
            Value::Object(document) => match document.get("conditions") {
                Some(Value::Object(conditions)) => Ok(conditions.clone()),
                _ => Ok(document),
            },
            _ => Err(PowderError::validation(format!(
                "{}: fixture is not a JSON object",
                path.display()
            ))),
        };
    }

    Err(PowderError::not_found(format!("Fixture not found: {name}")))
}

fn read_json(path: &Path) -> crate::Result<Value> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|err| PowderError::validation(format!("{}: {err}", path.display())))
}

/// One mountain-day as recorded by `fetch-historic`. Either unit system may
/// be missing; the other is derived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureConditions {
    pub fresh_snow_24h_cm: Option<f64>,
    pub fresh_snow_24h_in: Option<f64>,
    pub snow_depth_cm: Option<f64>,
    pub snow_depth_in: Option<f64>,
    pub temp_c: Option<f64>,
    pub temp_f: Option<f64>,
    pub temp_max_f: Option<f64>,
    pub temp_min_f: Option<f64>,
    pub wind_kph: Option<f64>,
    pub wind_mph: Option<f64>,
    pub visibility_m: Option<f64>,
    pub visibility_km: Option<f64>,
    pub visibility_mi: Option<f64>,
    pub weather_code: Option<u8>,
    pub weather_description: Option<String>,
}

fn either(metric: Option<f64>, imperial: Option<f64>, to_metric: impl Fn(f64) -> f64) -> Option<f64> {
    metric.or_else(|| imperial.map(to_metric))
}

impl FixtureConditions {
    /// Used for mountains a fixture has no record for
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            fresh_snow_24h_cm: Some(0.0),
            snow_depth_cm: Some(50.0),
            temp_c: Some(-5.0),
            wind_kph: Some(15.0),
            visibility_km: Some(10.0),
            weather_code: Some(0),
            weather_description: Some("Clear".to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn into_conditions(self) -> Conditions {
        let fresh_cm = either(self.fresh_snow_24h_cm, self.fresh_snow_24h_in, |i| i * 2.54).unwrap_or(0.0);
        let depth_cm = either(self.snow_depth_cm, self.snow_depth_in, |i| i * 2.54).unwrap_or(0.0);
        // Missing readings replay as freezing, calm and clear
        let temp_c = either(self.temp_c, self.temp_f, |f| (f - 32.0) * 5.0 / 9.0).or(Some(0.0));
        let wind_kmh = either(self.wind_kph, self.wind_mph, |mph| mph * KM_PER_MILE).or(Some(0.0));
        let visibility_m = self
            .visibility_m
            .or_else(|| self.visibility_km.map(|km| km * 1000.0))
            .or_else(|| self.visibility_mi.map(|mi| mi * KM_PER_MILE * 1000.0))
            .or(Some(10_000.0));
        let weather_code = self.weather_code.or(Some(0));

        Conditions {
            temperature_c: temp_c.map(|c| round_to(c, 1)),
            temperature_f: self.temp_f.or_else(|| temp_c.map(|c| round_to(c_to_f(c), 1))),
            temperature_max_f: self.temp_max_f,
            temperature_min_f: self.temp_min_f,
            wind_speed_kmh: wind_kmh.map(|w| round_to(w, 1)),
            wind_speed_mph: self.wind_mph.or_else(|| wind_kmh.map(|w| round_to(kmh_to_mph(w), 1))),
            visibility_m: visibility_m.map(|m| round_to(m, 0)),
            visibility_ft: visibility_m.map(|m| round_to(m_to_ft(m), 0)),
            snow_depth_cm: round_to(depth_cm, 1),
            snow_depth_in: self.snow_depth_in.unwrap_or_else(|| round_to(cm_to_in(depth_cm), 1)),
            fresh_snow_24h_cm: round_to(fresh_cm, 1),
            fresh_snow_24h_in: self
                .fresh_snow_24h_in
                .unwrap_or_else(|| round_to(cm_to_in(fresh_cm), 1)),
            weather_code,
            weather_description: self
                .weather_description
                .unwrap_or_else(|| weather_code_to_description(weather_code)),
        }
    }
}

/// Conditions replayed from a snapshot keyed by mountain name
#[derive(Debug, Clone, Default)]
pub struct ReplayConditions {
    snapshot: HashMap<String, FixtureConditions>,
}

impl ReplayConditions {
    #[must_use]
    pub fn new(snapshot: HashMap<String, FixtureConditions>) -> Self {
        Self { snapshot }
    }

    /// Build from a loaded fixture; entries that are not condition records
    /// are rejected.
    pub fn from_fixture(fixture: Map<String, Value>) -> anyhow::Result<Self> {
        let snapshot = fixture
            .into_iter()
            .map(|(name, value)| -> anyhow::Result<(String, FixtureConditions)> {
                let conditions = serde_json::from_value(value)
                    .with_context(|| format!("Bad fixture record for {name}"))?;
                Ok((name, conditions))
            })
            .collect::<anyhow::Result<_>>()?;
        Ok(Self { snapshot })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    fn lookup(&self, name: &str) -> Option<&FixtureConditions> {
        self.snapshot.get(name).or_else(|| {
            self.snapshot
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, conditions)| conditions)
        })
    }
}

#[async_trait]
impl ConditionsProvider for ReplayConditions {
    async fn conditions(&self, mountain: &Mountain, _date: NaiveDate) -> anyhow::Result<Conditions> {
        let record = match self.lookup(&mountain.name) {
            Some(record) => record.clone(),
            None => {
                debug!(mountain = %mountain.name, "No replay record, using fallback");
                FixtureConditions::fallback()
            }
        };
        Ok(record.into_conditions())
    }
}

/// Drive time guessed from straight-line distance
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatedDriveTime;

impl EstimatedDriveTime {
    #[must_use]
    pub fn estimate(origin: Point, destination: Point) -> DriveTime {
        let distance_km = haversine_km(origin, destination);
        let minutes = distance_km * ROAD_FACTOR / AVERAGE_SPEED_KMH * 60.0;
        DriveTime::from_route(minutes * 60.0, distance_km * 1000.0)
    }
}

#[async_trait]
impl DriveTimeProvider for EstimatedDriveTime {
    async fn drive_time(&self, origin: Point, destination: Point) -> anyhow::Result<DriveTime> {
        Ok(Self::estimate(origin, destination))
    }
}
