//! Forecast conditions and geocoding via Open-Meteo.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::WeatherConfig;
use crate::geo::{Point, round_to};
use crate::location::UserLocation;
use crate::{API_CLIENT, cache};

pub mod open_meteo;

pub use open_meteo::weather_code_to_description;
use open_meteo::{ForecastResponse, GeocodingResponse, value_at};

const HOURLY_FIELDS: &str = "temperature_2m,wind_speed_10m,visibility,weather_code,snowfall,snow_depth";

/// Snapshot of the weather at a mountain around midday, in both unit systems.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Conditions {
    pub temperature_c: Option<f64>,
    pub temperature_f: Option<f64>,
    /// Daily high, only known for historic records
    pub temperature_max_f: Option<f64>,
    /// Daily low, only known for historic records
    pub temperature_min_f: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub wind_speed_mph: Option<f64>,
    pub visibility_m: Option<f64>,
    pub visibility_ft: Option<f64>,
    pub snow_depth_cm: f64,
    pub snow_depth_in: f64,
    /// Snowfall over the 24 hours up to the sampled hour
    pub fresh_snow_24h_cm: f64,
    pub fresh_snow_24h_in: f64,
    pub weather_code: Option<u8>,
    pub weather_description: String,
}

impl Conditions {
    /// Build from metric measurements, deriving the imperial fields.
    #[must_use]
    pub fn from_metric(
        temperature_c: Option<f64>,
        wind_speed_kmh: Option<f64>,
        visibility_m: Option<f64>,
        snow_depth_cm: f64,
        fresh_snow_24h_cm: f64,
        weather_code: Option<u8>,
    ) -> Self {
        Self {
            temperature_c,
            temperature_f: temperature_c.map(|c| round_to(c_to_f(c), 1)),
            temperature_max_f: None,
            temperature_min_f: None,
            wind_speed_kmh,
            wind_speed_mph: wind_speed_kmh.map(|kmh| round_to(kmh_to_mph(kmh), 1)),
            visibility_m,
            visibility_ft: visibility_m.map(|m| round_to(m_to_ft(m), 0)),
            snow_depth_cm: round_to(snow_depth_cm, 1),
            snow_depth_in: round_to(cm_to_in(snow_depth_cm), 1),
            fresh_snow_24h_cm: round_to(fresh_snow_24h_cm, 1),
            fresh_snow_24h_in: round_to(cm_to_in(fresh_snow_24h_cm), 1),
            weather_code,
            weather_description: weather_code_to_description(weather_code),
        }
    }
}

#[must_use]
pub fn c_to_f(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

#[must_use]
pub fn kmh_to_mph(kmh: f64) -> f64 {
    kmh * 0.621371
}

#[must_use]
pub fn m_to_ft(meters: f64) -> f64 {
    meters * 3.28084
}

#[must_use]
pub fn cm_to_in(cm: f64) -> f64 {
    cm / 2.54
}

/// Get the conditions at `point` for noon local time on `date`.
#[instrument(skip(config))]
pub async fn get_conditions(
    config: &WeatherConfig,
    cache_ttl: Duration,
    point: Point,
    date: NaiveDate,
) -> Result<Conditions> {
    let key = format!("weather:{}:{date}", point.to_key());

    if let Some(cached) = cache::get::<Conditions>(&key).await? {
        return Ok(cached);
    }

    let forecast = get_forecast_call(config, point).await?;
    let conditions = conditions_from_forecast(&forecast, date)?;

    cache::put(&key, conditions.clone(), cache_ttl).await?;
    Ok(conditions)
}

async fn get_forecast_call(config: &WeatherConfig, point: Point) -> Result<ForecastResponse> {
    tracing::debug!("Calling the forecast API");
    let url = Url::parse_with_params(
        &format!("{}/forecast", config.base_url),
        &[
            ("latitude", point.lat.to_string()),
            ("longitude", point.lon.to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
            ("timezone", config.timezone.clone()),
            ("forecast_days", config.forecast_days.to_string()),
        ],
    )
    .context("Invalid weather base URL")?;

    let response = API_CLIENT
        .get(url)
        .timeout(Duration::from_secs(config.timeout_seconds.into()))
        .send()
        .await?
        .error_for_status()?;

    response
        .json()
        .await
        .with_context(|| "Failed to parse OpenMeteo forecast response")
}

/// Extract the noon snapshot for `date` from an hourly forecast.
pub fn conditions_from_forecast(forecast: &ForecastResponse, date: NaiveDate) -> Result<Conditions> {
    let hourly = forecast
        .hourly
        .as_ref()
        .ok_or_else(|| anyhow!("Forecast response has no hourly data"))?;

    let hour = format!("{date}T12:00");
    let i = hourly
        .time
        .iter()
        .position(|t| *t == hour)
        .ok_or_else(|| anyhow!("Date {date} not in forecast range"))?;

    let fresh_snow_cm: f64 = hourly.snowfall.as_ref().map_or(0.0, |snowfall| {
        snowfall
            .iter()
            .take(i + 1)
            .skip(i.saturating_sub(24))
            .map(|s| s.unwrap_or(0.0))
            .sum()
    });
    let snow_depth_cm = value_at(hourly.snow_depth.as_ref(), i).map_or(0.0, |m| m * 100.0);

    Ok(Conditions::from_metric(
        value_at(hourly.temperature.as_ref(), i),
        value_at(hourly.wind_speed.as_ref(), i),
        value_at(hourly.visibility.as_ref(), i),
        snow_depth_cm,
        fresh_snow_cm,
        value_at(hourly.weather_code.as_ref(), i),
    ))
}

/// Look up a place name with the Open-Meteo geocoding API.
#[instrument]
pub async fn geocode(geocoding_url: &str, location_name: &str) -> Result<Vec<UserLocation>> {
    let url = format!(
        "{geocoding_url}/search?name={}&count=5&language=en&format=json",
        urlencoding::encode(location_name)
    );

    let response = API_CLIENT.get(url).send().await?.error_for_status()?;

    let geocoding: GeocodingResponse = response
        .json()
        .await
        .with_context(|| "Failed to parse OpenMeteo geocoding response")?;

    Ok(geocoding
        .results
        .unwrap_or_default()
        .into_iter()
        .map(UserLocation::from)
        .collect())
}
