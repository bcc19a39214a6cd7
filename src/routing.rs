use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::RoutingConfig;
use crate::error::PowderError;
use crate::geo::{Point, round_to};
use crate::{API_CLIENT, cache};

const METERS_PER_MILE: f64 = 1609.34;

/// Driving time and distance between two points.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DriveTime {
    pub duration_seconds: u64,
    pub duration_minutes: f64,
    pub distance_m: u64,
    pub distance_km: f64,
    pub distance_mi: f64,
    /// Set when the values are an estimate rather than a routed answer
    pub error: Option<String>,
}

impl DriveTime {
    #[must_use]
    pub fn from_route(seconds: f64, meters: f64) -> Self {
        Self {
            duration_seconds: seconds.round() as u64,
            duration_minutes: round_to(seconds / 60.0, 1),
            distance_m: meters.round() as u64,
            distance_km: round_to(meters / 1000.0, 1),
            distance_mi: round_to(meters / METERS_PER_MILE, 1),
            error: None,
        }
    }

    /// Rough estimate from straight-line distance, used when routing fails.
    #[must_use]
    pub fn estimated(distance_km: f64) -> Self {
        let minutes = distance_km * 0.75;
        let meters = distance_km * 1000.0;
        Self {
            duration_seconds: (minutes * 60.0).round() as u64,
            duration_minutes: round_to(minutes, 1),
            distance_m: meters.round() as u64,
            distance_km: round_to(distance_km, 1),
            distance_mi: round_to(meters / METERS_PER_MILE, 1),
            error: Some("routing_api_failed".to_string()),
        }
    }

    #[must_use]
    pub fn hours(&self) -> f64 {
        self.duration_minutes / 60.0
    }
}

#[instrument(skip(config, api_key))]
pub async fn get_drive_time(
    config: &RoutingConfig,
    api_key: Option<&str>,
    origin: Point,
    destination: Point,
) -> Result<DriveTime> {
    let key = format!("route:{}-{}", origin.to_key(), destination.to_key());

    if let Some(cached) = cache::get::<DriveTime>(&key).await? {
        return Ok(cached);
    }

    let api_key = api_key.ok_or_else(|| {
        PowderError::config("OPEN_ROUTE_SERVICE_API_KEY environment variable not set")
    })?;
    let drive_time = get_drive_time_call(config, api_key, origin, destination).await?;

    let jitter: f32 = rand::rng().random_range(0.9..1.1);
    cache::put(
        &key,
        drive_time.clone(),
        Duration::from_secs((3600f32 * 24f32 * 7f32 * jitter) as u64),
    )
    .await?;
    Ok(drive_time)
}

/// Drive times from one origin to several destinations, one request each.
pub async fn get_drive_times_batch(
    config: &RoutingConfig,
    api_key: Option<&str>,
    origin: Point,
    destinations: &[Point],
) -> Vec<Result<DriveTime>> {
    let mut results = Vec::with_capacity(destinations.len());
    for destination in destinations {
        results.push(get_drive_time(config, api_key, origin, *destination).await);
    }
    results
}

async fn get_drive_time_call(
    config: &RoutingConfig,
    api_key: &str,
    origin: Point,
    destination: Point,
) -> Result<DriveTime> {
    tracing::debug!("Calling the API");
    let url = format!(
        "{}/directions/{}?api_key={}&start={}&end={}",
        config.base_url,
        config.profile,
        urlencoding::encode(api_key),
        origin.to_lon_lat(),
        destination.to_lon_lat(),
    );
    let response = API_CLIENT.get(url).send().await?.error_for_status()?;
    let response: ApiResponse = response
        .json()
        .await
        .context("Failed to parse OpenRouteService response")?;

    segment_of(&response)
        .map(|segment| DriveTime::from_route(segment.duration, segment.distance))
        .ok_or(anyhow!("No route segments in response"))
}

fn segment_of(response: &ApiResponse) -> Option<&Segment> {
    response
        .features
        .first()
        .and_then(|feature| feature.properties.segments.first())
}

#[derive(Debug, Deserialize)]
struct Segment {
    duration: f64,
    distance: f64,
}

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(default)]
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    features: Vec<Feature>,
}
