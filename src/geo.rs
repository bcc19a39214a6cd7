//! Coordinate helpers shared by the mountain search, routing and evals.

use chrono::{Local, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Average highway speed used to turn a drive budget into a search radius.
pub const PREFILTER_SPEED_KMH: f64 = 120.0;

/// A WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// `lon,lat` as expected by OpenRouteService
    #[must_use]
    pub fn to_lon_lat(&self) -> String {
        format!("{},{}", self.lon, self.lat)
    }

    /// Coordinates rounded to two decimals, used in cache keys
    #[must_use]
    pub fn to_key(&self) -> String {
        format!("{:.2}:{:.2}", self.lat, self.lon)
    }
}

/// Great-circle distance between two points in kilometres.
#[must_use]
pub fn haversine_km(from: Point, to: Point) -> f64 {
    haversine::distance(
        haversine::Location {
            latitude: from.lat,
            longitude: from.lon,
        },
        haversine::Location {
            latitude: to.lat,
            longitude: to.lon,
        },
        haversine::Units::Kilometers,
    )
}

/// Straight-line radius that comfortably covers `hours` of driving.
#[must_use]
pub fn estimate_max_distance_km(hours: f64) -> f64 {
    hours * PREFILTER_SPEED_KMH
}

/// Today's date in an IANA timezone such as `America/New_York`. Unknown
/// names fall back to the system timezone.
#[must_use]
pub fn today_in(timezone: &str) -> NaiveDate {
    match timezone.parse::<Tz>() {
        Ok(tz) => Utc::now().with_timezone(&tz).date_naive(),
        Err(_) => {
            warn!(timezone, "Unknown timezone, using the system clock");
            Local::now().date_naive()
        }
    }
}

/// Round to a fixed number of decimals.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}
