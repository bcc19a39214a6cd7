//! Where the user starts their drive from.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geo::Point;
use crate::weather;

/// Starting point of a trip
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserLocation {
    /// Display name, e.g. "Boston, MA"
    pub name: String,
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
}

const KNOWN_LOCATIONS: &[(&str, &str, f64, f64)] = &[
    ("boston", "Boston, MA", 42.3601, -71.0589),
    ("nyc", "New York, NY", 40.7128, -74.0060),
    ("hartford", "Hartford, CT", 41.7658, -72.6734),
    ("albany", "Albany, NY", 42.6526, -73.7562),
];

impl UserLocation {
    #[must_use]
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
        }
    }

    /// The default starting point
    #[must_use]
    pub fn boston() -> Self {
        Self::new("Boston, MA", 42.3601, -71.0589)
    }

    /// Look up one of the built-in starting points by key
    #[must_use]
    pub fn known(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        KNOWN_LOCATIONS
            .iter()
            .find(|(k, ..)| *k == key)
            .map(|(_, name, lat, lon)| Self::new(*name, *lat, *lon))
    }

    /// Parse a literal `"lat,lon"` pair
    #[must_use]
    pub fn from_coordinates(input: &str) -> Option<Self> {
        let (lat, lon) = input.split_once(',')?;
        let lat: f64 = lat.trim().parse().ok()?;
        let lon: f64 = lon.trim().parse().ok()?;

        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }

        Some(Self::new(format!("{lat:.4}, {lon:.4}"), lat, lon))
    }

    #[must_use]
    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lon)
    }

    /// Context block handed to the query parser
    #[must_use]
    pub fn user_context(&self, today: NaiveDate) -> String {
        let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
        format!(
            "Today's date: {today}\nTomorrow's date: {tomorrow}\nUser's location: {} ({}, {})",
            self.name, self.lat, self.lon
        )
    }
}

/// Resolve `--location`: a built-in key, a coordinate pair, or a place name
/// looked up via geocoding. Anything unresolvable falls back to Boston.
pub async fn resolve(input: &str, geocoding_url: &str) -> UserLocation {
    if let Some(location) = UserLocation::known(input) {
        return location;
    }
    if let Some(location) = UserLocation::from_coordinates(input) {
        return location;
    }

    match weather::geocode(geocoding_url, input).await {
        Ok(results) => {
            if let Some(first) = results.into_iter().next() {
                debug!(name = %first.name, "Resolved location via geocoding");
                return first;
            }
            warn!(input, "No geocoding results, using Boston");
        }
        Err(err) => warn!(input, error = %err, "Geocoding failed, using Boston"),
    }
    UserLocation::boston()
}
