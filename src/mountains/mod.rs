//! Ski mountain data types and search filters
//!
//! Mountains are static facility records seeded once from JSONL into SQLite
//! and read-only afterwards. The search narrows them by straight-line
//! distance, pass affiliation and terrain facets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::geo::Point;

mod store;
mod validate;

pub use store::MountainStore;
pub use validate::validate_mountain;

/// Multi-resort season pass affiliations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassType {
    Epic,
    Ikon,
    Indy,
}

impl PassType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PassType::Epic => "epic",
            PassType::Ikon => "ikon",
            PassType::Indy => "indy",
        }
    }
}

impl fmt::Display for PassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PassType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "epic" => Ok(PassType::Epic),
            "ikon" => Ok(PassType::Ikon),
            "indy" => Ok(PassType::Indy),
            other => Err(format!("unknown pass type '{other}'")),
        }
    }
}

/// A ski area and its facilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mountain {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    /// Two-letter state code
    pub state: String,
    pub lat: f64,
    pub lon: f64,
    /// Vertical drop in feet
    #[serde(default)]
    pub vertical_drop: Option<u32>,
    #[serde(default)]
    pub base_elevation: Option<u32>,
    #[serde(default)]
    pub summit_elevation: Option<u32>,
    #[serde(default)]
    pub num_trails: Option<u32>,
    #[serde(default)]
    pub num_lifts: Option<u32>,
    #[serde(default)]
    pub green_pct: Option<u32>,
    #[serde(default)]
    pub blue_pct: Option<u32>,
    #[serde(default)]
    pub black_pct: Option<u32>,
    #[serde(default)]
    pub double_black_pct: Option<u32>,
    /// Comma separated, e.g. "easy,intermediate,hard,superpipe"
    #[serde(default)]
    pub terrain_parks: Option<String>,
    /// Comma separated, e.g. "easy,intermediate,hard"
    #[serde(default)]
    pub glades: Option<String>,
    /// Comma separated, e.g. "ikon,indy"
    #[serde(default)]
    pub pass_types: Option<String>,
    #[serde(default = "default_true")]
    pub allows_snowboarding: bool,
    /// Comma separated, e.g. "gondola,highspeed,fixed"
    #[serde(default)]
    pub lift_types: Option<String>,
    #[serde(default)]
    pub has_night_skiing: bool,
    #[serde(default)]
    pub has_magic_carpet: bool,
    #[serde(default)]
    pub learning_area_quality: Option<String>,
    #[serde(default)]
    pub snowmaking_pct: Option<u32>,
    #[serde(default)]
    pub avg_weekday_price: Option<u32>,
    #[serde(default)]
    pub avg_weekend_price: Option<u32>,
    #[serde(default)]
    pub website: Option<String>,
}

fn default_true() -> bool {
    true
}

fn non_empty(field: Option<&String>) -> bool {
    field.is_some_and(|value| !value.trim().is_empty())
}

impl Mountain {
    #[must_use]
    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lon)
    }

    #[must_use]
    pub fn has_terrain_parks(&self) -> bool {
        non_empty(self.terrain_parks.as_ref())
    }

    #[must_use]
    pub fn has_glades(&self) -> bool {
        non_empty(self.glades.as_ref())
    }

    /// Magic carpet or at least a fifth of the trails rated green
    #[must_use]
    pub fn has_beginner_terrain(&self) -> bool {
        self.has_magic_carpet || self.green_pct.unwrap_or(0) >= 20
    }

    #[must_use]
    pub fn has_expert_terrain(&self) -> bool {
        self.double_black_pct.unwrap_or(0) > 0
    }

    #[must_use]
    pub fn accepts_pass(&self, pass: PassType) -> bool {
        self.pass_types
            .as_deref()
            .is_some_and(|passes| passes.to_lowercase().contains(pass.as_str()))
    }
}

/// A mountain returned by a search, with its distance from the origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountainMatch {
    #[serde(flatten)]
    pub mountain: Mountain,
    /// Straight-line distance in km, one decimal
    pub distance_km: f64,
}

/// Filters for [`MountainStore::search`]. Facet flags only narrow the
/// result when set.
#[derive(Debug, Clone, PartialEq)]
pub struct MountainSearch {
    pub origin: Point,
    pub max_distance_km: f64,
    pub pass_type: Option<PassType>,
    pub allows_snowboarding: Option<bool>,
    pub needs_terrain_parks: bool,
    pub needs_glades: bool,
    pub needs_beginner_terrain: bool,
    pub needs_expert_terrain: bool,
    pub needs_night_skiing: bool,
}

impl MountainSearch {
    pub const DEFAULT_RADIUS_KM: f64 = 300.0;

    /// Unfiltered search within the default radius
    #[must_use]
    pub fn around(origin: Point) -> Self {
        Self {
            origin,
            max_distance_km: Self::DEFAULT_RADIUS_KM,
            pass_type: None,
            allows_snowboarding: None,
            needs_terrain_parks: false,
            needs_glades: false,
            needs_beginner_terrain: false,
            needs_expert_terrain: false,
            needs_night_skiing: false,
        }
    }

    #[must_use]
    pub fn within_km(mut self, max_distance_km: f64) -> Self {
        self.max_distance_km = max_distance_km;
        self
    }

    #[must_use]
    pub fn with_pass(mut self, pass_type: Option<PassType>) -> Self {
        self.pass_type = pass_type;
        self
    }

    /// Whether a mountain passes the non-distance filters
    #[must_use]
    pub fn matches(&self, mountain: &Mountain) -> bool {
        if let Some(pass) = self.pass_type {
            if !mountain.accepts_pass(pass) {
                return false;
            }
        }
        if let Some(snowboarding) = self.allows_snowboarding {
            if mountain.allows_snowboarding != snowboarding {
                return false;
            }
        }
        (!self.needs_terrain_parks || mountain.has_terrain_parks())
            && (!self.needs_glades || mountain.has_glades())
            && (!self.needs_beginner_terrain || mountain.has_beginner_terrain())
            && (!self.needs_expert_terrain || mountain.has_expert_terrain())
            && (!self.needs_night_skiing || mountain.has_night_skiing)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::mountain;
    use super::*;

    #[test]
    fn test_pass_type_parsing() {
        assert_eq!("Ikon".parse::<PassType>(), Ok(PassType::Ikon));
        assert_eq!(" epic ".parse::<PassType>(), Ok(PassType::Epic));
        assert!("mountain collective".parse::<PassType>().is_err());
    }

    #[test]
    fn test_accepts_pass_is_substring_match() {
        let sugarbush = mountain("Sugarbush", "VT", 44.14, -72.88, "ikon,indy");
        assert!(sugarbush.accepts_pass(PassType::Ikon));
        assert!(sugarbush.accepts_pass(PassType::Indy));
        assert!(!sugarbush.accepts_pass(PassType::Epic));
    }

    #[test]
    fn test_facets() {
        let mut okemo = mountain("Okemo", "VT", 43.41, -72.72, "epic");
        assert!(!okemo.has_terrain_parks());
        assert!(!okemo.has_beginner_terrain());

        okemo.terrain_parks = Some("easy,superpipe".to_string());
        okemo.glades = Some("  ".to_string());
        okemo.has_magic_carpet = true;
        assert!(okemo.has_terrain_parks());
        assert!(!okemo.has_glades());
        assert!(okemo.has_beginner_terrain());
        assert!(!okemo.has_expert_terrain());

        okemo.double_black_pct = Some(3);
        assert!(okemo.has_expert_terrain());
    }

    #[test]
    fn test_green_share_counts_as_beginner_terrain() {
        let mut nashoba = mountain("Nashoba Valley", "MA", 42.48, -71.49, "indy");
        nashoba.green_pct = Some(20);
        assert!(nashoba.has_beginner_terrain());
    }

    #[test]
    fn test_search_matches_only_applies_set_flags() {
        let mut mrg = mountain("Mad River Glen", "VT", 44.2009, -72.9246, "indy");
        mrg.allows_snowboarding = false;

        let base = MountainSearch::around(Point::new(42.36, -71.06));
        assert!(base.matches(&mrg));

        let mut boarders = base.clone();
        boarders.allows_snowboarding = Some(true);
        assert!(!boarders.matches(&mrg));

        let mut night = base.clone();
        night.needs_night_skiing = true;
        assert!(!night.matches(&mrg));

        assert!(!base.with_pass(Some(PassType::Ikon)).matches(&mrg));
    }

    #[test]
    fn test_match_serializes_flat() {
        let m = MountainMatch {
            mountain: mountain("Stowe", "VT", 44.5258, -72.7858, "epic"),
            distance_km: 263.4,
        };
        let value = serde_json::to_value(&m).unwrap();
        assert_eq!(value["name"], "Stowe");
        assert_eq!(value["distance_km"], 263.4);
    }
}
