//! Data sources behind the pipeline and agent.
//!
//! Live runs query Open-Meteo and OpenRouteService; evals and `--date` runs
//! replay recorded fixtures through the same traits.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::{PowderConfig, RoutingConfig, WeatherConfig};
use crate::geo::Point;
use crate::mountains::Mountain;
use crate::routing::{self, DriveTime};
use crate::weather::{self, Conditions};

#[async_trait]
pub trait ConditionsProvider: Send + Sync {
    async fn conditions(&self, mountain: &Mountain, date: NaiveDate) -> Result<Conditions>;
}

#[async_trait]
pub trait DriveTimeProvider: Send + Sync {
    async fn drive_time(&self, origin: Point, destination: Point) -> Result<DriveTime>;
}

/// Forecast conditions from Open-Meteo
pub struct OpenMeteoConditions {
    config: WeatherConfig,
    cache_ttl: Duration,
}

impl OpenMeteoConditions {
    #[must_use]
    pub fn new(config: &PowderConfig) -> Self {
        Self {
            config: config.weather.clone(),
            cache_ttl: Duration::from_secs(u64::from(config.cache.ttl_hours) * 3600),
        }
    }
}

#[async_trait]
impl ConditionsProvider for OpenMeteoConditions {
    async fn conditions(&self, mountain: &Mountain, date: NaiveDate) -> Result<Conditions> {
        weather::get_conditions(&self.config, self.cache_ttl, mountain.point(), date).await
    }
}

/// Drive times from OpenRouteService
pub struct OpenRouteServiceRoutes {
    config: RoutingConfig,
    api_key: Option<String>,
}

impl OpenRouteServiceRoutes {
    #[must_use]
    pub fn new(config: &PowderConfig) -> Self {
        Self {
            config: config.routing.clone(),
            api_key: config.routing_api_key(),
        }
    }
}

#[async_trait]
impl DriveTimeProvider for OpenRouteServiceRoutes {
    async fn drive_time(&self, origin: Point, destination: Point) -> Result<DriveTime> {
        routing::get_drive_time(&self.config, self.api_key.as_deref(), origin, destination).await
    }
}
