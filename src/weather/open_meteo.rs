//! Open-Meteo response structures

use serde::Deserialize;

use crate::location::UserLocation;

/// Forecast and archive response. Only the hourly and daily blocks are read.
#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Option<String>,
    pub hourly: Option<HourlyData>,
    pub daily: Option<DailyData>,
}

/// Hourly weather data. Open-Meteo reports gaps as `null`.
#[derive(Debug, Default, Deserialize)]
pub struct HourlyData {
    pub time: Vec<String>,
    #[serde(rename = "temperature_2m")]
    pub temperature: Option<Vec<Option<f64>>>,
    #[serde(rename = "wind_speed_10m")]
    pub wind_speed: Option<Vec<Option<f64>>>,
    pub visibility: Option<Vec<Option<f64>>>,
    pub weather_code: Option<Vec<Option<u8>>>,
    /// Centimetres per hour
    pub snowfall: Option<Vec<Option<f64>>>,
    /// Metres
    pub snow_depth: Option<Vec<Option<f64>>>,
}

/// Daily aggregates, requested by the archive fetcher
#[derive(Debug, Default, Deserialize)]
pub struct DailyData {
    pub time: Vec<String>,
    #[serde(rename = "temperature_2m_max")]
    pub temperature_max: Option<Vec<Option<f64>>>,
    #[serde(rename = "temperature_2m_min")]
    pub temperature_min: Option<Vec<Option<f64>>>,
    pub snowfall_sum: Option<Vec<Option<f64>>>,
}

/// Value `i` of an optional hourly/daily series
pub fn value_at<T: Copy>(series: Option<&Vec<Option<T>>>, i: usize) -> Option<T> {
    series.and_then(|values| values.get(i).copied().flatten())
}

/// Geocoding response from `OpenMeteo`
#[derive(Debug, Deserialize)]
pub struct GeocodingResponse {
    pub results: Option<Vec<GeocodingResult>>,
}

#[derive(Debug, Deserialize)]
pub struct GeocodingResult {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country: Option<String>,
    pub admin1: Option<String>,
}

impl From<GeocodingResult> for UserLocation {
    fn from(result: GeocodingResult) -> Self {
        let name = match result.admin1 {
            Some(region) => format!("{}, {region}", result.name),
            None => result.name,
        };
        UserLocation::new(name, result.latitude, result.longitude)
    }
}

/// Convert a WMO weather code to a human-readable description
#[must_use]
pub fn weather_code_to_description(code: Option<u8>) -> String {
    let Some(code) = code else {
        return "Unknown".to_string();
    };
    let description = match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Foggy",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow",
        73 => "Moderate snow",
        75 => "Heavy snow",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        other => return format!("Unknown ({other})"),
    };
    description.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(0), "Clear sky")]
    #[case(Some(45), "Foggy")]
    #[case(Some(71), "Slight snow")]
    #[case(Some(86), "Heavy snow showers")]
    #[case(Some(99), "Thunderstorm with heavy hail")]
    #[case(Some(42), "Unknown (42)")]
    #[case(None, "Unknown")]
    fn test_weather_code_to_description(#[case] code: Option<u8>, #[case] expected: &str) {
        assert_eq!(weather_code_to_description(code), expected);
    }

    #[test]
    fn test_hourly_nulls_deserialize() {
        let json = r#"{
            "latitude": 44.5,
            "longitude": -72.8,
            "hourly": {
                "time": ["2025-01-15T00:00", "2025-01-15T01:00"],
                "temperature_2m": [-8.5, null],
                "weather_code": [71, 73]
            }
        }"#;
        let response: ForecastResponse = serde_json::from_str(json).unwrap();
        let hourly = response.hourly.unwrap();
        assert_eq!(value_at(hourly.temperature.as_ref(), 0), Some(-8.5));
        assert_eq!(value_at(hourly.temperature.as_ref(), 1), None);
        assert_eq!(value_at(hourly.snowfall.as_ref(), 0), None);
        assert_eq!(value_at(hourly.weather_code.as_ref(), 1), Some(73));
    }

    #[test]
    fn test_geocoding_result_into_location() {
        let json = r#"{"results": [{"name": "Burlington", "latitude": 44.47, "longitude": -73.21, "country": "United States", "admin1": "Vermont"}]}"#;
        let response: GeocodingResponse = serde_json::from_str(json).unwrap();
        let location: UserLocation = response.results.unwrap().remove(0).into();
        assert_eq!(location.name, "Burlington, Vermont");
        assert_eq!(location.lat, 44.47);
    }
}
