//! Sanity checks for hand-edited mountain records.

use serde_json::Value;

const PASS_TYPES: &[&str] = &["epic", "ikon", "indy"];
const LIFT_TYPES: &[&str] = &[
    "tram",
    "gondola",
    "bubble",
    "highspeed",
    "fixed",
    "surface",
    "magic_carpet",
];
const TERRAIN_FIELDS: &[&str] = &["green_pct", "blue_pct", "black_pct", "double_black_pct"];

/// Tolerance on elevation arithmetic, in feet
const ELEVATION_SLACK_FT: i64 = 50;

/// Check a mountain record before it goes into the seed file.
///
/// Returns whether the record is valid plus every problem found.
#[must_use]
pub fn validate_mountain(data: &Value) -> (bool, Vec<String>) {
    let mut errors = Vec::new();

    let Some(record) = data.as_object() else {
        return (false, vec!["Mountain data must be a JSON object".to_string()]);
    };

    for field in ["name", "state", "lat", "lon"] {
        if record.get(field).is_none_or(Value::is_null) {
            errors.push(format!("Missing required field: {field}"));
        }
    }

    if let Some(name) = record.get("name") {
        if name.as_str().is_none_or(|n| n.trim().is_empty()) {
            errors.push("name must be a non-empty string".to_string());
        }
    }

    if let Some(state) = record.get("state") {
        let ok = state
            .as_str()
            .is_some_and(|s| s.len() == 2 && s.chars().all(|c| c.is_ascii_uppercase()));
        if !ok {
            errors.push(format!("state must be a two-letter code, got {state}"));
        }
    }

    check_range(record.get("lat"), "lat", -90.0, 90.0, &mut errors);
    check_range(record.get("lon"), "lon", -180.0, 180.0, &mut errors);

    let mut terrain = Vec::new();
    for field in TERRAIN_FIELDS {
        if let Some(value) = record.get(*field).filter(|v| !v.is_null()) {
            match value.as_f64() {
                Some(pct) if (0.0..=100.0).contains(&pct) => terrain.push(pct),
                _ => errors.push(format!("{field} must be between 0 and 100, got {value}")),
            }
        }
    }
    if terrain.len() == TERRAIN_FIELDS.len() {
        let total: f64 = terrain.iter().sum();
        if (total - 100.0).abs() > 5.0 {
            errors.push(format!("Terrain percentages sum to {total}, expected about 100"));
        }
    }

    check_csv(record.get("pass_types"), "pass_types", PASS_TYPES, &mut errors);
    check_csv(record.get("lift_types"), "lift_types", LIFT_TYPES, &mut errors);

    let weekday = integer(record.get("avg_weekday_price"));
    let weekend = integer(record.get("avg_weekend_price"));
    for (field, price) in [("avg_weekday_price", weekday), ("avg_weekend_price", weekend)] {
        if price.is_some_and(|p| p <= 0) {
            errors.push(format!("{field} must be positive"));
        }
    }
    if let (Some(weekday), Some(weekend)) = (weekday, weekend) {
        if weekend < weekday {
            errors.push(format!(
                "avg_weekend_price ({weekend}) is lower than avg_weekday_price ({weekday})"
            ));
        }
    }

    let base = integer(record.get("base_elevation"));
    let summit = integer(record.get("summit_elevation"));
    let vertical = integer(record.get("vertical_drop"));
    if let (Some(base), Some(summit)) = (base, summit) {
        if summit <= base {
            errors.push("summit_elevation must be above base_elevation".to_string());
        } else if let Some(vertical) = vertical {
            if (summit - base - vertical).abs() > ELEVATION_SLACK_FT {
                errors.push(format!(
                    "vertical_drop ({vertical}) does not match summit - base ({})",
                    summit - base
                ));
            }
        }
    }
    if vertical.is_some_and(|v| v <= 0) {
        errors.push("vertical_drop must be positive".to_string());
    }

    (errors.is_empty(), errors)
}

fn integer(value: Option<&Value>) -> Option<i64> {
    value.and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
}

fn check_range(value: Option<&Value>, field: &str, min: f64, max: f64, errors: &mut Vec<String>) {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return;
    };
    match value.as_f64() {
        Some(n) if (min..=max).contains(&n) => {}
        _ => errors.push(format!("{field} must be between {min} and {max}, got {value}")),
    }
}

fn check_csv(value: Option<&Value>, field: &str, allowed: &[&str], errors: &mut Vec<String>) {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return;
    };
    let Some(csv) = value.as_str() else {
        errors.push(format!("{field} must be a comma-separated string"));
        return;
    };
    for item in csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !allowed.contains(&item.to_lowercase().as_str()) {
            errors.push(format!(
                "Unknown {field} entry '{item}', expected one of {}",
                allowed.join(", ")
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stowe() -> Value {
        json!({
            "name": "Stowe",
            "state": "VT",
            "lat": 44.5258,
            "lon": -72.7858,
            "vertical_drop": 2360,
            "base_elevation": 1280,
            "summit_elevation": 3640,
            "green_pct": 16,
            "blue_pct": 55,
            "black_pct": 21,
            "double_black_pct": 8,
            "pass_types": "epic",
            "lift_types": "gondola,highspeed,fixed",
            "avg_weekday_price": 189,
            "avg_weekend_price": 229
        })
    }

    #[test]
    fn test_valid_record() {
        let (valid, errors) = validate_mountain(&stowe());
        assert!(valid, "{errors:?}");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_missing_required_fields() {
        let (valid, errors) = validate_mountain(&json!({"name": "Nowhere"}));
        assert!(!valid);
        assert!(errors.contains(&"Missing required field: state".to_string()));
        assert!(errors.contains(&"Missing required field: lat".to_string()));
        assert!(errors.contains(&"Missing required field: lon".to_string()));
    }

    #[test]
    fn test_not_an_object() {
        let (valid, errors) = validate_mountain(&json!([1, 2]));
        assert!(!valid);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_bad_values_are_all_reported() {
        let mut record = stowe();
        record["state"] = json!("Vermont");
        record["lat"] = json!(144.5);
        record["green_pct"] = json!(40);
        record["pass_types"] = json!("epic,mountain_collective");
        record["lift_types"] = json!("gondola,chairlift");
        record["avg_weekend_price"] = json!(100);

        let (valid, errors) = validate_mountain(&record);
        assert!(!valid);
        assert_eq!(errors.len(), 6, "{errors:?}");
    }

    #[test]
    fn test_elevation_consistency() {
        let mut record = stowe();
        record["vertical_drop"] = json!(2400);
        assert!(validate_mountain(&record).0);

        record["vertical_drop"] = json!(2000);
        let (valid, errors) = validate_mountain(&record);
        assert!(!valid);
        assert!(errors[0].contains("vertical_drop"));
    }
}
