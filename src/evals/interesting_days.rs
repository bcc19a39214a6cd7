//! Finds days in the historic fixtures that make good end-to-end test cases:
//! big spreads in fresh snow, extreme cold, clear winners and toss-ups.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use clap::ValueEnum;
use serde::Serialize;

use super::backtest::FixtureConditions;
use super::fetch_historic::HistoricIndex;

/// Fresh snow missing from a record counts as none
const DEFAULT_FRESH_IN: f64 = 0.0;
const DEFAULT_TEMP_F: f64 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Category {
    Powder,
    Snow,
    Cold,
    Winner,
    Ambiguous,
    All,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAnalysis {
    pub date: String,
    #[serde(skip)]
    pub mountains: BTreeMap<String, FixtureConditions>,
    pub max_fresh_in: f64,
    pub min_fresh_in: f64,
    pub avg_fresh_in: f64,
    pub snow_variance_in: f64,
    pub best_snow_mountain: String,
    pub worst_snow_mountain: String,
    pub coldest_temp_f: f64,
    pub coldest_mountain: String,
    pub warmest_temp_f: f64,
    pub warmest_mountain: String,
}

impl DayAnalysis {
    /// `None` for a day with no mountains
    #[must_use]
    pub fn analyze(date: &str, mountains: &BTreeMap<String, FixtureConditions>) -> Option<Self> {
        let fresh = |c: &FixtureConditions| c.fresh_snow_24h_in.unwrap_or(DEFAULT_FRESH_IN);
        let temp = |c: &FixtureConditions| c.temp_f.unwrap_or(DEFAULT_TEMP_F);

        let best = mountains.iter().max_by(|a, b| fresh(a.1).total_cmp(&fresh(b.1)))?;
        let worst = mountains.iter().min_by(|a, b| fresh(a.1).total_cmp(&fresh(b.1)))?;
        let coldest = mountains.iter().min_by(|a, b| temp(a.1).total_cmp(&temp(b.1)))?;
        let warmest = mountains.iter().max_by(|a, b| temp(a.1).total_cmp(&temp(b.1)))?;
        let total: f64 = mountains.values().map(fresh).sum();

        let max_fresh_in = fresh(best.1);
        let min_fresh_in = fresh(worst.1);
        Some(Self {
            date: date.to_string(),
            mountains: mountains.clone(),
            max_fresh_in,
            min_fresh_in,
            avg_fresh_in: total / mountains.len() as f64,
            snow_variance_in: max_fresh_in - min_fresh_in,
            best_snow_mountain: best.0.clone(),
            worst_snow_mountain: worst.0.clone(),
            coldest_temp_f: temp(coldest.1),
            coldest_mountain: coldest.0.clone(),
            warmest_temp_f: temp(warmest.1),
            warmest_mountain: warmest.0.clone(),
        })
    }
}

/// One analysis per fixture date, in date order
#[must_use]
pub fn analyze_all(index: &HistoricIndex) -> Vec<DayAnalysis> {
    index
        .dates
        .iter()
        .filter_map(|(date, mountains)| DayAnalysis::analyze(date, mountains))
        .collect()
}

fn top_by<'a>(
    days: &'a [DayAnalysis],
    keep: impl Fn(&DayAnalysis) -> bool,
    key: impl Fn(&DayAnalysis) -> f64,
    descending: bool,
    limit: usize,
) -> Vec<&'a DayAnalysis> {
    let mut picked: Vec<&DayAnalysis> = days.iter().filter(|&d| keep(d)).collect();
    picked.sort_by(|a, b| {
        let order = key(*a).total_cmp(&key(*b));
        if descending { order.reverse() } else { order }
    });
    picked.truncate(limit);
    picked
}

#[must_use]
pub fn powder_variance_days(days: &[DayAnalysis], limit: usize) -> Vec<&DayAnalysis> {
    top_by(days, |_| true, |d| d.snow_variance_in, true, limit)
}

#[must_use]
pub fn big_snow_days(days: &[DayAnalysis], limit: usize) -> Vec<&DayAnalysis> {
    top_by(days, |_| true, |d| d.max_fresh_in, true, limit)
}

#[must_use]
pub fn cold_days(days: &[DayAnalysis], limit: usize) -> Vec<&DayAnalysis> {
    top_by(days, |_| true, |d| d.coldest_temp_f, false, limit)
}

/// One mountain got 4"+ and beat the worst by 3"+
#[must_use]
pub fn clear_winner_days(days: &[DayAnalysis], limit: usize) -> Vec<&DayAnalysis> {
    top_by(
        days,
        |d| d.max_fresh_in >= 4.0 && d.snow_variance_in >= 3.0,
        |d| d.snow_variance_in,
        true,
        limit,
    )
}

/// Everyone got about the same, and at least some snow fell
#[must_use]
pub fn ambiguous_days(days: &[DayAnalysis], limit: usize) -> Vec<&DayAnalysis> {
    top_by(
        days,
        |d| d.snow_variance_in < 2.0 && d.avg_fresh_in >= 1.0,
        |d| d.avg_fresh_in,
        true,
        limit,
    )
}

fn powder_section(days: &[DayAnalysis], limit: usize, out: &mut String) {
    let _ = writeln!(out, "\n=== Days with Highest Powder Variance ===");
    let _ = writeln!(out, "(Best for testing 'powder day' queries)\n");
    for d in powder_variance_days(days, limit) {
        let _ = writeln!(
            out,
            "{}: {:.1}\" variance | Best: {} ({:.1}\") | Worst: {} ({:.1}\")",
            d.date,
            d.snow_variance_in,
            d.best_snow_mountain,
            d.max_fresh_in,
            d.worst_snow_mountain,
            d.min_fresh_in
        );
    }
}

fn snow_section(days: &[DayAnalysis], limit: usize, out: &mut String) {
    let _ = writeln!(out, "\n=== Biggest Snow Days ===");
    let _ = writeln!(out, "(Most fresh snow at any mountain)\n");
    for d in big_snow_days(days, limit) {
        let _ = writeln!(
            out,
            "{}: {:.1}\" at {} | Avg: {:.1}\"",
            d.date, d.max_fresh_in, d.best_snow_mountain, d.avg_fresh_in
        );
    }
}

fn cold_section(days: &[DayAnalysis], limit: usize, out: &mut String) {
    let _ = writeln!(out, "\n=== Coldest Days ===");
    let _ = writeln!(out, "(Best for testing 'cold weather' queries)\n");
    for d in cold_days(days, limit) {
        let _ = writeln!(
            out,
            "{}: {:.0}°F at {} | Warmest: {:.0}°F at {}",
            d.date, d.coldest_temp_f, d.coldest_mountain, d.warmest_temp_f, d.warmest_mountain
        );
    }
}

fn winner_section(days: &[DayAnalysis], limit: usize, out: &mut String) {
    let _ = writeln!(out, "\n=== Clear Winner Days ===");
    let _ = writeln!(out, "(One mountain clearly best, good for Hit@1 tests)\n");
    let winners = clear_winner_days(days, limit);
    if winners.is_empty() {
        let _ = writeln!(out, "No days with clear winners (4\"+ snow, 3\"+ variance)");
    }
    for d in winners {
        let _ = writeln!(
            out,
            "{}: {} wins with {:.1}\" (next best has {:.1}\" less)",
            d.date, d.best_snow_mountain, d.max_fresh_in, d.snow_variance_in
        );
    }
}

fn ambiguous_section(days: &[DayAnalysis], limit: usize, out: &mut String) {
    let _ = writeln!(out, "\n=== Ambiguous Days ===");
    let _ = writeln!(out, "(Similar conditions everywhere, tests reasoning)\n");
    let picks = ambiguous_days(days, limit);
    if picks.is_empty() {
        let _ = writeln!(out, "No ambiguous days found");
    }
    for d in picks {
        let _ = writeln!(
            out,
            "{}: Avg {:.1}\" | Range: {:.1}\"-{:.1}\"",
            d.date, d.avg_fresh_in, d.min_fresh_in, d.max_fresh_in
        );
    }
}

/// Human-readable listing for one category, or all of them
#[must_use]
pub fn report(days: &[DayAnalysis], category: Category, limit: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Analyzing {} days of data...", days.len());
    match category {
        Category::Powder => powder_section(days, limit, &mut out),
        Category::Snow => snow_section(days, limit, &mut out),
        Category::Cold => cold_section(days, limit, &mut out),
        Category::Winner => winner_section(days, limit, &mut out),
        Category::Ambiguous => ambiguous_section(days, limit, &mut out),
        Category::All => {
            powder_section(days, limit, &mut out);
            snow_section(days, limit, &mut out);
            cold_section(days, limit, &mut out);
            winner_section(days, limit, &mut out);
            ambiguous_section(days, limit, &mut out);
        }
    }
    out
}

/// Per-mountain breakdown of a single date, best snow first
#[must_use]
pub fn day_details(index: &HistoricIndex, date: &str) -> Option<String> {
    let mountains = index.dates.get(date)?;
    let mut rows: Vec<(&String, &FixtureConditions)> = mountains.iter().collect();
    rows.sort_by(|a, b| {
        let fresh = |c: &FixtureConditions| c.fresh_snow_24h_in.unwrap_or(DEFAULT_FRESH_IN);
        fresh(b.1).total_cmp(&fresh(a.1))
    });

    let mut out = String::new();
    let _ = writeln!(out, "\n=== Conditions on {date} ===\n");
    for (name, c) in rows {
        let _ = writeln!(
            out,
            "{name:<20} {:>5.1}\" fresh | {:>4.0}°F | {:>4.0} mph wind",
            c.fresh_snow_24h_in.unwrap_or(DEFAULT_FRESH_IN),
            c.temp_f.unwrap_or(DEFAULT_TEMP_F),
            c.wind_mph.unwrap_or(0.0)
        );
    }
    Some(out)
}

/// Every category as one JSON document
pub fn to_json(days: &[DayAnalysis], limit: usize) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&serde_json::json!({
        "powder_variance": powder_variance_days(days, limit),
        "big_snow": big_snow_days(days, limit),
        "cold": cold_days(days, limit),
        "clear_winners": clear_winner_days(days, limit),
        "ambiguous": ambiguous_days(days, limit),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fresh_in: f64, temp_f: f64) -> FixtureConditions {
        FixtureConditions {
            fresh_snow_24h_in: Some(fresh_in),
            temp_f: Some(temp_f),
            ..FixtureConditions::default()
        }
    }

    fn index() -> HistoricIndex {
        let mut dates = BTreeMap::new();
        dates.insert(
            "2025-01-05".to_string(),
            BTreeMap::from([
                ("Jay Peak".to_string(), record(10.0, 12.0)),
                ("Stowe".to_string(), record(6.0, 15.0)),
                ("Okemo".to_string(), record(1.0, 20.0)),
            ]),
        );
        dates.insert(
            "2025-01-06".to_string(),
            BTreeMap::from([
                ("Jay Peak".to_string(), record(2.0, -12.0)),
                ("Stowe".to_string(), record(1.5, -8.0)),
                ("Okemo".to_string(), FixtureConditions::default()),
            ]),
        );
        dates.insert(
            "2025-01-07".to_string(),
            BTreeMap::from([
                ("Jay Peak".to_string(), record(3.0, 25.0)),
                ("Stowe".to_string(), record(2.5, 26.0)),
                ("Okemo".to_string(), record(2.0, 30.0)),
            ]),
        );
        dates.insert("2025-01-08".to_string(), BTreeMap::new());
        HistoricIndex {
            start_date: "2025-01-05".to_string(),
            end_date: "2025-01-08".to_string(),
            mountains: vec!["Jay Peak".into(), "Stowe".into(), "Okemo".into()],
            dates,
        }
    }

    #[test]
    fn test_analysis_fills_missing_values() {
        let days = analyze_all(&index());
        assert_eq!(days.len(), 3);

        let jan6 = &days[1];
        assert_eq!(jan6.min_fresh_in, 0.0);
        assert_eq!(jan6.worst_snow_mountain, "Okemo");
        assert_eq!(jan6.warmest_temp_f, 32.0);
        assert_eq!(jan6.coldest_mountain, "Jay Peak");
        assert_eq!(jan6.snow_variance_in, 2.0);
    }

    #[test]
    fn test_finders_order_and_filter() {
        let days = analyze_all(&index());

        assert_eq!(powder_variance_days(&days, 1)[0].date, "2025-01-05");
        assert_eq!(cold_days(&days, 1)[0].date, "2025-01-06");

        let winners = clear_winner_days(&days, 5);
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].best_snow_mountain, "Jay Peak");

        let ambiguous = ambiguous_days(&days, 5);
        assert_eq!(ambiguous.len(), 1);
        assert_eq!(ambiguous[0].date, "2025-01-07");
    }

    #[test]
    fn test_empty_categories_say_so() {
        let days: Vec<DayAnalysis> = Vec::new();
        let text = report(&days, Category::All, 5);
        assert!(text.contains("No days with clear winners (4\"+ snow, 3\"+ variance)"));
        assert!(text.contains("No ambiguous days found"));
    }

    #[test]
    fn test_day_details_sorted_by_snow() {
        let text = day_details(&index(), "2025-01-05").unwrap();
        let jay = text.find("Jay Peak").unwrap();
        let okemo = text.find("Okemo").unwrap();
        assert!(jay < okemo);
        assert!(day_details(&index(), "2030-01-01").is_none());
    }

    #[test]
    fn test_json_has_every_category() {
        let days = analyze_all(&index());
        let json: serde_json::Value = serde_json::from_str(&to_json(&days, 2).unwrap()).unwrap();
        assert_eq!(json["big_snow"][0]["best_snow_mountain"], "Jay Peak");
        assert_eq!(json["cold"].as_array().unwrap().len(), 2);
        assert!(json["clear_winners"].is_array());
    }
}
