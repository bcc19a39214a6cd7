//! Crowd calendar for north-eastern ski areas.
//!
//! A fixed rule table: holiday periods first, then the February school
//! vacation weeks, then plain weekends and weekdays.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrowdLevel {
    Normal,
    Moderate,
    High,
    Extreme,
}

/// Expected crowds at a mountain on a given day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdContext {
    pub is_holiday_weekend: bool,
    /// "MA/NH" or "NY" during the February vacation weeks
    pub vacation_week: Option<String>,
    pub crowd_level: CrowdLevel,
    pub crowd_note: String,
}

impl CrowdContext {
    fn new(is_holiday_weekend: bool, vacation_week: Option<&str>, crowd_level: CrowdLevel, note: &str) -> Self {
        Self {
            is_holiday_weekend,
            vacation_week: vacation_week.map(str::to_string),
            crowd_level,
            crowd_note: note.to_string(),
        }
    }
}

fn third_monday(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Mon, 3)
}

fn offset(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

fn within(date: NaiveDate, anchor: Option<NaiveDate>, from: i64, to: i64) -> bool {
    let Some(anchor) = anchor else {
        return false;
    };
    match (offset(anchor, from), offset(anchor, to)) {
        (Some(start), Some(end)) => (start..=end).contains(&date),
        _ => false,
    }
}

/// Assess expected crowds for `date` at a mountain in `state` (two-letter code).
#[must_use]
pub fn crowd_context(date: NaiveDate, state: &str) -> CrowdContext {
    use CrowdLevel::{Extreme, High, Moderate, Normal};

    let is_weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
    let is_maine = state.trim().eq_ignore_ascii_case("ME");
    let (month, day) = (date.month(), date.day());

    if month == 12 && (24..=31).contains(&day) {
        return CrowdContext::new(true, None, Extreme, "Christmas week - expect extreme crowds everywhere");
    }
    if month == 1 && day <= 2 {
        return CrowdContext::new(true, None, Extreme, "New Year's holiday - expect extreme crowds everywhere");
    }

    if within(date, third_monday(date.year(), 1), -2, 0) {
        return CrowdContext::new(true, None, High, "MLK weekend - expect high crowds");
    }

    let presidents_day = third_monday(date.year(), 2);

    if within(date, presidents_day, -2, 6) {
        let (level, note) = if is_maine {
            (
                if is_weekend { High } else { Moderate },
                "MA/NH vacation week - Maine less packed than Vermont",
            )
        } else {
            (
                if is_weekend { Extreme } else { High },
                "MA/NH vacation week - expect extreme crowds",
            )
        };
        return CrowdContext::new(is_weekend, Some("MA/NH"), level, note);
    }

    if within(date, presidents_day, 7, 13) {
        let (level, note) = if is_maine {
            (
                if is_weekend { Moderate } else { Normal },
                "NY vacation week - Maine gets fewer NYC crowds, good escape option",
            )
        } else {
            (
                if is_weekend { Extreme } else { High },
                "NY vacation week - VT will be packed, consider Maine",
            )
        };
        return CrowdContext::new(is_weekend, Some("NY"), level, note);
    }

    if is_weekend {
        CrowdContext::new(false, None, Moderate, "Regular weekend - typical crowds")
    } else {
        CrowdContext::new(false, None, Normal, "Weekday - lighter crowds expected")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[rstest]
    #[case("2024-12-24", CrowdLevel::Extreme)]
    #[case("2024-12-31", CrowdLevel::Extreme)]
    #[case("2025-01-01", CrowdLevel::Extreme)]
    #[case("2025-01-02", CrowdLevel::Extreme)]
    #[case("2025-01-03", CrowdLevel::Normal)]
    fn test_holiday_period(#[case] day: &str, #[case] expected: CrowdLevel) {
        assert_eq!(crowd_context(date(day), "VT").crowd_level, expected);
    }

    #[rstest]
    #[case("2025-01-18")]
    #[case("2025-01-19")]
    #[case("2025-01-20")]
    fn test_mlk_weekend(#[case] day: &str) {
        let ctx = crowd_context(date(day), "VT");
        assert_eq!(ctx.crowd_level, CrowdLevel::High);
        assert!(ctx.is_holiday_weekend);
        assert_eq!(ctx.crowd_note, "MLK weekend - expect high crowds");
    }

    #[test]
    fn test_day_after_mlk_is_a_weekday() {
        let ctx = crowd_context(date("2025-01-21"), "VT");
        assert_eq!(ctx.crowd_level, CrowdLevel::Normal);
    }

    #[rstest]
    #[case("2025-02-15", "MA", CrowdLevel::Extreme, true)]
    #[case("2025-02-16", "NH", CrowdLevel::Extreme, true)]
    #[case("2025-02-17", "VT", CrowdLevel::High, false)]
    #[case("2025-02-23", "VT", CrowdLevel::Extreme, true)]
    #[case("2025-02-15", "ME", CrowdLevel::High, true)]
    #[case("2025-02-18", "ME", CrowdLevel::Moderate, false)]
    fn test_ma_nh_vacation_week(
        #[case] day: &str,
        #[case] state: &str,
        #[case] expected: CrowdLevel,
        #[case] holiday: bool,
    ) {
        let ctx = crowd_context(date(day), state);
        assert_eq!(ctx.vacation_week.as_deref(), Some("MA/NH"));
        assert_eq!(ctx.crowd_level, expected);
        assert_eq!(ctx.is_holiday_weekend, holiday);
    }

    #[rstest]
    #[case("2025-02-24", "VT", CrowdLevel::High)]
    #[case("2025-03-01", "VT", CrowdLevel::Extreme)]
    #[case("2025-02-25", "ME", CrowdLevel::Normal)]
    #[case("2025-03-02", "ME", CrowdLevel::Moderate)]
    fn test_ny_vacation_week(#[case] day: &str, #[case] state: &str, #[case] expected: CrowdLevel) {
        let ctx = crowd_context(date(day), state);
        assert_eq!(ctx.vacation_week.as_deref(), Some("NY"));
        assert_eq!(ctx.crowd_level, expected);
    }

    #[test]
    fn test_maine_note_during_ny_week() {
        let ctx = crowd_context(date("2025-02-26"), "me");
        assert_eq!(
            ctx.crowd_note,
            "NY vacation week - Maine gets fewer NYC crowds, good escape option"
        );
    }

    #[rstest]
    #[case("2025-01-11", CrowdLevel::Moderate, "Regular weekend - typical crowds")]
    #[case("2025-01-15", CrowdLevel::Normal, "Weekday - lighter crowds expected")]
    #[case("2025-03-03", CrowdLevel::Normal, "Weekday - lighter crowds expected")]
    fn test_regular_days(#[case] day: &str, #[case] expected: CrowdLevel, #[case] note: &str) {
        let ctx = crowd_context(date(day), "VT");
        assert_eq!(ctx.crowd_level, expected);
        assert_eq!(ctx.crowd_note, note);
        assert!(!ctx.is_holiday_weekend);
        assert!(ctx.vacation_week.is_none());
    }

    #[test]
    fn test_serializes_lowercase_level() {
        let ctx = crowd_context(date("2025-01-15"), "VT");
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["crowd_level"], "normal");
        assert!(json["vacation_week"].is_null());
    }
}
