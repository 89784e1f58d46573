//! Date parsing and NAV-series return calculations shared by every provider.

use chrono::{Duration, NaiveDate};

/// A single NAV observation.
pub type NavPoint = (NaiveDate, f64);

/// Anchors used for a trailing-window return, kept for diagnostic logging.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowReturn {
    pub value: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub start_value: Option<f64>,
    pub end_date: Option<NaiveDate>,
    pub end_value: Option<f64>,
}

/// Parses `YYYYMMDD`, `YYYY-MM-DD` or `YYYY/MM/DD`, ignoring anything after the first space.
///
/// Returns `None` for any other shape and for impossible calendar dates such as `2024-13-40`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim().split(' ').next()?;
    let bytes = s.as_bytes();
    let all_digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);

    let (year, month, day) = match bytes.len() {
        8 if all_digits(0..8) => (&s[0..4], &s[4..6], &s[6..8]),
        10 if all_digits(0..4)
            && all_digits(5..7)
            && all_digits(8..10)
            && bytes[4] == bytes[7]
            && (bytes[4] == b'-' || bytes[4] == b'/') =>
        {
            (&s[0..4], &s[5..7], &s[8..10])
        }
        _ => return None,
    };

    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Annualized percentage return between two NAV observations.
///
/// `None` when either value is not strictly positive, when `end_date` is not strictly after
/// `start_date`, or when the result is not finite.
pub fn annualized_return(
    start_value: f64,
    end_value: f64,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Option<f64> {
    if !(start_value > 0.0 && end_value > 0.0) {
        return None;
    }
    let days = (end_date - start_date).num_days();
    if days <= 0 {
        return None;
    }
    let annualized = ((end_value / start_value).powf(365.0 / days as f64) - 1.0) * 100.0;
    annualized.is_finite().then_some(annualized)
}

/// Sorts ascending by date and keeps the first-seen observation for duplicate dates.
pub fn sort_series(series: &[NavPoint]) -> Vec<NavPoint> {
    let mut sorted = series.to_vec();
    // stable, so the first-seen point of a date stays in front
    sorted.sort_by_key(|(date, _)| *date);
    sorted.dedup_by_key(|(date, _)| *date);
    sorted
}

/// Annualized return between the last observation and the latest observation at or before
/// `last date - window_days`, falling back to the first observation.
pub fn compute_window_return(series: &[NavPoint], window_days: i64) -> WindowReturn {
    let sorted = sort_series(series);
    if sorted.len() < 2 {
        return WindowReturn::default();
    }

    let (end_date, end_value) = sorted[sorted.len() - 1];
    let target = end_date - Duration::days(window_days);
    let (start_date, start_value) = sorted
        .iter()
        .take_while(|(date, _)| *date <= target)
        .last()
        .copied()
        .unwrap_or(sorted[0]);

    WindowReturn {
        value: annualized_return(start_value, end_value, start_date, end_date),
        start_date: Some(start_date),
        start_value: Some(start_value),
        end_date: Some(end_date),
        end_value: Some(end_value),
    }
}

/// Annualized return between the first and last observation of a pre-scoped series.
pub fn compute_return_from_series(series: &[NavPoint]) -> Option<f64> {
    let sorted = sort_series(series);
    if sorted.len() < 2 {
        return None;
    }
    let (start_date, start_value) = sorted[0];
    let (end_date, end_value) = sorted[sorted.len() - 1];
    annualized_return(start_value, end_value, start_date, end_date)
}
