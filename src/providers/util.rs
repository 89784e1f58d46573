use crate::core::ScrapeError;
use crate::core::product::{ReturnWindow, WindowReturns};
use crate::core::series::{NavPoint, compute_window_return, parse_date};
use serde_json::Value;
use tracing::debug;

/// Non-empty string form of a JSON scalar; numbers are rendered, everything else is `None`.
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First key of `obj` holding a non-empty scalar, as text, or `""`.
pub fn first_text(obj: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| obj.get(key).and_then(text_of))
        .unwrap_or_default()
}

/// Numeric value of a JSON number or numeric string; a trailing `%` is ignored.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

/// Like [`parse_number`], but a numeric zero counts as absent.
pub fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(_) => parse_number(value).filter(|v| *v != 0.0),
        _ => parse_number(value),
    }
}

/// First key of `obj` holding a usable number.
pub fn first_number(obj: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| obj.get(key).and_then(number_of))
}

/// Array at `pointer` (JSON pointer syntax), or an empty slice.
pub fn array_at<'a>(value: &'a Value, pointer: &str) -> &'a [Value] {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Builds a NAV series from rows, skipping rows whose date or value is unusable.
pub fn nav_series(rows: &[Value], date_keys: &[&str], value_keys: &[&str]) -> Vec<NavPoint> {
    rows.iter()
        .filter_map(|row| {
            let date = parse_date(&first_text(row, date_keys))?;
            let nav = first_number(row, value_keys)?;
            Some((date, nav))
        })
        .collect()
}

/// Non-empty, trimmed query parameter of `url`.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn require_query_param(url: &str, name: &str) -> Result<String, ScrapeError> {
    query_param(url, name).ok_or_else(|| ScrapeError::MissingParameter {
        parameter: name.to_string(),
        url: url.to_string(),
    })
}

/// Fills each of `windows` from the NAV series, logging the anchors used.
pub fn fill_from_nav(
    returns: &mut WindowReturns,
    series: &[NavPoint],
    windows: &[ReturnWindow],
    provider: &str,
    product: &str,
) {
    for window in windows {
        let result = compute_window_return(series, window.days());
        debug!(
            provider,
            product,
            window = window.key(),
            start = ?result.start_date,
            start_nav = ?result.start_value,
            end = ?result.end_date,
            end_nav = ?result.end_value,
            value = ?result.value,
            "return from NAV"
        );
        returns.set(*window, result.value);
    }
}

/// Replaces scheme, host and port of `url` with those of `base`, keeping path and query.
pub fn rebase_url(url: &str, base: &str) -> Result<String, ScrapeError> {
    let invalid = |u: &str| ScrapeError::Domain(format!("Invalid URL: {u}"));
    let parsed = reqwest::Url::parse(url).map_err(|_| invalid(url))?;
    let mut rebased = reqwest::Url::parse(base).map_err(|_| invalid(base))?;
    let prefix = rebased.path().trim_end_matches('/').to_string();
    rebased.set_path(&format!("{prefix}{}", parsed.path()));
    rebased.set_query(parsed.query());
    Ok(rebased.to_string())
}
