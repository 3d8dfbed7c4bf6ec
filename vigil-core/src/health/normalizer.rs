use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::types::{
    CarrierSummary, HealthSummary, LocationLatency, ProbeDetail, ProbeRow, UnavailableLocation,
};

/// Status code that counts as a successful probe.
const SUCCESS_STATUS: i64 = 200;

/// Success rate at or above which a domain is reported as available.
const AVAILABLE_RATE: f64 = 0.80;

static CARRIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"China-(Mobile|Telecom|Unicom)").expect("valid carrier regex"));

/// Coerce a scraped status into an integer code.
///
/// Accepts `"200"` and `"200.0"`; anything else is `None`.
pub fn parse_status(status: &str) -> Option<i64> {
    let status = status.trim();
    if let Ok(code) = status.parse::<i64>() {
        return Some(code);
    }
    let value: f64 = status.parse().ok()?;
    if value.is_finite() && value.fract() == 0.0 {
        Some(value as i64)
    } else {
        None
    }
}

/// Parse a response time such as `"183ms"`, `"183.5 ms"` or `"183"`.
///
/// Sentinels (`-`, empty), garbage and negative values yield `None` so they
/// are excluded from aggregates instead of counting as zero.
pub fn parse_response_time(text: &str) -> Option<f64> {
    let text = text.trim();
    let text = text
        .strip_suffix("ms")
        .or_else(|| text.strip_suffix("MS"))
        .unwrap_or(text)
        .trim();
    if text.is_empty() || text == "-" {
        return None;
    }
    let value: f64 = text.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Carrier token embedded in a location label, if any.
pub fn carrier_of(location: &str) -> Option<&str> {
    CARRIER_RE
        .captures(location)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn is_success(row: &ProbeRow) -> bool {
    parse_status(&row.status) == Some(SUCCESS_STATUS)
}

fn rate(success: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        success as f64 / total as f64
    }
}

/// Aggregate probe rows into diagnostic detail.
///
/// Returns `None` for an empty row set.
pub fn analyze(rows: &[ProbeRow]) -> Option<ProbeDetail> {
    if rows.is_empty() {
        return None;
    }

    let total_checks = rows.len();
    let success_checks = rows.iter().filter(|row| is_success(row)).count();
    let success_rate = rate(success_checks, total_checks);

    let timed: Vec<(&ProbeRow, f64)> = rows
        .iter()
        .filter(|row| is_success(row))
        .filter_map(|row| parse_response_time(&row.response_time).map(|ms| (row, ms)))
        .collect();

    let average_response_time_ms = if timed.is_empty() {
        None
    } else {
        Some(timed.iter().map(|(_, ms)| ms).sum::<f64>() / timed.len() as f64)
    };

    // First occurrence wins on ties
    let mut slowest: Option<(&ProbeRow, f64)> = None;
    let mut fastest: Option<(&ProbeRow, f64)> = None;
    for &(row, ms) in &timed {
        if slowest.map_or(true, |(_, max)| ms > max) {
            slowest = Some((row, ms));
        }
        if fastest.map_or(true, |(_, min)| ms < min) {
            fastest = Some((row, ms));
        }
    }
    let to_latency = |(row, ms): (&ProbeRow, f64)| LocationLatency {
        location: row.location.clone(),
        response_time_ms: ms,
    };

    let mut error_status_distribution = BTreeMap::new();
    let mut unavailable_locations = Vec::new();
    for row in rows.iter().filter(|row| !is_success(row)) {
        let status = match row.status.trim() {
            "" => "missing".to_string(),
            s => s.to_string(),
        };
        *error_status_distribution.entry(status.clone()).or_insert(0) += 1;
        unavailable_locations.push(UnavailableLocation {
            location: row.location.clone(),
            status,
        });
    }

    let mut carrier_counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for row in rows {
        if let Some(carrier) = carrier_of(&row.location) {
            let counts = carrier_counts.entry(carrier.to_string()).or_insert((0, 0));
            counts.0 += 1;
            if is_success(row) {
                counts.1 += 1;
            }
        }
    }
    let carriers = carrier_counts
        .into_iter()
        .map(|(carrier, (total, success))| {
            (
                carrier,
                CarrierSummary {
                    total_checks: total,
                    success_checks: success,
                    success_rate: rate(success, total),
                },
            )
        })
        .collect();

    Some(ProbeDetail {
        total_checks,
        success_checks,
        success_rate,
        average_response_time_ms,
        max_response_time_ms: slowest.map(|(_, ms)| ms),
        min_response_time_ms: fastest.map(|(_, ms)| ms),
        slowest: slowest.map(to_latency),
        fastest: fastest.map(to_latency),
        error_status_distribution,
        unavailable_locations,
        carriers,
        is_available: success_rate >= AVAILABLE_RATE,
    })
}

/// Turn probe rows for `domain` into a [`HealthSummary`].
///
/// `None` is the NO_DATA outcome: the prober returned nothing usable, which
/// says nothing about the domain's health.
pub fn normalize(domain: &str, brand: &str, rows: &[ProbeRow], timestamp: i64) -> Option<HealthSummary> {
    let Some(detail) = analyze(rows) else {
        debug!(domain, "No probe rows to normalize");
        return None;
    };

    let raw = serde_json::to_value(&detail).unwrap_or(serde_json::Value::Null);
    Some(
        HealthSummary::new(
            domain,
            brand,
            detail.success_rate,
            detail.average_response_time_ms,
            timestamp,
        )
        .with_raw(raw),
    )
}
