use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One per-location row produced by the external prober.
///
/// Every field is the text as scraped; coercion happens in the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRow {
    /// Detection point label, e.g. `Guangdong-China-Telecom`
    pub location: String,
    /// HTTP status code text, possibly empty or non-numeric
    #[serde(default)]
    pub status: String,
    /// Total response time text, e.g. `183ms` or `-`
    #[serde(default)]
    pub response_time: String,
}

impl ProbeRow {
    pub fn new(location: &str, status: &str, response_time: &str) -> Self {
        Self {
            location: location.to_string(),
            status: status.to_string(),
            response_time: response_time.to_string(),
        }
    }
}

/// Health snapshot for the primary domain of a brand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub domain: String,
    pub brand: String,
    /// Fraction of successful probes in `[0, 1]`
    pub success_rate: f64,
    /// Mean latency over successful probes; `None` when nothing succeeded
    #[serde(default)]
    pub average_response_time_ms: Option<f64>,
    /// Epoch seconds
    #[serde(default)]
    pub timestamp: i64,
    /// Per-location detail, carried through untouched
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl HealthSummary {
    /// Builds a summary, normalizing a percentage success rate to a fraction.
    pub fn new(
        domain: impl Into<String>,
        brand: impl Into<String>,
        success_rate: f64,
        average_response_time_ms: Option<f64>,
        timestamp: i64,
    ) -> Self {
        Self {
            domain: domain.into(),
            brand: brand.into(),
            success_rate: normalize_success_rate(success_rate),
            average_response_time_ms,
            timestamp,
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }
}

/// Converts a success rate given as a percentage (`> 1`) into a fraction.
///
/// Fractions pass through unchanged, so applying it twice is harmless.
pub fn normalize_success_rate(rate: f64) -> f64 {
    if !rate.is_finite() || rate < 0.0 {
        return 0.0;
    }
    if rate > 1.0 {
        (rate / 100.0).min(1.0)
    } else {
        rate
    }
}

/// A location and the latency it reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationLatency {
    pub location: String,
    pub response_time_ms: f64,
}

/// A location whose probe did not return 200.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailableLocation {
    pub location: String,
    pub status: String,
}

/// Success figures for one carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierSummary {
    pub total_checks: usize,
    pub success_checks: usize,
    pub success_rate: f64,
}

/// Diagnostic detail derived from a probe run, stored in [`HealthSummary::raw`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeDetail {
    pub total_checks: usize,
    pub success_checks: usize,
    pub success_rate: f64,
    pub average_response_time_ms: Option<f64>,
    pub max_response_time_ms: Option<f64>,
    pub min_response_time_ms: Option<f64>,
    pub slowest: Option<LocationLatency>,
    pub fastest: Option<LocationLatency>,
    pub error_status_distribution: BTreeMap<String, usize>,
    pub unavailable_locations: Vec<UnavailableLocation>,
    pub carriers: BTreeMap<String, CarrierSummary>,
    /// Informational only; remediation decisions use the evaluator.
    pub is_available: bool,
}

/// Why an evaluation came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationReason {
    LowSuccessRate,
    HighLatency,
    NoData,
    Healthy,
}

impl fmt::Display for EvaluationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationReason::LowSuccessRate => write!(f, "LOW_SUCCESS_RATE"),
            EvaluationReason::HighLatency => write!(f, "HIGH_LATENCY"),
            EvaluationReason::NoData => write!(f, "NO_DATA"),
            EvaluationReason::Healthy => write!(f, "HEALTHY"),
        }
    }
}

/// Outcome of applying threshold policy to a [`HealthSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub should_remediate: bool,
    pub reason: EvaluationReason,
    /// Human-readable explanation of the reason
    pub detail: String,
    pub summary: Option<HealthSummary>,
}

impl EvaluationResult {
    pub fn no_data(detail: impl Into<String>) -> Self {
        Self {
            should_remediate: false,
            reason: EvaluationReason::NoData,
            detail: detail.into(),
            summary: None,
        }
    }
}
