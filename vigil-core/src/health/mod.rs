//! Probe normalization and health evaluation.
//!
//! Raw per-location rows go through [`normalize`] to become a
//! [`HealthSummary`]; [`HealthEvaluator`] then decides whether the domain
//! needs replacing.

mod evaluator;
mod normalizer;
mod types;

pub use evaluator::{HealthEvaluator, DEFAULT_LATENCY_CEILING_MS, DEFAULT_SUCCESS_RATE_FLOOR};
pub use normalizer::{analyze, carrier_of, normalize, parse_response_time, parse_status};
pub use types::{
    normalize_success_rate, CarrierSummary, EvaluationReason, EvaluationResult, HealthSummary,
    LocationLatency, ProbeDetail, ProbeRow, UnavailableLocation,
};
