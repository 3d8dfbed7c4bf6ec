//! Health cache access.
//!
//! The prober writes one summary per domain plus a per-brand index whose
//! first entry names the domain the monitor evaluates. Both live for 24
//! hours. Anything missing or unreadable is treated as "no data".

mod memory;
mod redis_store;

use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::Result;
use crate::health::{normalize_success_rate, HealthSummary};

pub use self::memory::MemoryHealthStore;
pub use self::redis_store::RedisHealthStore;

/// Expiry applied to every key written by the prober.
pub const ENTRY_TTL: Duration = Duration::from_secs(86_400);

const KEY_PREFIX: &str = "domain_test";

pub fn brand_key(brand: &str) -> String {
    format!("{}:brand:{}", KEY_PREFIX, brand)
}

pub fn summary_key(domain: &str) -> String {
    format!("{}:{}", KEY_PREFIX, domain)
}

pub fn metadata_key() -> String {
    format!("{}:metadata", KEY_PREFIX)
}

/// Read/write access to stored health summaries.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Fails when the store cannot be reached at all.
    async fn ping(&self) -> Result<()>;

    /// Summary of the brand's primary domain, or `None` when there is no
    /// usable data. Errors are reserved for transport failures.
    async fn load_primary(&self, brand: &str) -> Result<Option<HealthSummary>>;

    /// Stores a summary and upserts it into the brand index.
    async fn save(&self, summary: &HealthSummary, name: &str) -> Result<()>;
}

/// One row of the per-brand index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandIndexEntry {
    pub domain: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_response_time_ms: Option<f64>,
}

impl BrandIndexEntry {
    pub fn from_summary(summary: &HealthSummary, name: &str) -> Self {
        Self {
            domain: summary.domain.clone(),
            name: name.to_string(),
            success_rate: summary.success_rate,
            average_response_time_ms: summary.average_response_time_ms,
        }
    }
}

/// Success rate descending, then latency ascending (unknown latency last).
fn index_order(a: &BrandIndexEntry, b: &BrandIndexEntry) -> Ordering {
    b.success_rate
        .total_cmp(&a.success_rate)
        .then_with(|| match (a.average_response_time_ms, b.average_response_time_ms) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

/// Replaces or adds `entry` and re-sorts the index.
pub fn upsert_index(index: &mut Vec<BrandIndexEntry>, entry: BrandIndexEntry) {
    match index.iter_mut().find(|e| e.domain == entry.domain) {
        Some(existing) => *existing = entry,
        None => index.push(entry),
    }
    index.sort_by(index_order);
}

/// Parses a stored brand index; malformed payloads read as empty.
pub fn parse_index(brand: &str, payload: &str) -> Vec<BrandIndexEntry> {
    match serde_json::from_str(payload) {
        Ok(index) => index,
        Err(e) => {
            warn!(brand, error = %e, "Ignoring malformed brand index");
            Vec::new()
        }
    }
}

/// Flat JSON object stored under the summary key: the probe detail with the
/// summary fields on top.
pub fn encode_summary(summary: &HealthSummary, name: &str) -> Result<String> {
    let mut object = match &summary.raw {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    object.insert("domain".to_string(), Value::from(summary.domain.clone()));
    object.insert("brand".to_string(), Value::from(summary.brand.clone()));
    object.insert("name".to_string(), Value::from(name));
    object.insert("success_rate".to_string(), Value::from(summary.success_rate));
    object.insert(
        "average_response_time_ms".to_string(),
        summary
            .average_response_time_ms
            .map(Value::from)
            .unwrap_or(Value::Null),
    );
    object.insert("timestamp".to_string(), Value::from(summary.timestamp));
    Ok(serde_json::to_string(&Value::Object(object))?)
}

/// Decodes a stored summary. Percentage success rates are normalized here
/// so everything downstream sees a fraction.
pub fn decode_summary(brand: &str, domain: &str, payload: &str) -> Option<HealthSummary> {
    let value: Value = match serde_json::from_str(payload) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            warn!(domain, "Stored summary is not a JSON object");
            return None;
        }
        Err(e) => {
            warn!(domain, error = %e, "Ignoring malformed stored summary");
            return None;
        }
    };

    let success_rate = value
        .get("success_rate")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let average_response_time_ms = value
        .get("average_response_time_ms")
        .and_then(Value::as_f64)
        .filter(|ms| *ms >= 0.0);
    let timestamp = value.get("timestamp").and_then(Value::as_i64).unwrap_or(0);

    Some(HealthSummary {
        domain: domain.to_string(),
        brand: brand.to_string(),
        success_rate: normalize_success_rate(success_rate),
        average_response_time_ms,
        timestamp,
        raw: value,
    })
}
