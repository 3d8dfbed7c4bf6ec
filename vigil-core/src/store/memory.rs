use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::{
    brand_key, decode_summary, encode_summary, metadata_key, parse_index, summary_key,
    upsert_index, BrandIndexEntry, HealthStore, ENTRY_TTL,
};
use crate::cache::TtlCache;
use crate::error::Result;
use crate::health::HealthSummary;

/// Process-local health store with the same key layout and expiry as Redis.
///
/// Used for dry runs and tests.
pub struct MemoryHealthStore {
    entries: TtlCache<String, String>,
}

impl Default for MemoryHealthStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHealthStore {
    pub fn new() -> Self {
        Self::with_ttl(ENTRY_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: TtlCache::new(ttl),
        }
    }

    /// Writes a raw payload, bypassing encoding. Lets callers seed data in
    /// the exact shape an external prober would.
    pub fn put_raw(&self, key: impl Into<String>, payload: impl Into<String>) {
        self.entries.insert(key.into(), payload.into());
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.entries.get(&key.to_string())
    }
}

#[async_trait]
impl HealthStore for MemoryHealthStore {
    async fn ping(&self) -> Result<()> {
        self.entries.cleanup();
        Ok(())
    }

    async fn load_primary(&self, brand: &str) -> Result<Option<HealthSummary>> {
        let Some(index_payload) = self.get_raw(&brand_key(brand)) else {
            debug!(brand, "No brand index");
            return Ok(None);
        };
        let index = parse_index(brand, &index_payload);
        let Some(primary) = index.first().filter(|entry| !entry.domain.is_empty()) else {
            return Ok(None);
        };
        let Some(payload) = self.get_raw(&summary_key(&primary.domain)) else {
            debug!(brand, domain = %primary.domain, "No summary for primary domain");
            return Ok(None);
        };
        Ok(decode_summary(brand, &primary.domain, &payload))
    }

    async fn save(&self, summary: &HealthSummary, name: &str) -> Result<()> {
        self.put_raw(summary_key(&summary.domain), encode_summary(summary, name)?);

        let key = brand_key(&summary.brand);
        let mut index = self
            .get_raw(&key)
            .map(|payload| parse_index(&summary.brand, &payload))
            .unwrap_or_default();
        upsert_index(&mut index, BrandIndexEntry::from_summary(summary, name));
        self.put_raw(key, serde_json::to_string(&index)?);

        let metadata = serde_json::json!({ "last_test_time": Utc::now().timestamp() });
        self.put_raw(metadata_key(), metadata.to_string());
        Ok(())
    }
}
