//! Probe ingestion: collect per-location rows for a host, normalize them and
//! store the summary.

mod file;
mod http;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::health::{normalize, HealthSummary, ProbeRow};
use crate::store::HealthStore;
use crate::validation::normalize_domain;

pub use file::FileProbeBackend;
pub use http::HttpProbeBackend;

/// Source of raw probe rows.
#[async_trait]
pub trait ProbeBackend: Send + Sync {
    /// Rows for `host`; an empty vector means the probe produced nothing.
    async fn probe(&self, host: &str) -> Result<Vec<ProbeRow>>;
}

pub struct Prober {
    backend: Arc<dyn ProbeBackend>,
    store: Arc<dyn HealthStore>,
}

impl Prober {
    pub fn new(backend: Arc<dyn ProbeBackend>, store: Arc<dyn HealthStore>) -> Self {
        Self { backend, store }
    }

    /// Probes `url` and stores the summary under `brand`.
    ///
    /// Returns `Ok(None)` when the probe yielded no rows; nothing is stored
    /// in that case.
    #[instrument(skip(self))]
    pub async fn probe_and_store(
        &self,
        brand: &str,
        url: &str,
        name: &str,
    ) -> Result<Option<HealthSummary>> {
        let host = normalize_domain(url)?;
        let rows = self.backend.probe(&host).await?;

        let Some(summary) = normalize(&host, brand, &rows, Utc::now().timestamp()) else {
            warn!(host = %host, "Probe returned no rows");
            return Ok(None);
        };

        self.store.save(&summary, name).await?;
        info!(
            host = %host,
            success_rate = summary.success_rate,
            avg_ms = ?summary.average_response_time_ms,
            "Stored probe summary"
        );
        Ok(Some(summary))
    }
}
