use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::ProbeBackend;
use crate::error::Result;
use crate::health::ProbeRow;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_ATTEMPTS: usize = 5;

/// Probes a host with sequential HTTPS GETs from this machine.
///
/// Each request becomes one row labelled `local-<n>`. Failed requests get an
/// empty status and a `-` response time.
#[derive(Debug, Clone)]
pub struct HttpProbeBackend {
    http: Client,
    attempts: usize,
    scheme: &'static str,
}

impl HttpProbeBackend {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            attempts: DEFAULT_ATTEMPTS,
            scheme: "https",
        })
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Probe over plain HTTP.
    pub fn insecure(mut self) -> Self {
        self.scheme = "http";
        self
    }

    async fn probe_once(&self, url: &str, label: String) -> ProbeRow {
        let started = Instant::now();
        match self.http.get(url).send().await {
            Ok(response) => {
                let elapsed = started.elapsed().as_millis();
                let status = response.status().as_u16();
                debug!(%status, elapsed_ms = %elapsed, "Probe response");
                ProbeRow::new(&label, &status.to_string(), &format!("{}ms", elapsed))
            }
            Err(e) => {
                debug!(error = %e, "Probe request failed");
                ProbeRow::new(&label, "", "-")
            }
        }
    }
}

#[async_trait]
impl ProbeBackend for HttpProbeBackend {
    #[instrument(skip(self))]
    async fn probe(&self, host: &str) -> Result<Vec<ProbeRow>> {
        let url = format!("{}://{}", self.scheme, host);
        let mut rows = Vec::with_capacity(self.attempts);
        for n in 1..=self.attempts {
            rows.push(self.probe_once(&url, format!("local-{}", n)).await);
        }
        Ok(rows)
    }
}
