use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::cloudflare::DnsAuthority;
use super::records::{NewRecord, RecordType};
use crate::error::Result;
use crate::naming::{CandidateDomain, CandidateStatus};
use crate::retry::{NetworkRetryClassifier, RetryExecutor, RetryPolicy};
use crate::validation::parse_record_address;

/// Default TTL for created records, in seconds.
pub const DEFAULT_RECORD_TTL: u32 = 300;

/// Why provisioning failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisionFailure {
    ZoneNotFound,
    InvalidAddress(String),
    Provider(String),
}

impl fmt::Display for ProvisionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionFailure::ZoneNotFound => write!(f, "ZONE_NOT_FOUND"),
            ProvisionFailure::InvalidAddress(msg) => write!(f, "INVALID_ADDRESS: {}", msg),
            ProvisionFailure::Provider(msg) => write!(f, "PROVIDER_ERROR: {}", msg),
        }
    }
}

/// Result of one `provision` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionOutcome {
    /// Candidate with its final status
    pub candidate: CandidateDomain,
    pub zone_id: Option<String>,
    pub record_id: Option<String>,
    pub failure: Option<ProvisionFailure>,
}

impl ProvisionOutcome {
    fn failed(mut candidate: CandidateDomain, zone_id: Option<String>, failure: ProvisionFailure) -> Self {
        candidate.status = CandidateStatus::Failed;
        Self {
            candidate,
            zone_id,
            record_id: None,
            failure: Some(failure),
        }
    }

    pub fn status(&self) -> CandidateStatus {
        self.candidate.status
    }

    pub fn is_failed(&self) -> bool {
        self.candidate.status == CandidateStatus::Failed
    }
}

/// Idempotent creation of replacement A records.
///
/// Zone IDs are cached per apex for the life of the provisioner. Zone and
/// record lookups are retried on transient failures; creation is not, so a
/// timed-out create can never be issued twice within one call.
pub struct DnsProvisioner {
    authority: Arc<dyn DnsAuthority>,
    zones: RwLock<HashMap<String, String>>,
    ttl: u32,
    retry: RetryExecutor<NetworkRetryClassifier>,
}

impl DnsProvisioner {
    pub fn new(authority: Arc<dyn DnsAuthority>) -> Self {
        Self {
            authority,
            zones: RwLock::new(HashMap::new()),
            ttl: DEFAULT_RECORD_TTL,
            retry: RetryExecutor::new(RetryPolicy::default()),
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    fn cached_zone(&self, apex: &str) -> Option<String> {
        let zones = self.zones.read().unwrap_or_else(|poisoned| {
            warn!("Zone cache lock poisoned, recovering");
            poisoned.into_inner()
        });
        zones.get(apex).cloned()
    }

    fn cache_zone(&self, apex: &str, zone_id: &str) {
        let mut zones = self.zones.write().unwrap_or_else(|poisoned| {
            warn!("Zone cache lock poisoned, recovering");
            poisoned.into_inner()
        });
        zones.insert(apex.to_string(), zone_id.to_string());
    }

    /// Number of apexes with a cached zone ID.
    pub fn cached_zones(&self) -> usize {
        self.zones.read().map(|zones| zones.len()).unwrap_or(0)
    }

    /// Zone ID for an apex, from cache or the authority.
    pub async fn resolve_zone(&self, apex: &str) -> Result<Option<String>> {
        if let Some(zone_id) = self.cached_zone(apex) {
            debug!(apex, "Zone cache hit");
            return Ok(Some(zone_id));
        }

        let zone_id = self
            .retry
            .execute(|| self.authority.find_zone(apex))
            .await?;
        if let Some(zone_id) = &zone_id {
            self.cache_zone(apex, zone_id);
        }
        Ok(zone_id)
    }

    /// Ensures an A record for `candidate.fqdn` exists, pointing at `ip`.
    ///
    /// Never returns an error: every failure is carried in the outcome so the
    /// caller can short-circuit the brand without aborting the cycle.
    #[instrument(skip(self, candidate), fields(fqdn = %candidate.fqdn))]
    pub async fn provision(&self, candidate: CandidateDomain, apex: &str, ip: &str) -> ProvisionOutcome {
        let address = match parse_record_address(ip) {
            Ok(address) => address.to_string(),
            Err(e) => {
                return ProvisionOutcome::failed(
                    candidate,
                    None,
                    ProvisionFailure::InvalidAddress(e.to_string()),
                )
            }
        };

        let zone_id = match self.resolve_zone(apex).await {
            Ok(Some(zone_id)) => zone_id,
            Ok(None) => {
                warn!(apex, "Zone not found");
                return ProvisionOutcome::failed(candidate, None, ProvisionFailure::ZoneNotFound);
            }
            Err(e) => {
                return ProvisionOutcome::failed(candidate, None, ProvisionFailure::Provider(e.to_string()))
            }
        };

        let existing = self
            .retry
            .execute(|| {
                self.authority
                    .find_record(&zone_id, &candidate.fqdn, RecordType::A)
            })
            .await;

        let mut candidate = candidate;
        match existing {
            Ok(Some(record)) => {
                info!(content = %record.content, "Record already exists");
                candidate.status = CandidateStatus::AlreadyExists;
                return ProvisionOutcome {
                    candidate,
                    zone_id: Some(zone_id),
                    record_id: Some(record.id),
                    failure: None,
                };
            }
            Ok(None) => {}
            Err(e) => {
                return ProvisionOutcome::failed(
                    candidate,
                    Some(zone_id),
                    ProvisionFailure::Provider(e.to_string()),
                )
            }
        }

        let request = NewRecord::a(&candidate.fqdn, &address, self.ttl);
        match self.authority.create_record(&zone_id, &request).await {
            Ok(record) => {
                info!(record_id = %record.id, content = %address, "Record created");
                candidate.status = CandidateStatus::Created;
                ProvisionOutcome {
                    candidate,
                    zone_id: Some(zone_id),
                    record_id: Some(record.id),
                    failure: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Record creation failed");
                ProvisionOutcome::failed(candidate, Some(zone_id), ProvisionFailure::Provider(e.to_string()))
            }
        }
    }
}
