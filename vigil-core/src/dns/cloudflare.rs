use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::records::{DnsRecord, NewRecord, RecordType};
use crate::config::CloudflareAuth;
use crate::error::{Result, VigilError};

const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Capability surface of a DNS authority.
#[async_trait]
pub trait DnsAuthority: Send + Sync {
    /// Zone identifier for an apex domain, `None` when the account has no such zone.
    async fn find_zone(&self, apex: &str) -> Result<Option<String>>;

    async fn find_record(
        &self,
        zone_id: &str,
        fqdn: &str,
        record_type: RecordType,
    ) -> Result<Option<DnsRecord>>;

    async fn create_record(&self, zone_id: &str, record: &NewRecord) -> Result<DnsRecord>;
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Standard v4 response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

/// Unwraps an envelope, turning `success: false` into a provider error.
fn unwrap_envelope<T>(status: StatusCode, body: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    let envelope: Envelope<T> = serde_json::from_str(body).map_err(|e| VigilError::Provider {
        status: status.as_u16(),
        message: format!("unreadable response: {}", e),
    })?;

    if !envelope.success || !status.is_success() {
        let message = if envelope.errors.is_empty() {
            format!("request failed with status {}", status)
        } else {
            envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ")
        };
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(VigilError::RateLimited(message));
        }
        return Err(VigilError::Provider {
            status: status.as_u16(),
            message,
        });
    }

    Ok(envelope.result)
}

/// Cloudflare v4 API client.
#[derive(Debug, Clone)]
pub struct CloudflareClient {
    http: Client,
    auth: CloudflareAuth,
    api_base: String,
}

impl CloudflareClient {
    pub fn new(auth: CloudflareAuth) -> Result<Self> {
        Self::with_timeout(auth, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(auth: CloudflareAuth, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            auth,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Points the client at another API root.
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            CloudflareAuth::Token(token) => request.bearer_auth(token),
            CloudflareAuth::GlobalKey { email, api_key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", api_key),
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        let response = self
            .authorize(request)
            .header("Content-Type", "application/json")
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        unwrap_envelope(status, &body)
    }
}

#[async_trait]
impl DnsAuthority for CloudflareClient {
    #[instrument(skip(self))]
    async fn find_zone(&self, apex: &str) -> Result<Option<String>> {
        let url = format!("{}/zones", self.api_base);
        let zones: Vec<Zone> = self
            .send(self.http.get(&url).query(&[("name", apex)]))
            .await?
            .unwrap_or_default();

        let zone_id = zones.into_iter().next().map(|zone| zone.id);
        debug!(found = zone_id.is_some(), "Zone lookup");
        Ok(zone_id)
    }

    #[instrument(skip(self))]
    async fn find_record(
        &self,
        zone_id: &str,
        fqdn: &str,
        record_type: RecordType,
    ) -> Result<Option<DnsRecord>> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);
        let record_type = record_type.to_string();
        let records: Vec<DnsRecord> = self
            .send(
                self.http
                    .get(&url)
                    .query(&[("name", fqdn), ("type", record_type.as_str())]),
            )
            .await?
            .unwrap_or_default();

        Ok(records.into_iter().next())
    }

    #[instrument(skip(self, record), fields(fqdn = %record.name))]
    async fn create_record(&self, zone_id: &str, record: &NewRecord) -> Result<DnsRecord> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);
        self.send(self.http.post(&url).json(record))
            .await?
            .ok_or_else(|| VigilError::Provider {
                status: 200,
                message: "create succeeded without a result".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_zone_list() {
        let body = r#"{"success":true,"errors":[],"messages":[],"result":[{"id":"023e105f4ecef8ad9ca31a8372d0c353","name":"wj0001.cfd"}]}"#;
        let zones: Vec<Zone> = unwrap_envelope(StatusCode::OK, body).unwrap().unwrap();
        assert_eq!(zones[0].id, "023e105f4ecef8ad9ca31a8372d0c353");
    }

    #[test]
    fn test_unwrap_record() {
        let body = r#"{"success":true,"errors":[],"result":{"id":"372e67954025e0ba6aaa6d586b9e0b59","type":"A","name":"apiwj250301.wj0001.cfd","content":"203.0.114.10","proxied":false,"ttl":300}}"#;
        let record: DnsRecord = unwrap_envelope(StatusCode::OK, body).unwrap().unwrap();
        assert_eq!(record.record_type, RecordType::A);
        assert_eq!(record.content, "203.0.114.10");
    }

    #[test]
    fn test_failure_carries_provider_message() {
        let body = r#"{"success":false,"errors":[{"code":81057,"message":"Record already exists."}],"result":null}"#;
        let err = unwrap_envelope::<DnsRecord>(StatusCode::BAD_REQUEST, body).unwrap_err();

        match err {
            VigilError::Provider { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Record already exists. (81057)");
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_and_garbage() {
        let body = r#"{"success":false,"errors":[],"result":null}"#;
        assert!(matches!(
            unwrap_envelope::<Vec<Zone>>(StatusCode::TOO_MANY_REQUESTS, body),
            Err(VigilError::RateLimited(_))
        ));

        assert!(matches!(
            unwrap_envelope::<Vec<Zone>>(StatusCode::BAD_GATEWAY, "<html>"),
            Err(VigilError::Provider { status: 502, .. })
        ));
    }
}
