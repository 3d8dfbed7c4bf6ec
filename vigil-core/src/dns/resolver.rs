use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Result, VigilError};
use crate::validation::normalize_domain;

/// Default timeout for DNS queries.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether a hostname currently resolves through public DNS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionCheck {
    pub fqdn: String,
    pub nameserver: String,
    pub addresses: Vec<IpAddr>,
    /// Address the record was created with, when known
    pub expected: Option<IpAddr>,
}

impl ResolutionCheck {
    pub fn resolves(&self) -> bool {
        !self.addresses.is_empty()
    }

    /// True when the expected address (if any) is among the answers.
    pub fn matches_expected(&self) -> bool {
        match self.expected {
            Some(ip) => self.addresses.contains(&ip),
            None => self.resolves(),
        }
    }
}

/// Public DNS resolver used to confirm a provisioned record is live.
///
/// Uses Google DNS (8.8.8.8) by default, but supports custom nameservers.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    timeout: Duration,
    nameserver: Option<IpAddr>,
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsResolver {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            nameserver: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Queries `nameserver` instead of Google DNS.
    pub fn with_nameserver(mut self, nameserver: &str) -> Result<Self> {
        let ip: IpAddr = nameserver
            .parse()
            .map_err(|_| VigilError::DnsError(format!("invalid nameserver IP: {}", nameserver)))?;
        self.nameserver = Some(ip);
        Ok(self)
    }

    fn nameserver_label(&self) -> String {
        self.nameserver
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "google".to_string())
    }

    fn create_resolver(&self) -> TokioAsyncResolver {
        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;
        opts.attempts = 2;
        opts.use_hosts_file = false;
        // A just-created record must not be masked by a cached NXDOMAIN
        opts.cache_size = 0;

        let config = match self.nameserver {
            Some(ip) => {
                let mut config = ResolverConfig::new();
                config.add_name_server(NameServerConfig::new(SocketAddr::new(ip, 53), Protocol::Udp));
                config
            }
            None => ResolverConfig::google(),
        };

        TokioAsyncResolver::tokio(config, opts)
    }

    /// Looks up the A and AAAA records of `fqdn`.
    ///
    /// A name with no records is a normal outcome (empty `addresses`), not an
    /// error; only resolver failures are errors.
    #[instrument(skip(self), fields(fqdn = %fqdn))]
    pub async fn verify(&self, fqdn: &str, expected: Option<IpAddr>) -> Result<ResolutionCheck> {
        let fqdn = normalize_domain(fqdn)?;
        let resolver = self.create_resolver();

        debug!(nameserver = %self.nameserver_label(), "Resolving");

        let addresses = match resolver.lookup_ip(fqdn.as_str()).await {
            Ok(lookup) => lookup.iter().collect(),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Vec::new(),
                ResolveErrorKind::Timeout => {
                    return Err(VigilError::Timeout(format!("DNS lookup of {}", fqdn)))
                }
                _ => return Err(e.into()),
            },
        };

        Ok(ResolutionCheck {
            fqdn,
            nameserver: self.nameserver_label(),
            addresses,
            expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(addresses: Vec<IpAddr>, expected: Option<IpAddr>) -> ResolutionCheck {
        ResolutionCheck {
            fqdn: "apiwj250301.wj0001.cfd".to_string(),
            nameserver: "google".to_string(),
            addresses,
            expected,
        }
    }

    #[test]
    fn test_matches_expected() {
        let ip: IpAddr = "203.0.114.10".parse().unwrap();
        let other: IpAddr = "198.51.101.7".parse().unwrap();

        assert!(check(vec![ip], Some(ip)).matches_expected());
        assert!(!check(vec![other], Some(ip)).matches_expected());
        assert!(check(vec![other], None).matches_expected());
        assert!(!check(vec![], None).resolves());
    }

    #[test]
    fn test_invalid_nameserver() {
        assert!(DnsResolver::new().with_nameserver("not-an-ip").is_err());
        assert!(DnsResolver::new().with_nameserver("1.1.1.1").is_ok());
    }

    #[tokio::test]
    async fn test_verify_rejects_invalid_name() {
        let result = DnsResolver::new().verify("not a domain", None).await;
        assert!(matches!(result, Err(VigilError::InvalidDomain(_))));
    }
}
