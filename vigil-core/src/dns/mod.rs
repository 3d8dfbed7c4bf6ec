//! DNS record provisioning and resolution checks.

mod cloudflare;
mod provisioner;
mod records;
mod resolver;

pub use cloudflare::{CloudflareClient, DnsAuthority};
pub use provisioner::{DnsProvisioner, ProvisionFailure, ProvisionOutcome, DEFAULT_RECORD_TTL};
pub use records::{DnsRecord, NewRecord, RecordType};
pub use resolver::{DnsResolver, ResolutionCheck};
