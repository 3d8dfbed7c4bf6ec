pub mod cache;
pub mod colors;
pub mod config;
pub mod coordinator;
pub mod dns;
pub mod error;
pub mod health;
pub mod mutate;
pub mod naming;
pub mod output;
pub mod probe;
pub mod publish;
pub mod retry;
pub mod store;
pub mod validation;

pub use config::Config;
pub use error::{Result, VigilError};
pub use validation::{normalize_domain, parse_record_address};

pub use coordinator::{BrandOutcome, BrandReport, Coordinator, CycleReport};
pub use dns::{CloudflareClient, DnsAuthority, DnsProvisioner, DnsResolver, ProvisionOutcome};
pub use health::{EvaluationReason, EvaluationResult, HealthEvaluator, HealthSummary, ProbeRow};
pub use naming::{BrandProfile, BrandRegistry, CandidateDomain, CandidateStatus};
pub use probe::{FileProbeBackend, HttpProbeBackend, ProbeBackend, Prober};
pub use publish::{PanelPublisher, ProxyWorkflow, RemoteShell, SshShell, WorkflowState};
pub use store::{HealthStore, MemoryHealthStore, RedisHealthStore};

pub use output::{OutputFormat, OutputFormatter};
pub use retry::{RetryExecutor, RetryPolicy};
