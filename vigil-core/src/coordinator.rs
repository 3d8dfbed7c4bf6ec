//! The monitoring loop: evaluate every brand and remediate degraded ones.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::config::{Config, PanelsBackend};
use crate::dns::{CloudflareClient, DnsProvisioner, ProvisionOutcome};
use crate::error::Result;
use crate::health::{EvaluationReason, EvaluationResult, HealthEvaluator};
use crate::mutate::PanelEntry;
use crate::naming::{BrandRegistry, CandidateStatus};
use crate::output::{HumanFormatter, OutputFormatter};
use crate::publish::{
    GitHubPublisher, GitPublisher, PanelPublisher, ProxyWorkflow, SshShell, WorkflowState,
    WorkflowStatus,
};
use crate::store::{HealthStore, RedisHealthStore};

/// Wait after a cycle that failed outright.
pub const FAILURE_COOLDOWN: Duration = Duration::from_secs(300);

/// Final state of one brand within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrandOutcome {
    Healthy,
    NoData,
    /// Replacement provisioned and published
    Remediated,
    /// Record already existed and publishing existing records is disabled
    Skipped,
    Failed,
    /// A live change was made but could not be verified
    Unverified,
}

impl fmt::Display for BrandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BrandOutcome::Healthy => "HEALTHY",
            BrandOutcome::NoData => "NO_DATA",
            BrandOutcome::Remediated => "REMEDIATED",
            BrandOutcome::Skipped => "SKIPPED",
            BrandOutcome::Failed => "FAILED",
            BrandOutcome::Unverified => "UNVERIFIED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandReport {
    pub brand: String,
    pub outcome: BrandOutcome,
    pub evaluation: Option<EvaluationResult>,
    pub provision: Option<ProvisionOutcome>,
    pub proxy: Option<WorkflowState>,
    pub panels: Option<WorkflowState>,
    pub error: Option<String>,
}

impl BrandReport {
    fn new(brand: &str, outcome: BrandOutcome) -> Self {
        Self {
            brand: brand.to_string(),
            outcome,
            evaluation: None,
            provision: None,
            proxy: None,
            panels: None,
            error: None,
        }
    }

    fn fail(mut self, error: impl fmt::Display) -> Self {
        self.outcome = BrandOutcome::Failed;
        self.error = Some(error.to_string());
        self
    }

    /// Applies a workflow's status; returns false when the brand must halt.
    fn absorb(&mut self, state: &WorkflowState) -> bool {
        match state.status() {
            WorkflowStatus::Succeeded => true,
            WorkflowStatus::Failed => {
                self.outcome = BrandOutcome::Failed;
                self.error = state.error.clone();
                false
            }
            WorkflowStatus::Unverified => {
                self.outcome = BrandOutcome::Unverified;
                self.error = state.error.clone();
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub brands: Vec<BrandReport>,
}

impl CycleReport {
    pub fn count(&self, outcome: BrandOutcome) -> usize {
        self.brands.iter().filter(|b| b.outcome == outcome).count()
    }

    pub fn brand(&self, brand: &str) -> Option<&BrandReport> {
        self.brands.iter().find(|b| b.brand == brand)
    }
}

/// `Replace <brand> primary domain: <url> (<YYYY-MM-DD>)`
pub fn commit_message(brand: &str, url: &str, date: NaiveDate) -> String {
    format!(
        "Replace {} primary domain: {} ({})",
        brand,
        url,
        date.format("%Y-%m-%d")
    )
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Drives evaluation and remediation for the configured brands.
pub struct Coordinator {
    store: Arc<dyn HealthStore>,
    provisioner: DnsProvisioner,
    brands: BrandRegistry,
    record_ip: String,
    evaluator: HealthEvaluator,
    proxy: Option<ProxyWorkflow>,
    panels: Option<Arc<dyn PanelPublisher>>,
    publish_on_existing: bool,
    interval: Duration,
    cooldown: Duration,
    today: fn() -> NaiveDate,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn HealthStore>,
        provisioner: DnsProvisioner,
        brands: BrandRegistry,
        record_ip: &str,
    ) -> Self {
        Self {
            store,
            provisioner,
            brands,
            record_ip: record_ip.to_string(),
            evaluator: HealthEvaluator::new(),
            proxy: None,
            panels: None,
            publish_on_existing: true,
            interval: Duration::from_secs(600),
            cooldown: FAILURE_COOLDOWN,
            today: local_today,
        }
    }

    /// Wires the production backends described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = RedisHealthStore::new(&config.redis_url)?;
        let authority = CloudflareClient::new(config.require_dns_auth()?.clone())?;
        let provisioner = DnsProvisioner::new(Arc::new(authority)).with_ttl(config.dns.record_ttl);
        let record_ip = config.require_record_ip()?;

        let evaluator = HealthEvaluator::new()
            .with_success_rate_floor(config.success_rate_threshold)
            .with_latency_ceiling_ms(config.response_time_threshold_ms);

        let proxy = config.proxy.as_ref().map(|proxy| {
            ProxyWorkflow::new(Arc::new(SshShell::from_config(proxy)), proxy.clone())
        });

        let panels: Option<Arc<dyn PanelPublisher>> = match &config.panels {
            PanelsBackend::GitHub(github) => Some(Arc::new(GitHubPublisher::from_config(
                github,
                config.author.clone(),
            )?)),
            PanelsBackend::Git(git) => Some(Arc::new(GitPublisher::new(git, config.author.clone()))),
            PanelsBackend::None => None,
        };

        let mut coordinator = Self::new(
            Arc::new(store),
            provisioner,
            config.brands.clone(),
            record_ip,
        )
        .with_evaluator(evaluator)
        .with_publish_on_existing(config.publish_on_existing)
        .with_interval(config.interval);
        coordinator.proxy = proxy;
        coordinator.panels = panels;
        Ok(coordinator)
    }

    pub fn with_evaluator(mut self, evaluator: HealthEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyWorkflow) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_panels(mut self, panels: Arc<dyn PanelPublisher>) -> Self {
        self.panels = Some(panels);
        self
    }

    pub fn with_publish_on_existing(mut self, enabled: bool) -> Self {
        self.publish_on_existing = enabled;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Names of every configured brand.
    pub fn brand_names(&self) -> Vec<String> {
        self.brands.names().map(str::to_string).collect()
    }

    /// Runs one evaluation and remediation pass over `brands`.
    ///
    /// Fails only when the health store is unreachable; every per-brand
    /// failure is reported inside the [`CycleReport`].
    #[instrument(skip(self))]
    pub async fn run_cycle(&self, brands: &[String]) -> Result<CycleReport> {
        let started_at = Utc::now();
        self.store.ping().await?;

        let mut reports = Vec::with_capacity(brands.len());
        for brand in brands {
            let report = self.run_brand(brand).await;
            info!(brand = %brand, outcome = %report.outcome, "Brand processed");
            reports.push(report);
        }

        Ok(CycleReport {
            started_at,
            finished_at: Utc::now(),
            brands: reports,
        })
    }

    /// [`run_cycle`](Self::run_cycle) plus a human-readable rendering.
    pub async fn manual_check(&self, brands: &[String]) -> Result<(CycleReport, String)> {
        let report = self.run_cycle(brands).await?;
        let text = HumanFormatter::new().without_colors().format_cycle(&report);
        Ok((report, text))
    }

    async fn run_brand(&self, brand: &str) -> BrandReport {
        let summary = match self.store.load_primary(brand).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(brand, error = %e, "Failed to load health summary");
                return BrandReport::new(brand, BrandOutcome::Failed).fail(e);
            }
        };

        let evaluation = self.evaluator.evaluate(summary.as_ref());
        let outcome = match evaluation.reason {
            EvaluationReason::NoData => BrandOutcome::NoData,
            _ if !evaluation.should_remediate => BrandOutcome::Healthy,
            _ => BrandOutcome::Remediated,
        };
        let mut report = BrandReport::new(brand, outcome);
        let should_remediate = evaluation.should_remediate;
        info!(brand, reason = %evaluation.reason, detail = %evaluation.detail, "Evaluated");
        report.evaluation = Some(evaluation);

        if !should_remediate {
            return report;
        }
        self.remediate(report).await
    }

    async fn remediate(&self, mut report: BrandReport) -> BrandReport {
        let brand = report.brand.clone();
        let today = (self.today)();

        let profile = match self.brands.get(&brand) {
            Ok(profile) => profile,
            Err(e) => return report.fail(e),
        };
        let candidate = match self.brands.generate(&brand, today) {
            Ok(candidate) => candidate,
            Err(e) => return report.fail(e),
        };

        let outcome = self
            .provisioner
            .provision(candidate, &profile.apex, &self.record_ip)
            .await;
        let status = outcome.status();
        let fqdn = outcome.candidate.fqdn.clone();
        let failure = outcome.failure.clone();
        report.provision = Some(outcome);

        if let Some(failure) = failure {
            return report.fail(failure);
        }
        if status == CandidateStatus::AlreadyExists && !self.publish_on_existing {
            info!(brand = %brand, fqdn = %fqdn, "Record exists; publishing disabled");
            report.outcome = BrandOutcome::Skipped;
            return report;
        }

        if let Some(proxy) = &self.proxy {
            match &profile.target_host {
                Some(target_host) => {
                    let state = proxy.add_alias(target_host, &fqdn).await;
                    let proceed = report.absorb(&state);
                    report.proxy = Some(state);
                    if !proceed {
                        error!(brand = %brand, error = ?report.error, "Proxy workflow failed");
                        return report;
                    }
                }
                None => warn!(brand = %brand, "No target host configured; proxy skipped"),
            }
        }

        if let Some(panels) = &self.panels {
            let entry = PanelEntry::generated(&brand, &fqdn);
            let message = commit_message(&brand, &entry.url, today);
            let state = panels.publish(&brand, &entry, &message).await;
            let published = report.absorb(&state);
            report.panels = Some(state);
            if !published {
                error!(brand = %brand, error = ?report.error, "Panels publish failed");
                return report;
            }
        }

        info!(brand = %brand, fqdn = %fqdn, "Remediation complete");
        report
    }

    /// Runs cycles until `shutdown` resolves and returns the last report.
    ///
    /// A cycle in progress always runs to completion; `shutdown` only ends
    /// the loop between cycles or during the wait.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<Option<CycleReport>>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let brands = self.brand_names();
        info!(brands = ?brands, interval_secs = self.interval.as_secs(), "Coordinator started");

        let mut last = None;
        loop {
            let cycle = self.run_cycle(&brands);
            tokio::pin!(cycle);
            let mut stopping = false;
            let result = tokio::select! {
                result = &mut cycle => result,
                _ = &mut shutdown => {
                    info!("Shutdown requested, finishing current cycle");
                    stopping = true;
                    cycle.await
                }
            };

            let wait = match result {
                Ok(report) => {
                    info!(
                        remediated = report.count(BrandOutcome::Remediated),
                        failed = report.count(BrandOutcome::Failed),
                        unverified = report.count(BrandOutcome::Unverified),
                        "Cycle complete"
                    );
                    last = Some(report);
                    self.interval
                }
                Err(e) => {
                    error!(error = %e, cooldown_secs = self.cooldown.as_secs(), "Cycle failed");
                    self.cooldown
                }
            };
            if stopping {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut shutdown => break,
            }
        }

        info!("Coordinator stopped");
        Ok(last)
    }

    /// Runs cycles until Ctrl-C.
    pub async fn run_forever(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
        .map(|_| ())
    }
}
