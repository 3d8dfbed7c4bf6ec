use chrono::{DateTime, TimeDelta, Utc};
use colored::Colorize;

use super::OutputFormatter;
use crate::colors::CatppuccinExt;
use crate::coordinator::{BrandOutcome, BrandReport, CycleReport};
use crate::dns::{ProvisionOutcome, ResolutionCheck};
use crate::health::{EvaluationReason, HealthSummary, ProbeDetail};
use crate::publish::{WorkflowState, WorkflowStatus};

fn format_duration(duration: TimeDelta) -> String {
    let millis = duration.num_milliseconds();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", millis as f64 / 1000.0)
    } else {
        let secs = duration.num_seconds();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

fn format_latency(ms: Option<f64>) -> String {
    ms.map(|ms| format!("{:.0}ms", ms))
        .unwrap_or_else(|| "unknown".to_string())
}

pub struct HumanFormatter {
    use_colors: bool,
}

impl Default for HumanFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self { use_colors: true }
    }

    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    fn label(&self, text: &str) -> String {
        if self.use_colors {
            text.sky().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn value(&self, text: &str) -> String {
        if self.use_colors {
            text.ctp_white().to_string()
        } else {
            text.to_string()
        }
    }

    fn muted(&self, text: &str) -> String {
        if self.use_colors {
            text.subtext0().to_string()
        } else {
            text.to_string()
        }
    }

    fn success(&self, text: &str) -> String {
        if self.use_colors {
            text.ctp_green().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn warning(&self, text: &str) -> String {
        if self.use_colors {
            text.ctp_yellow().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn error(&self, text: &str) -> String {
        if self.use_colors {
            text.ctp_red().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn header(&self, text: &str) -> String {
        if self.use_colors {
            format!("\n{}\n{}", text.lavender().bold(), "─".repeat(text.len()).subtext0())
        } else {
            format!("\n{}\n{}", text, "-".repeat(text.len()))
        }
    }

    fn field(&self, name: &str, value: &str) -> String {
        format!("  {}: {}", self.label(name), self.value(value))
    }

    fn outcome(&self, outcome: BrandOutcome) -> String {
        let text = outcome.to_string();
        match outcome {
            BrandOutcome::Healthy | BrandOutcome::Remediated => self.success(&text),
            BrandOutcome::NoData | BrandOutcome::Skipped => self.warning(&text),
            BrandOutcome::Failed | BrandOutcome::Unverified => self.error(&text),
        }
    }

    fn workflow_lines(&self, state: &WorkflowState, indent: &str) -> Vec<String> {
        let mut lines = Vec::new();
        let status = match state.status() {
            WorkflowStatus::Succeeded if state.noop => self.success("SUCCEEDED (no change)"),
            WorkflowStatus::Succeeded => self.success("SUCCEEDED"),
            WorkflowStatus::Failed => self.error("FAILED"),
            WorkflowStatus::Unverified => self.error("UNVERIFIED"),
        };
        lines.push(format!("{}{} [{}]", indent, status, self.muted(&state.backend)));

        let steps: Vec<String> = state
            .steps
            .iter()
            .map(|record| {
                let name = record.step.to_string();
                if record.ok {
                    self.success(&format!("✓ {}", name))
                } else if state.failed_step() == Some(record.step) {
                    self.error(&format!("✗ {}", name))
                } else {
                    self.muted(&format!("· {}", name))
                }
            })
            .collect();
        if !steps.is_empty() {
            lines.push(format!("{}{}", indent, steps.join("  ")));
        }

        if let Some(backup) = &state.backup_reference {
            lines.push(format!("{}{}: {}", indent, self.label("Backup"), self.value(backup)));
        }
        if let Some(error) = &state.error {
            lines.push(format!("{}{}: {}", indent, self.label("Error"), self.error(error)));
        }
        lines
    }

    fn brand_lines(&self, report: &BrandReport) -> Vec<String> {
        let mut lines = vec![format!(
            "\n  {} {}",
            self.label(&report.brand),
            self.outcome(report.outcome)
        )];

        if let Some(evaluation) = &report.evaluation {
            let reason = evaluation.reason.to_string();
            let reason = match evaluation.reason {
                EvaluationReason::Healthy => self.success(&reason),
                EvaluationReason::NoData => self.warning(&reason),
                _ => self.error(&reason),
            };
            lines.push(format!("    {} ({})", reason, self.muted(&evaluation.detail)));

            if let Some(summary) = &evaluation.summary {
                lines.push(format!(
                    "    {}: {}  {}: {:.2}%  {}: {}",
                    self.label("Domain"),
                    self.value(&summary.domain),
                    self.label("Success"),
                    summary.success_rate * 100.0,
                    self.label("Avg"),
                    format_latency(summary.average_response_time_ms)
                ));
            }
        }

        if let Some(provision) = &report.provision {
            lines.push(format!(
                "    {}: {} {}",
                self.label("Record"),
                self.value(&provision.candidate.fqdn),
                self.muted(&provision.status().to_string())
            ));
        }
        if let Some(proxy) = &report.proxy {
            lines.push(format!("    {}:", self.label("Proxy")));
            lines.extend(self.workflow_lines(proxy, "      "));
        }
        if let Some(panels) = &report.panels {
            lines.push(format!("    {}:", self.label("Panels")));
            lines.extend(self.workflow_lines(panels, "      "));
        }
        if report.proxy.is_none() && report.panels.is_none() {
            if let Some(error) = &report.error {
                lines.push(format!("    {}: {}", self.label("Error"), self.error(error)));
            }
        }
        lines
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_cycle(&self, report: &CycleReport) -> String {
        let mut output = Vec::new();
        output.push(self.header(&format!(
            "Health Check: {}",
            report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )));

        if report.brands.is_empty() {
            output.push(format!("  {}", self.warning("No brands checked")));
            return output.join("\n");
        }

        for brand in &report.brands {
            output.extend(self.brand_lines(brand));
        }

        output.push(String::new());
        output.push(format!(
            "  {} healthy, {} remediated, {} no data, {} failed ({})",
            report.count(BrandOutcome::Healthy),
            report.count(BrandOutcome::Remediated),
            report.count(BrandOutcome::NoData),
            report.count(BrandOutcome::Failed) + report.count(BrandOutcome::Unverified),
            format_duration(report.finished_at - report.started_at)
        ));

        output.join("\n")
    }

    fn format_summary(&self, summary: &HealthSummary) -> String {
        let mut output = Vec::new();
        output.push(self.header(&format!("Probe: {}", summary.domain)));
        output.push(self.field("Brand", &summary.brand));
        output.push(self.field(
            "Success rate",
            &format!("{:.2}%", summary.success_rate * 100.0),
        ));
        output.push(self.field(
            "Average response",
            &format_latency(summary.average_response_time_ms),
        ));
        if let Some(at) = DateTime::<Utc>::from_timestamp(summary.timestamp, 0) {
            output.push(self.field("Probed at", &at.format("%Y-%m-%d %H:%M:%S UTC").to_string()));
        }

        let Ok(detail) = serde_json::from_value::<ProbeDetail>(summary.raw.clone()) else {
            return output.join("\n");
        };

        output.push(self.field(
            "Checks",
            &format!("{}/{} succeeded", detail.success_checks, detail.total_checks),
        ));
        if let Some(slowest) = &detail.slowest {
            output.push(self.field(
                "Slowest",
                &format!("{} ({:.0}ms)", slowest.location, slowest.response_time_ms),
            ));
        }
        if let Some(fastest) = &detail.fastest {
            output.push(self.field(
                "Fastest",
                &format!("{} ({:.0}ms)", fastest.location, fastest.response_time_ms),
            ));
        }

        if !detail.carriers.is_empty() {
            output.push(format!("  {}:", self.label("Carriers")));
            for (carrier, stats) in &detail.carriers {
                output.push(format!(
                    "    {} {:.2}% ({}/{})",
                    self.value(carrier),
                    stats.success_rate * 100.0,
                    stats.success_checks,
                    stats.total_checks
                ));
            }
        }

        if !detail.unavailable_locations.is_empty() {
            output.push(format!("  {}:", self.label("Unavailable")));
            for location in &detail.unavailable_locations {
                output.push(format!(
                    "    - {} {}",
                    self.value(&location.location),
                    self.error(&location.status)
                ));
            }
        }

        output.join("\n")
    }

    fn format_workflow(&self, state: &WorkflowState) -> String {
        let mut output = vec![self.header("Proxy Update")];
        output.extend(self.workflow_lines(state, "  "));
        output.join("\n")
    }

    fn format_provision(&self, outcome: &ProvisionOutcome) -> String {
        let mut output = Vec::new();
        output.push(self.header(&format!("Provision: {}", outcome.candidate.fqdn)));
        let status = outcome.status().to_string();
        let status = if outcome.is_failed() {
            self.error(&status)
        } else {
            self.success(&status)
        };
        output.push(format!("  {}: {}", self.label("Status"), status));
        if let Some(zone) = &outcome.zone_id {
            output.push(self.field("Zone", zone));
        }
        if let Some(record) = &outcome.record_id {
            output.push(self.field("Record", record));
        }
        if let Some(failure) = &outcome.failure {
            output.push(format!("  {}: {}", self.label("Error"), self.error(&failure.to_string())));
        }
        output.join("\n")
    }

    fn format_resolution(&self, check: &ResolutionCheck) -> String {
        let mut output = Vec::new();
        output.push(self.header(&format!("Resolution: {}", check.fqdn)));
        output.push(self.field("Nameserver", &check.nameserver));

        if !check.resolves() {
            output.push(format!("  {}", self.error("✗ Does not resolve")));
            return output.join("\n");
        }

        output.push(format!("  {}:", self.label("Addresses")));
        for address in &check.addresses {
            output.push(format!("    - {}", self.value(&address.to_string())));
        }

        if let Some(expected) = check.expected {
            let line = if check.matches_expected() {
                self.success(&format!("✓ Points at {}", expected))
            } else {
                self.warning(&format!("✗ Expected {}", expected))
            };
            output.push(format!("  {}", line));
        }
        output.join("\n")
    }
}
