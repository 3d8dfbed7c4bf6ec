use super::OutputFormatter;
use crate::coordinator::CycleReport;
use crate::dns::{ProvisionOutcome, ResolutionCheck};
use crate::health::HealthSummary;
use crate::publish::WorkflowState;

pub struct JsonFormatter {
    pretty: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    fn to_json<T: serde::Serialize + ?Sized>(&self, value: &T) -> String {
        if self.pretty {
            serde_json::to_string_pretty(value)
                .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
        } else {
            serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_cycle(&self, report: &CycleReport) -> String {
        self.to_json(report)
    }

    fn format_summary(&self, summary: &HealthSummary) -> String {
        self.to_json(summary)
    }

    fn format_workflow(&self, state: &WorkflowState) -> String {
        self.to_json(state)
    }

    fn format_provision(&self, outcome: &ProvisionOutcome) -> String {
        self.to_json(outcome)
    }

    fn format_resolution(&self, check: &ResolutionCheck) -> String {
        self.to_json(check)
    }
}
