mod human;
mod json;

pub use human::HumanFormatter;
pub use json::JsonFormatter;

use serde::{Deserialize, Serialize};

use crate::coordinator::CycleReport;
use crate::dns::{ProvisionOutcome, ResolutionCheck};
use crate::health::HealthSummary;
use crate::publish::WorkflowState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" | "pretty" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

pub trait OutputFormatter {
    fn format_cycle(&self, report: &CycleReport) -> String;
    fn format_summary(&self, summary: &HealthSummary) -> String;
    fn format_workflow(&self, state: &WorkflowState) -> String;
    fn format_provision(&self, outcome: &ProvisionOutcome) -> String;
    fn format_resolution(&self, check: &ResolutionCheck) -> String;
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Human => Box::new(HumanFormatter::new()),
        OutputFormat::Json => Box::new(JsonFormatter::new()),
    }
}
