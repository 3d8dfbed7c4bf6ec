use tracing::debug;

use super::types::{normalize_success_rate, EvaluationReason, EvaluationResult, HealthSummary};

/// Default success-rate floor (fraction).
pub const DEFAULT_SUCCESS_RATE_FLOOR: f64 = 0.70;

/// Default latency ceiling in milliseconds.
pub const DEFAULT_LATENCY_CEILING_MS: f64 = 15_000.0;

/// Threshold policy deciding whether a domain needs replacing.
///
/// Stateless: the same summary always yields the same result.
#[derive(Debug, Clone)]
pub struct HealthEvaluator {
    success_rate_floor: f64,
    latency_ceiling_ms: f64,
}

impl Default for HealthEvaluator {
    fn default() -> Self {
        Self {
            success_rate_floor: DEFAULT_SUCCESS_RATE_FLOOR,
            latency_ceiling_ms: DEFAULT_LATENCY_CEILING_MS,
        }
    }
}

impl HealthEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the success-rate floor. A percentage is accepted and normalized.
    pub fn with_success_rate_floor(mut self, floor: f64) -> Self {
        self.success_rate_floor = normalize_success_rate(floor);
        self
    }

    pub fn with_latency_ceiling_ms(mut self, ceiling: f64) -> Self {
        self.latency_ceiling_ms = ceiling.max(0.0);
        self
    }

    pub fn success_rate_floor(&self) -> f64 {
        self.success_rate_floor
    }

    pub fn latency_ceiling_ms(&self) -> f64 {
        self.latency_ceiling_ms
    }

    /// Evaluates a summary. The success-rate check runs before the latency
    /// check, so a domain failing both is reported as `LOW_SUCCESS_RATE`.
    pub fn evaluate(&self, summary: Option<&HealthSummary>) -> EvaluationResult {
        let Some(summary) = summary else {
            return EvaluationResult::no_data("no health data available");
        };

        let mut summary = summary.clone();
        summary.success_rate = normalize_success_rate(summary.success_rate);

        let (should_remediate, reason, detail) = if summary.success_rate < self.success_rate_floor {
            (
                true,
                EvaluationReason::LowSuccessRate,
                format!(
                    "success rate {:.2}% below {:.2}%",
                    summary.success_rate * 100.0,
                    self.success_rate_floor * 100.0
                ),
            )
        } else {
            match summary.average_response_time_ms {
                Some(latency) if latency > self.latency_ceiling_ms => (
                    true,
                    EvaluationReason::HighLatency,
                    format!(
                        "average response time {:.0}ms above {:.0}ms",
                        latency, self.latency_ceiling_ms
                    ),
                ),
                _ => (
                    false,
                    EvaluationReason::Healthy,
                    format!("success rate {:.2}%", summary.success_rate * 100.0),
                ),
            }
        };

        debug!(
            domain = %summary.domain,
            success_rate = summary.success_rate,
            reason = %reason,
            "Evaluated health summary"
        );

        EvaluationResult {
            should_remediate,
            reason,
            detail,
            summary: Some(summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(rate: f64, latency: Option<f64>) -> HealthSummary {
        // Bypass HealthSummary::new so the evaluator sees raw percentages
        HealthSummary {
            domain: "apiwj250301.wj0001.cfd".to_string(),
            brand: "wujie".to_string(),
            success_rate: rate,
            average_response_time_ms: latency,
            timestamp: 1_700_000_000,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_percentage_rate_is_normalized() {
        let result = HealthEvaluator::new().evaluate(Some(&summary(65.0, Some(100.0))));

        assert!(result.should_remediate);
        assert_eq!(result.reason, EvaluationReason::LowSuccessRate);
        assert_eq!(result.detail, "success rate 65.00% below 70.00%");
        assert_eq!(result.summary.unwrap().success_rate, 0.65);
    }

    #[test]
    fn test_low_rate_wins_over_latency() {
        let result = HealthEvaluator::new().evaluate(Some(&summary(0.5, Some(5000.0))));
        assert_eq!(result.reason, EvaluationReason::LowSuccessRate);

        let result = HealthEvaluator::new().evaluate(Some(&summary(0.5, Some(50_000.0))));
        assert_eq!(result.reason, EvaluationReason::LowSuccessRate);
    }

    #[test]
    fn test_high_latency() {
        let result = HealthEvaluator::new().evaluate(Some(&summary(0.95, Some(20_000.0))));

        assert!(result.should_remediate);
        assert_eq!(result.reason, EvaluationReason::HighLatency);
    }

    #[test]
    fn test_healthy() {
        let result = HealthEvaluator::new().evaluate(Some(&summary(0.95, Some(100.0))));

        assert!(!result.should_remediate);
        assert_eq!(result.reason, EvaluationReason::Healthy);
    }

    #[test]
    fn test_boundaries_are_not_violations() {
        let evaluator = HealthEvaluator::new();

        let at_floor = evaluator.evaluate(Some(&summary(0.70, Some(15_000.0))));
        assert_eq!(at_floor.reason, EvaluationReason::Healthy);
    }

    #[test]
    fn test_unknown_latency_is_not_high() {
        let result = HealthEvaluator::new().evaluate(Some(&summary(0.9, None)));
        assert_eq!(result.reason, EvaluationReason::Healthy);
    }

    #[test]
    fn test_missing_summary_is_no_data() {
        let result = HealthEvaluator::new().evaluate(None);

        assert!(!result.should_remediate);
        assert_eq!(result.reason, EvaluationReason::NoData);
        assert!(result.summary.is_none());
    }

    #[test]
    fn test_custom_thresholds() {
        let evaluator = HealthEvaluator::new()
            .with_success_rate_floor(90.0)
            .with_latency_ceiling_ms(500.0);
        assert_eq!(evaluator.success_rate_floor(), 0.9);

        let result = evaluator.evaluate(Some(&summary(0.85, Some(100.0))));
        assert_eq!(result.reason, EvaluationReason::LowSuccessRate);

        let result = evaluator.evaluate(Some(&summary(0.95, Some(600.0))));
        assert_eq!(result.reason, EvaluationReason::HighLatency);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let evaluator = HealthEvaluator::new();
        let input = summary(0.72, Some(14_999.0));

        assert_eq!(evaluator.evaluate(Some(&input)), evaluator.evaluate(Some(&input)));
    }
}
