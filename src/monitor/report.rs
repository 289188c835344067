use std::fmt;

use tracing::warn;

use super::pool::MonitorReport;
use super::stats::{describe, LatencyStats};
use crate::constants::MAX_REPORTED_FAILURES;

const RULE: &str = "═══════════════════════════════════════";

#[derive(Debug, Clone, PartialEq)]
pub struct FailureLine {
    pub index: Option<usize>,
    pub label: String,
    pub status: Option<String>,
    pub message: String,
}

/// Result table of a stress run
#[derive(Debug, Clone)]
pub struct StressSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// At most `MAX_REPORTED_FAILURES` entries, in completion order
    pub failures: Vec<FailureLine>,
    pub latency: Option<LatencyStats>,
}

impl StressSummary {
    pub fn from_report(report: &MonitorReport, percentiles: &[f64]) -> Self {
        let latency = if report.latencies.is_empty() {
            None
        } else {
            match describe(&report.latencies, percentiles) {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!("⚠️ 지연 시간 통계 계산 실패: {}", e);
                    None
                }
            }
        };

        let failures = report
            .failures
            .iter()
            .take(MAX_REPORTED_FAILURES)
            .map(|f| FailureLine {
                index: f.index,
                label: f.label.clone(),
                status: f.status(),
                message: f.error.to_string(),
            })
            .collect();

        Self {
            total: report.total(),
            succeeded: report.outcomes.len(),
            failed: report.failures.len(),
            failures,
            latency,
        }
    }

    pub fn success_rate(&self) -> f64 {
        percentage(self.succeeded, self.total)
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

impl fmt::Display for StressSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", RULE)?;
        writeln!(f, "Stress Test Results:")?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "  Total:               {}", self.total)?;
        writeln!(f, "  Succeeded:           {} ({:.2}%)", self.succeeded, percentage(self.succeeded, self.total))?;
        writeln!(f, "  Failed:              {} ({:.2}%)", self.failed, percentage(self.failed, self.total))?;
        if let Some(latency) = &self.latency {
            writeln!(f, "{}", latency)?;
        }
        write!(f, "{}", RULE)?;

        if !self.failures.is_empty() {
            write!(f, "\nFirst {} failed:", self.failures.len())?;
            for line in &self.failures {
                let index = line.index.map(|i| i.to_string()).unwrap_or_else(|| "?".to_string());
                match &line.status {
                    Some(status) => write!(
                        f,
                        "\n  - Index {}, {}, Status: {}, Message: {}",
                        index, line.label, status, line.message
                    )?,
                    None => write!(f, "\n  - Index {}, {}: {}", index, line.label, line.message)?,
                }
            }
            if self.failed > self.failures.len() {
                write!(f, "\n  ... and {} more", self.failed - self.failures.len())?;
            }
        }
        Ok(())
    }
}
