use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{TrackerError, TrackerResult};

/// Descriptive statistics over latency samples (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// `(p, value)` in the order requested
    pub percentiles: Vec<(f64, f64)>,
}

impl LatencyStats {
    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|(q, _)| (*q - p).abs() < f64::EPSILON)
            .map(|(_, v)| *v)
    }
}

/// Summarize `samples`.
///
/// Percentiles interpolate linearly between the two closest ranks of the
/// sorted samples, with rank = p / 100 * (n - 1). With a single sample every
/// percentile equals that sample.
pub fn describe(samples: &[f64], percentiles: &[f64]) -> TrackerResult<LatencyStats> {
    if samples.is_empty() {
        return Err(TrackerError::InvalidInput("no latency samples".to_string()));
    }
    if let Some(bad) = samples.iter().find(|s| !s.is_finite()) {
        return Err(TrackerError::InvalidInput(format!("latency sample {} is not finite", bad)));
    }
    if let Some(p) = percentiles.iter().find(|p| !(**p > 0.0 && **p <= 100.0)) {
        return Err(TrackerError::InvalidInput(format!("percentile {} is outside (0, 100]", p)));
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

    Ok(LatencyStats {
        count: sorted.len(),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean,
        std_dev: variance.sqrt(),
        percentiles: percentiles.iter().map(|p| (*p, interpolate(&sorted, *p))).collect(),
    })
}

fn interpolate(sorted: &[f64], p: f64) -> f64 {
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Latency ({} samples):", self.count)?;
        writeln!(f, "  Min:                 {:.3}s", self.min)?;
        writeln!(f, "  Max:                 {:.3}s", self.max)?;
        writeln!(f, "  Mean:                {:.3}s", self.mean)?;
        write!(f, "  Std dev:             {:.3}s", self.std_dev)?;
        for (p, value) in &self.percentiles {
            write!(f, "\n  p{:<19}{:.3}s", format!("{}:", p), value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_describe_one_to_ten() {
        let samples: Vec<f64> = (1..=10).rev().map(|v| v as f64).collect();
        let stats = describe(&samples, &[50.0, 90.0, 100.0]).unwrap();

        assert_eq!(stats.count, 10);
        assert!(approx(stats.min, 1.0));
        assert!(approx(stats.max, 10.0));
        assert!(approx(stats.mean, 5.5));
        assert!(approx(stats.std_dev, 8.25f64.sqrt()));
        assert!(approx(stats.percentile(50.0).unwrap(), 5.5));
        assert!(approx(stats.percentile(90.0).unwrap(), 9.1));
        assert!(approx(stats.percentile(100.0).unwrap(), 10.0));
    }

    #[test]
    fn test_single_sample() {
        let stats = describe(&[2.5], &[1.0, 50.0, 99.0]).unwrap();
        assert_eq!(stats.std_dev, 0.0);
        assert!(stats.percentiles.iter().all(|(_, v)| approx(*v, 2.5)));
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(describe(&[], &[50.0]), Err(TrackerError::InvalidInput(_))));
        assert!(matches!(describe(&[1.0], &[0.0]), Err(TrackerError::InvalidInput(_))));
        assert!(matches!(describe(&[1.0], &[100.5]), Err(TrackerError::InvalidInput(_))));
        assert!(matches!(describe(&[f64::NAN], &[50.0]), Err(TrackerError::InvalidInput(_))));
    }

    #[test]
    fn test_display() {
        let stats = describe(&[1.0, 2.0], &[50.0]).unwrap();
        let text = stats.to_string();
        assert!(text.contains("2 samples"));
        assert!(text.contains("p50:"));
        assert!(text.contains("1.500s"));
    }
}
