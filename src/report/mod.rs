pub mod visualization;

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::Path,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::{
    Comparison, MetricResult,
    detection::{Discrepancy, Severity},
    error::Result,
    iteration::{IterationState, IterationStatus},
    scoring::{FidelityScore, ScoreComponent},
};

/// Everything an orchestrator needs after one comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FidelityReport {
    pub score: FidelityScore,
    pub discrepancies: Vec<Discrepancy>,
    pub state: IterationState,
    pub metrics: MetricResult,
    pub generated_at: DateTime<Utc>,
}

impl FidelityReport {
    pub fn new(comparison: &Comparison, state: &IterationState) -> Self {
        Self {
            score: comparison.score.clone(),
            discrepancies: comparison.discrepancies.clone(),
            state: state.clone(),
            metrics: comparison.metrics.clone(),
            generated_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(
            out,
            "Fidelity score: {}/100 (iteration {}, {:?})",
            self.score.total, self.score.iteration, self.state.status
        );
        for (component, points) in &self.score.breakdown {
            let _ = writeln!(out, "  {:<20} {:>3}", component.to_string(), points);
        }

        let _ = writeln!(
            out,
            "Metrics: SSIM {:.4}, pixel diff {:.2}%, pHash distance {}, {} region(s)",
            self.metrics.ssim,
            self.metrics.pixel_diff_percent,
            self.metrics.phash_distance,
            self.metrics.regions.len()
        );

        if self.discrepancies.is_empty() {
            let _ = writeln!(out, "No discrepancies.");
        } else {
            let _ = writeln!(out, "Discrepancies ({}):", self.discrepancies.len());
            for d in &self.discrepancies {
                let location = d.region_label().map(|l| format!(" in '{l}'")).unwrap_or_default();
                let _ = writeln!(
                    out,
                    "  [{}] {:?}{}: {} (fix: {:?})",
                    d.severity, d.category, location, d.description, d.fix
                );
            }
        }

        if self.state.history.len() > 1 {
            let summary = TrendSummary::from_scores(&self.state.history);
            let _ = writeln!(
                out,
                "Trend: {} iterations, {} -> {} (best {}, mean {:.1})",
                summary.iterations, summary.first, summary.last, summary.best, summary.mean
            );
        }

        out
    }
}

/// One line of the per-iteration trend log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricExport {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub total: u32,
    pub breakdown: BTreeMap<ScoreComponent, u32>,
    pub ssim: f64,
    pub pixel_diff_percent: f64,
    pub phash_distance: u32,
    pub max_delta_e: f64,
    pub discrepancy_count: usize,
    pub high_severity_count: usize,
    pub status: IterationStatus,
}

impl MetricExport {
    pub fn from_report(report: &FidelityReport) -> Self {
        Self {
            iteration: report.score.iteration,
            timestamp: report.score.timestamp,
            total: report.score.total,
            breakdown: report.score.breakdown.clone(),
            ssim: report.metrics.ssim,
            pixel_diff_percent: report.metrics.pixel_diff_percent,
            phash_distance: report.metrics.phash_distance,
            max_delta_e: report.metrics.color_delta_e.values().copied().fold(0.0, f64::max),
            discrepancy_count: report.discrepancies.len(),
            high_severity_count: report
                .discrepancies
                .iter()
                .filter(|d| d.severity == Severity::High)
                .count(),
            status: report.state.status,
        }
    }

    /// Appends this export as a single JSON line.
    pub fn append<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(self)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<MetricExport>> {
        let reader = BufReader::new(fs::File::open(path)?);
        let mut exports = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            exports.push(serde_json::from_str(&line)?);
        }

        Ok(exports)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub iterations: usize,
    pub first: u32,
    pub last: u32,
    pub best: u32,
    pub mean: f64,
    /// Sample standard deviation; zero for fewer than two scores.
    pub std_dev: f64,
}

impl TrendSummary {
    pub fn from_totals(totals: &[u32]) -> Self {
        let values = totals.iter().map(|&t| t as f64).collect::<Vec<_>>();
        let mean = if values.is_empty() { 0.0 } else { Statistics::mean(&values) };
        let std_dev = if values.len() < 2 { 0.0 } else { Statistics::std_dev(&values) };

        Self {
            iterations: totals.len(),
            first: totals.first().copied().unwrap_or(0),
            last: totals.last().copied().unwrap_or(0),
            best: totals.iter().copied().max().unwrap_or(0),
            mean,
            std_dev,
        }
    }

    pub fn from_scores(scores: &[FidelityScore]) -> Self {
        Self::from_totals(&scores.iter().map(|s| s.total).collect::<Vec<_>>())
    }

    pub fn from_exports(exports: &[MetricExport]) -> Self {
        Self::from_totals(&exports.iter().map(|e| e.total).collect::<Vec<_>>())
    }

    pub fn improvement(&self) -> i64 {
        self.last as i64 - self.first as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_summary() {
        let summary = TrendSummary::from_totals(&[40, 60, 55, 80]);
        assert_eq!(summary.iterations, 4);
        assert_eq!(summary.best, 80);
        assert_eq!(summary.improvement(), 40);
        assert!((summary.mean - 58.75).abs() < 1e-9);
        assert!(summary.std_dev > 0.0);

        let single = TrendSummary::from_totals(&[70]);
        assert_eq!(single.std_dev, 0.0);
        assert_eq!(single.mean, 70.0);

        let empty = TrendSummary::from_totals(&[]);
        assert_eq!(empty.iterations, 0);
    }
}
