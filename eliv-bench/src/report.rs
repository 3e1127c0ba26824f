//! Run records, console table and JSON output.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use eliv_core::CalibrationStatus;
use serde::{Deserialize, Serialize};

/// Outcome of one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Sampler preset name
    pub preset: String,
    /// Replication index
    pub replication: usize,
    /// Calibration status at the starting point
    pub initial_status: CalibrationStatus,
    /// Posterior mean over the trailing window
    pub mean: Vec<f64>,
    /// Accepted / steps
    pub acceptance_rate: f64,
    /// Proposals rejected by the bound
    pub out_of_bound: usize,
    /// Proposals rejected after unconverged calibration
    pub unconverged: usize,
    /// Wall time (ms)
    pub time_ms: f64,
}

/// Aggregate over replications of one preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetSummary {
    pub preset: String,
    pub replications: usize,
    /// Average posterior mean
    pub mean: Vec<f64>,
    /// Root mean squared error of the posterior mean against β_true
    pub rmse: Vec<f64>,
    pub acceptance_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    pub n: usize,
    pub nu: f64,
    pub chain_length: usize,
    pub window: usize,
    pub beta_true: Vec<f64>,
    pub runs: Vec<RunRecord>,
    pub summaries: Vec<PresetSummary>,
}

impl BenchReport {
    /// Save to JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create file {}", path.as_ref().display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .with_context(|| format!("Failed to write JSON to {}", path.as_ref().display()))?;
        Ok(())
    }
}

/// Group runs by preset (in first-seen order) and average them.
pub fn summarize(runs: &[RunRecord], beta_true: &[f64]) -> Vec<PresetSummary> {
    let mut names: Vec<&str> = Vec::new();
    for run in runs {
        if !names.contains(&run.preset.as_str()) {
            names.push(&run.preset);
        }
    }

    names
        .into_iter()
        .map(|name| {
            let group: Vec<&RunRecord> = runs.iter().filter(|r| r.preset == name).collect();
            let k = group.len() as f64;
            let p = beta_true.len();

            let mut mean = vec![0.0; p];
            let mut sq = vec![0.0; p];
            let mut acc = 0.0;
            for run in &group {
                for j in 0..p {
                    mean[j] += run.mean[j] / k;
                    sq[j] += (run.mean[j] - beta_true[j]).powi(2) / k;
                }
                acc += run.acceptance_rate / k;
            }

            PresetSummary {
                preset: name.to_string(),
                replications: group.len(),
                mean,
                rmse: sq.into_iter().map(f64::sqrt).collect(),
                acceptance_rate: acc,
            }
        })
        .collect()
}

pub fn print_table(summaries: &[PresetSummary]) {
    println!("\n{}", "=".repeat(72));
    println!("{:<10} {:>5} {:>24} {:>20} {:>9}", "preset", "reps", "mean", "rmse", "accept");
    println!("{}", "-".repeat(72));
    for s in summaries {
        let mean = s.mean.iter().map(|v| format!("{:.4}", v)).collect::<Vec<_>>().join(", ");
        let rmse = s.rmse.iter().map(|v| format!("{:.4}", v)).collect::<Vec<_>>().join(", ");
        println!(
            "{:<10} {:>5} {:>24} {:>20} {:>9.3}",
            s.preset, s.replications, mean, rmse, s.acceptance_rate
        );
    }
    println!("{}", "=".repeat(72));
}
