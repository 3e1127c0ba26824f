//! Simulation driver for the eliv sampler.
//!
//! Generates exactly identified IV designs, runs the sampler presets (one
//! thread per chain) and reports posterior means and acceptance rates.

mod report;
mod simulate;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use eliv_core::{run_metropolis_chain, PreconditionerKind, SamplerSettings};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use report::{print_table, summarize, BenchReport, RunRecord};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PresetChoice {
    /// Gaussian prior at -1 (σ = 0.5), bound 10
    Shifted,
    /// Gaussian prior at 0.6 (σ = 0.5), bound 5
    Centered,
    /// No prior, bound 5
    Flat,
    /// All three presets
    All,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PreconditionerChoice {
    Identity,
    Diag,
}

impl From<PreconditionerChoice> for PreconditionerKind {
    fn from(choice: PreconditionerChoice) -> Self {
        match choice {
            PreconditionerChoice::Identity => PreconditionerKind::Identity,
            PreconditionerChoice::Diag => PreconditionerKind::Diagonal,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "eliv-bench", version, about = "Penalized EL Metropolis sampler on simulated IV data")]
struct Cli {
    /// Number of observations
    #[arg(long, default_value_t = 500)]
    n: usize,

    /// Number of simulated data sets
    #[arg(long, default_value_t = 1)]
    replications: usize,

    /// Base random seed
    #[arg(long, default_value_t = 12345)]
    seed: u64,

    /// L1 penalty level ν
    #[arg(long, default_value_t = 0.05)]
    nu: f64,

    /// Metropolis steps per chain
    #[arg(long, default_value_t = 3500)]
    chain_length: usize,

    /// Trailing draws in the posterior mean
    #[arg(long, default_value_t = 3000)]
    window: usize,

    /// Sampler preset
    #[arg(long, value_enum, default_value_t = PresetChoice::All)]
    preset: PresetChoice,

    /// Preconditioner for the Newton systems
    #[arg(long, value_enum, default_value_t = PreconditionerChoice::Identity)]
    preconditioner: PreconditionerChoice,

    /// Write the full report as JSON
    #[arg(long)]
    json: Option<PathBuf>,
}

const BETA_TRUE: [f64; 2] = [1.0, 1.0];

fn presets(choice: PresetChoice, p: usize) -> Vec<(&'static str, SamplerSettings)> {
    let all = [
        (PresetChoice::Shifted, "shifted", SamplerSettings::shifted_prior(p)),
        (PresetChoice::Centered, "centered", SamplerSettings::centered_prior(p)),
        (PresetChoice::Flat, "flat", SamplerSettings::flat_prior()),
    ];
    all.into_iter()
        .filter(|(kind, _, _)| choice == PresetChoice::All || *kind == choice)
        .map(|(_, name, settings)| (name, settings))
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    println!("eliv sampler benchmark");
    println!("======================");
    println!(
        "n={} nu={} chain={} window={} replications={}",
        cli.n, cli.nu, cli.chain_length, cli.window, cli.replications
    );

    let configs: Vec<(&'static str, SamplerSettings)> = presets(cli.preset, BETA_TRUE.len())
        .into_iter()
        .map(|(name, mut settings)| {
            settings.calibration.preconditioner = cli.preconditioner.into();
            (name, settings.with_nu(cli.nu).with_chain(cli.chain_length, cli.window))
        })
        .collect();

    let mut runs = Vec::new();
    let mut failed = 0usize;
    for rep in 0..cli.replications {
        let data_seed = cli.seed.wrapping_add(rep as u64);
        let data = simulate::exactly_identified(cli.n, &BETA_TRUE, data_seed)?;
        let beta0 = vec![0.0; BETA_TRUE.len()];

        let results: Vec<Result<RunRecord>> = std::thread::scope(|scope| {
            let handles: Vec<_> = configs
                .iter()
                .enumerate()
                .map(|(k, (name, settings))| {
                    let data = &data;
                    let beta0 = &beta0;
                    scope.spawn(move || -> Result<RunRecord> {
                        let chain_seed = data_seed.wrapping_mul(31).wrapping_add(k as u64);
                        let mut rng = ChaCha8Rng::seed_from_u64(chain_seed);
                        let start = Instant::now();
                        let chain = run_metropolis_chain(beta0, data, settings, &mut rng)
                            .with_context(|| format!("Chain '{}' failed in replication {}", name, rep))?;
                        Ok(RunRecord {
                            preset: name.to_string(),
                            replication: rep,
                            initial_status: chain.initial_status,
                            mean: chain.summary.mean,
                            acceptance_rate: chain.summary.acceptance_rate,
                            out_of_bound: chain.out_of_bound,
                            unconverged: chain.unconverged,
                            time_ms: start.elapsed().as_secs_f64() * 1000.0,
                        })
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|_| Err(anyhow::anyhow!("sampler thread panicked"))))
                .collect()
        });

        for result in results {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    log::error!("{:#}", e);
                    failed += 1;
                    continue;
                }
            };
            if !record.initial_status.is_solved() {
                log::warn!(
                    "rep {} {}: starting point calibration {}",
                    record.replication,
                    record.preset,
                    record.initial_status
                );
            }
            log::info!(
                "rep {} {:<8} mean={:?} accept={:.3} ({:.1} ms)",
                record.replication,
                record.preset,
                record.mean,
                record.acceptance_rate,
                record.time_ms
            );
            runs.push(record);
        }
    }

    let summaries = summarize(&runs, &BETA_TRUE);
    print_table(&summaries);
    if failed > 0 {
        println!("{} of {} chains failed, see log", failed, failed + runs.len());
    }

    if let Some(path) = &cli.json {
        let report = BenchReport {
            n: cli.n,
            nu: cli.nu,
            chain_length: cli.chain_length,
            window: cli.window,
            beta_true: BETA_TRUE.to_vec(),
            runs,
            summaries,
        };
        report.save_json(path)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}
