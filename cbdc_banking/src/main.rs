//! CBDC Banking Simulation - command-line runner
//!
//! Usage:
//!   cargo run --release -p cbdc_banking -- run --steps 200 --output results/baseline
//!   cargo run --release -p cbdc_banking -- run --config experiments/limits.toml
//!   cargo run --release -p cbdc_banking -- sweep --runs 50 --threads 8
//!   cargo run --release -p cbdc_banking -- scenarios --steps 200

use std::path::PathBuf;
use std::process;
use std::time::Instant;

use cbdc_banking::output::{write_sweep_csv, SimulationOutput};
use cbdc_banking::scenarios::{run_all_scenarios, run_seed_sweep};
use cbdc_banking::{CbdcBankingModel, ExperimentConfig, ModelConfig, SimulationSettings};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about = "Agent-based model of CBDC introduction in a two-tier banking system", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Default,
    Small,
    Calibrated2025,
}

impl Preset {
    fn config(self) -> ModelConfig {
        match self {
            Preset::Default => ModelConfig::default(),
            Preset::Small => ModelConfig::small(),
            Preset::Calibrated2025 => ModelConfig::calibrated_2025(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single simulation and print its summary
    Run {
        /// Experiment TOML file with `[simulation]` and `[model]` tables
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Built-in configuration used when no file is given
        #[arg(short, long, value_enum, default_value_t = Preset::Default)]
        preset: Preset,

        /// Number of ticks, overriding the experiment file
        #[arg(short, long)]
        steps: Option<usize>,

        /// Random seed, overriding the configuration
        #[arg(long)]
        seed: Option<u64>,

        /// Directory for CSV tables and summary.json
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run many seeds of one configuration in parallel
    Sweep {
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value_t = Preset::Default)]
        preset: Preset,

        #[arg(short, long)]
        steps: Option<usize>,

        /// Number of runs; seeds are `seed + run`
        #[arg(short, long)]
        runs: Option<usize>,

        /// Worker threads (default: rayon's global pool)
        #[arg(short, long)]
        threads: Option<usize>,

        /// CSV file with one row per run
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare the built-in policy scenarios
    Scenarios {
        #[arg(short, long, default_value_t = 200)]
        steps: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn load_experiment(config: Option<PathBuf>, preset: Preset) -> ExperimentConfig {
    match config {
        Some(path) => match ExperimentConfig::from_path(&path) {
            Ok(experiment) => {
                info!(path = %path.display(), "loaded experiment");
                experiment
            }
            Err(e) => {
                error!("{e}");
                process::exit(1);
            }
        },
        None => ExperimentConfig {
            simulation: SimulationSettings::default(),
            model: preset.config(),
        },
    }
}

fn run_single(experiment: ExperimentConfig, output: Option<PathBuf>) {
    let model_config = experiment.model;
    let steps = experiment.simulation.steps;

    println!("=== CBDC Banking Simulation ===\n");
    println!("Configuration:");
    println!("  Consumers: {}", model_config.n_consumers);
    println!("  Commercial banks: {}", model_config.n_commercial_banks);
    println!("  Merchants: {}", model_config.n_merchants);
    println!(
        "  CBDC introduced at tick {} (attractiveness {}, rate {})",
        model_config.cbdc_introduction_step,
        model_config.cbdc_attractiveness,
        model_config.cbdc_interest_rate
    );
    println!("  Policy: {:?}", model_config.policy);
    println!("  Seed: {}", model_config.seed);
    println!("  Ticks: {}\n", steps);

    let mut model = match CbdcBankingModel::new(model_config) {
        Ok(model) => model,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let start = Instant::now();
    model.run(steps);
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "run finished");

    let summary = model.simulation_summary();
    println!("Results after {} ticks:", summary.steps);
    println!(
        "  CBDC adoption: {:.1}% ({} adopters)",
        summary.final_cbdc_adoption_rate * 100.0,
        summary.cbdc_adopters
    );
    println!("  CBDC holdings: {:.0}", summary.final_cbdc_holdings);
    println!(
        "  Bank deposits: {:.0} -> {:.0} ({:.1}% reduction)",
        summary.initial_bank_deposits,
        summary.final_bank_deposits,
        summary.deposit_reduction_rate * 100.0
    );
    println!("  Bank loans: {:.0}", summary.final_bank_loans);
    println!(
        "  Average liquidity ratio: {:.3}",
        summary.average_final_liquidity
    );
    println!(
        "  Merchants accepting CBDC: {}",
        summary.merchants_accepting_cbdc
    );
    println!(
        "  CBDC outstanding: {:.0} (redeemed {:.0})",
        summary.cbdc.cbdc_outstanding, summary.cbdc.cbdc_redeemed
    );
    if let Some(risk) = &summary.risk {
        println!("\nRisk dashboard:");
        println!("  Systemic risk score: {:.3}", risk.systemic_risk_score);
        println!("  Operational risk score: {:.3}", risk.operational_risk_score);
        println!("  Cyber incidents: {}", risk.cyber_incidents_count);
        println!("  Phishing victims: {}", risk.phishing_victims);
        println!("  Compliance violations: {}", risk.compliance_violations);
        println!("  Market confidence: {:.3}", risk.market_confidence);
    }

    if let Some(dir) = output {
        match SimulationOutput::from_model(&model).write_all(model.collector(), &dir) {
            Ok(()) => println!("\nOutputs written to {}", dir.display()),
            Err(e) => {
                error!("failed to write outputs: {e}");
                process::exit(1);
            }
        }
    }
}

fn run_sweep(experiment: ExperimentConfig, threads: Option<usize>, output: Option<PathBuf>) {
    let ExperimentConfig { simulation, model } = experiment;
    println!(
        "Sweeping {} runs of {} ticks (seeds {}..{})",
        simulation.runs,
        simulation.steps,
        model.seed,
        model.seed + simulation.runs as u64
    );

    let start = Instant::now();
    let results = match run_seed_sweep(&model, simulation.steps, simulation.runs, threads) {
        Ok(results) => results,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let mut completed = Vec::with_capacity(results.len());
    for (run, result) in results.into_iter().enumerate() {
        match result {
            Ok(stats) => completed.push(stats),
            Err(message) => warn!(run, %message, "run failed"),
        }
    }
    info!(
        runs = completed.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "sweep finished"
    );

    if completed.is_empty() {
        println!("No run completed");
        return;
    }
    let n = completed.len() as f64;
    let adoption: Vec<f64> = completed
        .iter()
        .map(|s| s.summary.final_cbdc_adoption_rate)
        .collect();
    let mean_adoption = adoption.iter().sum::<f64>() / n;
    let std_adoption =
        (adoption.iter().map(|a| (a - mean_adoption).powi(2)).sum::<f64>() / n).sqrt();
    let mean_reduction = completed
        .iter()
        .map(|s| s.summary.deposit_reduction_rate)
        .sum::<f64>()
        / n;

    println!("\n{:<28} {:>12}", "Metric", "Value");
    println!("{:-<28} {:->12}", "", "");
    println!("{:<28} {:>12}", "Completed runs", completed.len());
    println!("{:<28} {:>11.1}%", "Mean final adoption", mean_adoption * 100.0);
    println!("{:<28} {:>11.1}%", "Std final adoption", std_adoption * 100.0);
    println!("{:<28} {:>11.1}%", "Mean deposit reduction", mean_reduction * 100.0);

    if let Some(path) = output {
        if let Err(e) = write_sweep_csv(&completed, &path) {
            error!("failed to write sweep results: {e}");
            process::exit(1);
        }
        println!("\nSweep results written to {}", path.display());
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            preset,
            steps,
            seed,
            output,
        } => {
            let mut experiment = load_experiment(config, preset);
            if let Some(steps) = steps {
                experiment.simulation.steps = steps;
            }
            if let Some(seed) = seed {
                experiment.model.seed = seed;
            }
            run_single(experiment, output);
        }
        Commands::Sweep {
            config,
            preset,
            steps,
            runs,
            threads,
            output,
        } => {
            let mut experiment = load_experiment(config, preset);
            if let Some(steps) = steps {
                experiment.simulation.steps = steps;
            }
            if let Some(runs) = runs {
                experiment.simulation.runs = runs;
            }
            run_sweep(experiment, threads, output);
        }
        Commands::Scenarios { steps, seed } => match run_all_scenarios(steps, seed) {
            Ok(results) => {
                for result in &results {
                    result.print_summary();
                }
            }
            Err(e) => {
                error!("{e}");
                process::exit(1);
            }
        },
    }
}
