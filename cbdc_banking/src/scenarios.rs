//! Named runs and seed sweeps driven through the des event loop.

use des::parallel::ParallelRunner;
use des::{Agent, EventLoop};

use crate::config::{ModelConfig, PolicyStance};
use crate::error::ConfigError;
use crate::money::CbdcLimits;
use crate::{CbdcBankingModel, Event, SimulationStats, Stats};

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub name: String,
    pub model: ModelConfig,
    pub steps: usize,
}

impl ScenarioConfig {
    pub fn baseline(steps: usize, seed: u64) -> Self {
        ScenarioConfig {
            name: "Baseline".to_string(),
            model: ModelConfig::default().with_seed(seed),
            steps,
        }
    }

    pub fn holding_limits(steps: usize, seed: u64) -> Self {
        ScenarioConfig {
            name: "Holding limits".to_string(),
            model: ModelConfig {
                limits: CbdcLimits::holding_limits(),
                ..ModelConfig::default().with_seed(seed)
            },
            steps,
        }
    }

    pub fn promotion(steps: usize, seed: u64) -> Self {
        ScenarioConfig {
            name: "Promotion policy".to_string(),
            model: ModelConfig {
                policy: PolicyStance::Promotion,
                ..ModelConfig::default().with_seed(seed)
            },
            steps,
        }
    }

    pub fn calibrated_2025(steps: usize, seed: u64) -> Self {
        ScenarioConfig {
            name: "Calibrated 2025".to_string(),
            model: ModelConfig::calibrated_2025().with_seed(seed),
            steps,
        }
    }

    pub fn all(steps: usize, seed: u64) -> Vec<Self> {
        vec![
            Self::baseline(steps, seed),
            Self::holding_limits(steps, seed),
            Self::promotion(steps, seed),
            Self::calibrated_2025(steps, seed),
        ]
    }
}

#[derive(Debug)]
pub struct ScenarioResult {
    pub config: ScenarioConfig,
    pub stats: SimulationStats,
}

impl ScenarioResult {
    pub fn print_summary(&self) {
        let summary = &self.stats.summary;
        println!("\n=== {} ===", self.config.name);
        println!("Steps completed: {}", self.stats.steps_completed);
        println!(
            "CBDC adoption: {:.1}% ({} adopters), holdings {:.0}",
            summary.final_cbdc_adoption_rate * 100.0,
            summary.cbdc_adopters,
            summary.final_cbdc_holdings
        );
        println!(
            "Bank deposits: {:.0} -> {:.0} ({:.1}% reduction)",
            summary.initial_bank_deposits,
            summary.final_bank_deposits,
            summary.deposit_reduction_rate * 100.0
        );
        println!(
            "Loans: {:.0}, average liquidity ratio {:.3}",
            summary.final_bank_loans, summary.average_final_liquidity
        );
        println!(
            "Merchants accepting CBDC: {}",
            summary.merchants_accepting_cbdc
        );
        if let Some(risk) = &summary.risk {
            println!(
                "Systemic risk {:.3}, cyber incidents {}, violations {}",
                risk.systemic_risk_score, risk.cyber_incidents_count, risk.compliance_violations
            );
        }
    }
}

/// Event loop holding a single model, primed with the first tick
pub fn build_event_loop(config: ModelConfig) -> Result<EventLoop<Event, Stats>, ConfigError> {
    let model = CbdcBankingModel::new(config)?;
    let agents: Vec<Box<dyn Agent<Event, Stats>>> = vec![Box::new(model)];
    Ok(EventLoop::new(vec![(1, Event::Step { step: 1 })], agents))
}

fn first_simulation_stats(stats: Vec<Stats>) -> Option<SimulationStats> {
    stats.into_iter().next().map(|s| match s {
        Stats::Simulation(stats) => stats,
    })
}

pub fn run_scenario(config: ScenarioConfig) -> Result<ScenarioResult, ConfigError> {
    let mut event_loop = build_event_loop(config.model.clone())?;
    event_loop.run(config.steps);

    let stats = match first_simulation_stats(event_loop.stats()) {
        Some(stats) => stats,
        None => CbdcBankingModel::new(config.model.clone())?.simulation_stats(),
    };
    Ok(ScenarioResult { config, stats })
}

pub fn run_all_scenarios(steps: usize, seed: u64) -> Result<Vec<ScenarioResult>, ConfigError> {
    ScenarioConfig::all(steps, seed)
        .into_iter()
        .map(run_scenario)
        .collect()
}

/// Run `runs` copies of `config` with seeds `config.seed + run` on a rayon
/// pool. Results come back in seed order; a run that panicked is `Err`.
pub fn run_seed_sweep(
    config: &ModelConfig,
    steps: usize,
    runs: usize,
    threads: Option<usize>,
) -> Result<Vec<Result<SimulationStats, String>>, ConfigError> {
    config.validate()?;

    let builder = |run: usize| {
        let seeded = config.clone().with_seed(config.seed.wrapping_add(run as u64));
        // validated above; reseeding cannot invalidate it
        build_event_loop(seeded).unwrap_or_else(|_| EventLoop::new(Vec::new(), Vec::new()))
    };

    let mut runner = ParallelRunner::new(runs, builder).progress(|done, total| {
        tracing::debug!(done, total, "sweep run finished");
    });
    if let Some(n) = threads {
        runner = runner.num_threads(n);
    }

    Ok(runner
        .run(steps)
        .into_iter()
        .map(|result| {
            result.and_then(|stats| {
                first_simulation_stats(stats).ok_or_else(|| "run produced no stats".to_string())
            })
        })
        .collect())
}
