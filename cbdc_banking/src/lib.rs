//! CBDC Banking Agent-Based Model
//!
//! Simulates how introducing a central bank digital currency reshapes a
//! two-tier banking system: consumers split wealth across bank deposits,
//! banknotes and CBDC; commercial banks lose deposits and rebalance their
//! balance sheets; the central bank issues CBDC one-for-one against bank
//! reserves; merchants decide whether to accept it.
//!
//! Key agents:
//! - CentralBank: CBDC issuance, policy stance, emergency liquidity
//! - CommercialBank: deposits, lending, Basel III ratios, centrality
//! - Consumer: three-tier holdings, CBDC adoption, payments
//! - Merchant: payment acceptance and business banking
//! - RiskManager: cyber incidents, compliance, stress tests, digital runs
//!
//! The whole economy is one des agent driven by a self-rescheduling
//! `Event::Step`.

pub mod agents;
pub mod collector;
pub mod config;
pub mod error;
pub mod model;
pub mod money;
pub mod output;
pub mod random;
pub mod scenarios;
pub mod snapshot;

use serde::Serialize;

pub use collector::DataCollector;
pub use config::{ExperimentConfig, ModelConfig, PolicyStance, RiskConfig, SimulationSettings};
pub use error::{ConfigError, OutputError};
pub use model::{CbdcBankingModel, Economy, SimulationSummary};
pub use money::{CbdcLimits, Holdings, PaymentMethod};

/// Events in the CBDC banking simulation
#[derive(Debug, Clone)]
pub enum Event {
    /// Advance the economy by one tick
    Step { step: usize },
}

/// Observable outcome of one simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationStats {
    pub seed: u64,
    pub steps_completed: usize,
    pub summary: SimulationSummary,
    /// Adoption rate per collected row, starting with the initial state
    pub adoption_history: Vec<f64>,
    pub deposit_history: Vec<f64>,
}

impl SimulationStats {
    /// Largest adoption rate reached during the run
    pub fn peak_adoption(&self) -> f64 {
        self.adoption_history.iter().copied().fold(0.0, f64::max)
    }

    /// First collected row at which adoption reached `level`
    pub fn first_step_reaching(&self, level: f64) -> Option<usize> {
        self.adoption_history.iter().position(|&rate| rate >= level)
    }
}

/// Statistics reported by agents in the simulation
#[derive(Debug, Clone)]
pub enum Stats {
    Simulation(SimulationStats),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with_history(adoption_history: Vec<f64>) -> SimulationStats {
        let model = CbdcBankingModel::new(ModelConfig::small()).unwrap();
        SimulationStats {
            adoption_history,
            ..model.simulation_stats()
        }
    }

    #[test]
    fn peak_and_threshold_crossing() {
        let stats = stats_with_history(vec![0.0, 0.0, 0.1, 0.3, 0.25]);
        assert_eq!(stats.peak_adoption(), 0.3);
        assert_eq!(stats.first_step_reaching(0.1), Some(2));
        assert_eq!(stats.first_step_reaching(0.5), None);
    }
}
