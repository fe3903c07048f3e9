use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::money::CbdcLimits;

/// How the central bank steers CBDC uptake
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStance {
    /// Slow adoption down when systemic risk is high, encourage it when risk
    /// is low and uptake is slow
    #[default]
    Throttling,
    /// Keep raising attractiveness and rate until the adoption target is met
    Promotion,
}

/// Shock probabilities and supervisory thresholds used by the risk manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub ransomware_probability: f64,
    /// Share of banks hit by a ransomware incident
    pub ransomware_bank_share: f64,
    pub phishing_probability: f64,
    /// Share of consumers compromised by a phishing campaign
    pub phishing_consumer_share: f64,
    pub ddos_probability: f64,
    /// System-wide per-step deposit outflow that signals a digital run
    pub run_velocity_threshold: f64,
    /// Per-bank outflow that marks a bank as part of a run
    pub bank_run_threshold: f64,
    pub min_capital_ratio: f64,
    pub min_liquidity_coverage: f64,
    pub min_stable_funding: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            ransomware_probability: 0.002,
            ransomware_bank_share: 0.2,
            phishing_probability: 0.005,
            phishing_consumer_share: 0.08,
            ddos_probability: 0.001,
            run_velocity_threshold: 0.2,
            bank_run_threshold: 0.15,
            min_capital_ratio: 0.08,
            min_liquidity_coverage: 1.0,
            min_stable_funding: 1.0,
        }
    }
}

impl RiskConfig {
    /// No stochastic shocks; monitoring still runs
    pub fn quiet() -> Self {
        RiskConfig {
            ransomware_probability: 0.0,
            phishing_probability: 0.0,
            ddos_probability: 0.0,
            ..RiskConfig::default()
        }
    }
}

/// Model construction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub n_consumers: usize,
    pub n_commercial_banks: usize,
    pub n_merchants: usize,
    /// Tick at which the central bank launches the CBDC
    pub cbdc_introduction_step: usize,
    /// Base per-tick adoption probability
    pub cbdc_adoption_rate: f64,
    pub cbdc_attractiveness: f64,
    pub initial_consumer_wealth: f64,
    pub bank_interest_rate: f64,
    pub cbdc_interest_rate: f64,
    pub seed: u64,
    /// Fraction of banks flagged large (at least one)
    pub large_bank_fraction: f64,
    pub initial_deposit_share: f64,
    pub initial_banknote_share: f64,
    /// Mean number of payments a consumer makes per tick
    pub transactions_per_step: f64,
    /// Probability that a payment goes to another consumer instead of a merchant
    pub peer_payment_share: f64,
    pub policy: PolicyStance,
    /// Adoption rate the central bank aims for
    pub adoption_target: f64,
    pub enable_risk_manager: bool,
    pub limits: CbdcLimits,
    pub risk: RiskConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            n_consumers: 200,
            n_commercial_banks: 8,
            n_merchants: 10,
            cbdc_introduction_step: 30,
            cbdc_adoption_rate: 0.03,
            cbdc_attractiveness: 1.5,
            initial_consumer_wealth: 5000.0,
            bank_interest_rate: 0.02,
            cbdc_interest_rate: 0.01,
            seed: 42,
            large_bank_fraction: 0.2,
            initial_deposit_share: 0.75,
            initial_banknote_share: 0.10,
            transactions_per_step: 2.0,
            peer_payment_share: 0.2,
            policy: PolicyStance::Throttling,
            adoption_target: 0.3,
            enable_risk_manager: true,
            limits: CbdcLimits::unlimited(),
            risk: RiskConfig::default(),
        }
    }
}

impl ModelConfig {
    /// Ten consumers, two banks, CBDC at tick 5
    pub fn small() -> Self {
        ModelConfig {
            n_consumers: 10,
            n_commercial_banks: 2,
            n_merchants: 2,
            cbdc_introduction_step: 5,
            ..ModelConfig::default()
        }
    }

    /// CBDC paying the same rate as deposits, with holding limits in force
    pub fn calibrated_2025() -> Self {
        ModelConfig {
            cbdc_interest_rate: 0.02,
            n_merchants: 20,
            limits: CbdcLimits::holding_limits(),
            ..ModelConfig::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ModelConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations that would produce NaNs or empty populations
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_consumers == 0 {
            return Err(ConfigError::NoConsumers);
        }
        if self.n_commercial_banks == 0 {
            return Err(ConfigError::NoCommercialBanks);
        }

        unit("cbdc_adoption_rate", self.cbdc_adoption_rate)?;
        unit("bank_interest_rate", self.bank_interest_rate)?;
        unit("cbdc_interest_rate", self.cbdc_interest_rate)?;
        unit("large_bank_fraction", self.large_bank_fraction)?;
        unit("initial_deposit_share", self.initial_deposit_share)?;
        unit("initial_banknote_share", self.initial_banknote_share)?;
        unit("peer_payment_share", self.peer_payment_share)?;
        bounded("adoption_target", self.adoption_target, 0.01, 1.0)?;
        bounded(
            "initial_deposit_share + initial_banknote_share",
            self.initial_deposit_share + self.initial_banknote_share,
            0.0,
            1.0,
        )?;
        bounded("cbdc_attractiveness", self.cbdc_attractiveness, 1e-6, 100.0)?;
        bounded("initial_consumer_wealth", self.initial_consumer_wealth, 1e-6, 1e12)?;
        bounded("transactions_per_step", self.transactions_per_step, 0.0, 1000.0)?;
        bounded(
            "cbdc_introduction_step",
            self.cbdc_introduction_step as f64,
            1.0,
            f64::MAX,
        )?;

        let r = &self.risk;
        unit("risk.ransomware_probability", r.ransomware_probability)?;
        unit("risk.ransomware_bank_share", r.ransomware_bank_share)?;
        unit("risk.phishing_probability", r.phishing_probability)?;
        unit("risk.phishing_consumer_share", r.phishing_consumer_share)?;
        unit("risk.ddos_probability", r.ddos_probability)?;
        unit("risk.run_velocity_threshold", r.run_velocity_threshold)?;
        unit("risk.bank_run_threshold", r.bank_run_threshold)?;
        bounded("risk.min_capital_ratio", r.min_capital_ratio, 0.0, 1.0)?;
        bounded("risk.min_liquidity_coverage", r.min_liquidity_coverage, 0.0, 100.0)?;
        bounded("risk.min_stable_funding", r.min_stable_funding, 0.0, 100.0)?;

        let l = &self.limits;
        for (field, value) in [
            ("limits.wallet_cap", l.wallet_cap),
            ("limits.cooling_period_cap", l.cooling_period_cap),
            ("limits.transfer_cap_per_step", l.transfer_cap_per_step),
            ("limits.redemption_cap_per_step", l.redemption_cap_per_step),
        ] {
            if let Some(v) = value {
                bounded(field, v, 0.0, f64::MAX)?;
            }
        }

        Ok(())
    }
}

fn bounded(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { field });
    }
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    bounded(field, value, 0.0, 1.0)
}

/// Run length and repetition count for the command-line runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub steps: usize,
    pub runs: usize,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            steps: 200,
            runs: 1,
        }
    }
}

/// Experiment file: `[simulation]` plus `[model]` tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub simulation: SimulationSettings,
    pub model: ModelConfig,
}

impl ExperimentConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let experiment: ExperimentConfig = toml::from_str(&text)?;
        experiment.model.validate()?;
        Ok(experiment)
    }
}
