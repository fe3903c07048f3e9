//! Supervisory risk monitor.
//!
//! Draws stochastic cyber incidents, checks Basel III ratios, runs deposit
//! and CBDC stress scenarios, watches for digital bank runs and folds it all
//! into a systemic risk score. It only raises flags and alerts on other
//! agents; it never moves money except through cyber losses.

use serde::Serialize;
use tracing::warn;

use super::{ratio_or, unit_clamp};
use crate::config::RiskConfig;
use crate::model::Economy;
use crate::money::BankId;
use crate::random::RandomStream;

/// Alerts looked back on when sizing the cyber threat level
const THREAT_WINDOW_ALERTS: usize = 10;
/// Ticks over which liquidity-stress alerts count toward emergency support
const LIQUIDITY_ALERT_WINDOW: usize = 12;
const ECONOMIC_CONDITIONS_FLOOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StressScenario {
    Mild,
    Moderate,
    Severe,
}

impl StressScenario {
    /// `(deposit outflow, CBDC demand surge)` as shares
    pub fn parameters(self) -> (f64, f64) {
        match self {
            StressScenario::Mild => (0.10, 0.15),
            StressScenario::Moderate => (0.25, 0.35),
            StressScenario::Severe => (0.50, 0.70),
        }
    }

    /// Harsher scenarios under weaker conditions or faster adoption
    pub fn select(economic_conditions: f64, adoption_rate: f64) -> Self {
        let economic_stress = 1.0 - economic_conditions;
        if economic_stress > 0.1 || adoption_rate > 0.5 {
            StressScenario::Severe
        } else if economic_stress > 0.05 || adoption_rate > 0.3 {
            StressScenario::Moderate
        } else {
            StressScenario::Mild
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AlertKind {
    Ransomware { affected_banks: usize },
    Ddos { downtime_hours: f64 },
    LiquidityStress { bank: BankId, scenario: StressScenario },
    CbdcCapacityStress { demand: f64, capacity: f64 },
    DigitalBankRun { deposit_velocity: f64, affected_banks: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAlert {
    pub step: usize,
    pub kind: AlertKind,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationKind {
    CapitalAdequacy,
    LiquidityCoverage,
    StableFunding,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceViolation {
    pub step: usize,
    pub bank: BankId,
    pub kind: ViolationKind,
    pub required: f64,
    pub actual: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskDashboard {
    pub systemic_risk_score: f64,
    pub operational_risk_score: f64,
    pub cyber_threat_level: f64,
    pub market_confidence: f64,
    pub regulatory_credibility: f64,
    pub digital_run_probability: f64,
    pub cyber_incidents_count: usize,
    pub phishing_victims: usize,
    pub compliance_violations: usize,
    pub systemic_alerts: usize,
    pub system_downtime_hours: f64,
    pub cbdc_capacity_stress: bool,
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    pub config: RiskConfig,

    pub cyber_incidents_count: usize,
    pub phishing_victims: usize,
    pub system_downtime_hours: f64,
    pub cyber_threat_level: f64,

    pub compliance_violations: Vec<ComplianceViolation>,
    violations_this_step: usize,
    pub systemic_risk_alerts: Vec<RiskAlert>,

    pub operational_risk_score: f64,
    pub digital_run_probability: f64,
    pub cbdc_adoption_velocity: f64,
    pub cbdc_capacity_stress: bool,
    pub market_confidence: f64,
    pub regulatory_credibility: f64,

    previous_total_deposits: Option<f64>,
    previous_adoption_rate: f64,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        RiskManager {
            config,
            cyber_incidents_count: 0,
            phishing_victims: 0,
            system_downtime_hours: 0.0,
            cyber_threat_level: 0.15,
            compliance_violations: Vec::new(),
            violations_this_step: 0,
            systemic_risk_alerts: Vec::new(),
            operational_risk_score: 0.0,
            digital_run_probability: 0.0,
            cbdc_adoption_velocity: 0.0,
            cbdc_capacity_stress: false,
            market_confidence: 1.0,
            regulatory_credibility: 1.0,
            previous_total_deposits: None,
            previous_adoption_rate: 0.0,
        }
    }

    pub fn step(&mut self, economy: &mut Economy, rng: &mut RandomStream) {
        self.assess_cybersecurity_risks(economy, rng);
        self.monitor_basel_compliance(economy);
        self.conduct_stress_testing(economy);
        self.detect_digital_bank_runs(economy);
        self.assess_operational_risks(economy);
        self.update_systemic_risk_indicators(economy);
        self.implement_regulatory_actions(economy);
    }

    fn alert(&mut self, step: usize, kind: AlertKind, severity: Severity) {
        self.systemic_risk_alerts.push(RiskAlert {
            step,
            kind,
            severity,
        });
    }

    fn assess_cybersecurity_risks(&mut self, economy: &mut Economy, rng: &mut RandomStream) {
        let step = economy.current_step;

        if !economy.banks.is_empty() && rng.chance(self.config.ransomware_probability) {
            self.cyber_incidents_count += 1;
            let n = economy.banks.len();
            let hit = ((n as f64 * self.config.ransomware_bank_share) as usize).max(1);
            for i in rng.sample_indices(n, hit) {
                let capacity_loss = rng.range(0.05, 0.15);
                let bank = &mut economy.banks[i];
                let losses = bank.total_deposits * rng.range(0.02, 0.08);
                bank.record_cyber_incident(losses, capacity_loss);
            }
            warn!(step, affected_banks = hit, "ransomware attack on commercial banks");
            self.alert(
                step,
                AlertKind::Ransomware {
                    affected_banks: hit,
                },
                Severity::High,
            );
        }

        if !economy.consumers.is_empty() && rng.chance(self.config.phishing_probability) {
            let n = economy.consumers.len();
            let hit = ((n as f64 * self.config.phishing_consumer_share) as usize).max(1);
            let mut stolen = 0.0;
            for i in rng.sample_indices(n, hit) {
                let consumer = &mut economy.consumers[i];
                let loss = consumer.wealth() * rng.range(0.1, 0.3);
                stolen += consumer.suffer_loss(loss);
            }
            self.phishing_victims += hit;
            warn!(step, victims = hit, stolen, "phishing campaign against consumers");
        }

        if rng.chance(self.config.ddos_probability) {
            self.system_downtime_hours += rng.range(2.0, 8.0);
            let cb = &mut economy.central_bank;
            cb.cbdc_operational_capacity *= 0.8;
            warn!(
                step,
                capacity = cb.cbdc_operational_capacity,
                "DDoS attack on CBDC infrastructure"
            );
            self.alert(
                step,
                AlertKind::Ddos {
                    downtime_hours: self.system_downtime_hours,
                },
                Severity::Moderate,
            );
        }

        let recent = self
            .systemic_risk_alerts
            .iter()
            .rev()
            .take(THREAT_WINDOW_ALERTS)
            .filter(|a| matches!(a.kind, AlertKind::Ransomware { .. } | AlertKind::Ddos { .. }))
            .count();
        self.cyber_threat_level = (0.15 + recent as f64 * 0.05).min(0.5);
    }

    fn monitor_basel_compliance(&mut self, economy: &Economy) {
        let step = economy.current_step;
        let before = self.compliance_violations.len();

        for bank in &economy.banks {
            let mut violation = |kind, required: f64, actual: f64, severity| {
                self.compliance_violations.push(ComplianceViolation {
                    step,
                    bank: bank.id,
                    kind,
                    required,
                    actual,
                    severity,
                });
            };

            let capital = bank.capital_adequacy_ratio;
            if bank.risk_weighted_assets() > 0.0 && capital < self.config.min_capital_ratio {
                let severity = if capital < 0.06 {
                    Severity::High
                } else {
                    Severity::Moderate
                };
                violation(
                    ViolationKind::CapitalAdequacy,
                    self.config.min_capital_ratio,
                    capital,
                    severity,
                );
            }

            let lcr = bank.liquidity_coverage_ratio;
            if lcr < self.config.min_liquidity_coverage {
                let severity = if lcr < 0.8 {
                    Severity::High
                } else {
                    Severity::Moderate
                };
                violation(
                    ViolationKind::LiquidityCoverage,
                    self.config.min_liquidity_coverage,
                    lcr,
                    severity,
                );
            }

            let nsfr = bank.net_stable_funding_ratio;
            if nsfr < self.config.min_stable_funding {
                violation(
                    ViolationKind::StableFunding,
                    self.config.min_stable_funding,
                    nsfr,
                    Severity::Moderate,
                );
            }
        }

        self.violations_this_step = self.compliance_violations.len() - before;
        if self.violations_this_step > 0 {
            self.regulatory_credibility *= 0.99;
        } else {
            self.regulatory_credibility = (self.regulatory_credibility * 1.001).min(1.0);
        }
    }

    fn conduct_stress_testing(&mut self, economy: &mut Economy) {
        let step = economy.current_step;
        let scenario = StressScenario::select(
            economy.economic_conditions,
            economy.compute_cbdc_adoption_rate(),
        );
        let (outflow, surge) = scenario.parameters();

        let mut stressed = Vec::new();
        for bank in economy.banks.iter_mut() {
            let gap = bank.total_deposits * outflow;
            let available = bank.cash_reserves + bank.securities * 0.8;
            if gap > available {
                bank.liquidity_stress_flag = true;
                let coverage = ratio_or(available, gap, 0.0);
                let severity = if coverage < 0.5 {
                    Severity::High
                } else {
                    Severity::Moderate
                };
                stressed.push((bank.id, severity));
            }
        }
        if !stressed.is_empty() {
            warn!(step, ?scenario, banks = stressed.len(), "stress test shows liquidity shortfall");
        }
        for (bank, severity) in stressed {
            self.alert(step, AlertKind::LiquidityStress { bank, scenario }, severity);
        }

        let cb = &economy.central_bank;
        self.cbdc_capacity_stress = false;
        if cb.cbdc_introduced {
            let demand = economy.compute_total_consumer_wealth() * surge;
            let capacity = (cb.cbdc_outstanding + cb.cbdc_supply) * cb.cbdc_operational_capacity;
            if demand > capacity * 1.2 {
                self.cbdc_capacity_stress = true;
                self.alert(
                    step,
                    AlertKind::CbdcCapacityStress { demand, capacity },
                    Severity::High,
                );
            }
        }
    }

    /// System velocity is measured against this monitor's own record of the
    /// previous tick's deposits; per-bank velocity comes from each bank.
    fn detect_digital_bank_runs(&mut self, economy: &mut Economy) {
        let step = economy.current_step;
        let current = economy.compute_total_bank_deposits();
        self.digital_run_probability = 0.0;
        for bank in economy.banks.iter_mut() {
            bank.digital_run_flag = false;
        }

        if let Some(previous) = self.previous_total_deposits {
            let velocity = ratio_or(previous - current, previous, 0.0);
            if velocity > self.config.run_velocity_threshold {
                self.digital_run_probability = (velocity * 2.0).min(1.0);

                let mut affected = 0;
                for bank in economy.banks.iter_mut() {
                    if bank.deposit_velocity() > self.config.bank_run_threshold {
                        bank.digital_run_flag = true;
                        affected += 1;
                    }
                }
                let severity = if velocity > 0.4 {
                    Severity::Critical
                } else {
                    Severity::High
                };
                warn!(step, velocity, affected_banks = affected, "digital bank run detected");
                self.alert(
                    step,
                    AlertKind::DigitalBankRun {
                        deposit_velocity: velocity,
                        affected_banks: affected,
                    },
                    severity,
                );
                self.market_confidence *= 1.0 - (velocity * 0.5).min(0.2);
            }
        }
        self.previous_total_deposits = Some(current);
    }

    fn assess_operational_risks(&mut self, economy: &mut Economy) {
        let tech_risk = (1.0 - economy.central_bank.cbdc_operational_capacity).max(0.0) * 0.3;
        let governance_risk = (self.violations_this_step as f64 * 0.02).min(0.2);
        let cyber_risk = self.cyber_threat_level * 0.4;
        self.operational_risk_score = (tech_risk + governance_risk + cyber_risk).min(1.0);

        if self.operational_risk_score > 0.3 {
            economy.economic_conditions = (economy.economic_conditions
                * (1.0 - self.operational_risk_score * 0.1))
                .max(ECONOMIC_CONDITIONS_FLOOR);
        }
    }

    fn update_systemic_risk_indicators(&mut self, economy: &mut Economy) {
        let adoption = economy.compute_cbdc_adoption_rate();
        self.cbdc_adoption_velocity = adoption - self.previous_adoption_rate;
        self.previous_adoption_rate = adoption;

        let score = bank_concentration_risk(economy) * 0.3
            + self.cbdc_adoption_risk(adoption) * 0.3
            + liquidity_system_risk(economy) * 0.2
            + self.operational_risk_score * 0.2;
        economy.systemic_risk_score = unit_clamp(score);

        if score > 0.5 {
            self.market_confidence *= 0.98;
        } else if score < 0.2 {
            self.market_confidence = (self.market_confidence * 1.002).min(1.0);
        }
    }

    fn cbdc_adoption_risk(&self, adoption: f64) -> f64 {
        if adoption > 0.7 && self.cbdc_adoption_velocity > 0.1 {
            (adoption * self.cbdc_adoption_velocity * 2.0).min(1.0)
        } else {
            adoption * 0.3
        }
    }

    fn implement_regulatory_actions(&mut self, economy: &mut Economy) {
        if self.operational_risk_score > 0.4 {
            for bank in economy.banks.iter_mut() {
                if !bank.enhanced_capital_requirement {
                    bank.enhanced_capital_requirement = true;
                    bank.capital_buffer_requirement = 0.025;
                }
            }
        }

        let since = economy.current_step.saturating_sub(LIQUIDITY_ALERT_WINDOW);
        let liquidity_alerts = self
            .systemic_risk_alerts
            .iter()
            .filter(|a| a.step > since && matches!(a.kind, AlertKind::LiquidityStress { .. }))
            .count();
        economy.central_bank.emergency_liquidity_support = liquidity_alerts > 2;

        if self.digital_run_probability > 0.3 {
            economy.central_bank.cbdc_adoption_controls = true;
        }
    }

    pub fn risk_dashboard(&self, economy: &Economy) -> RiskDashboard {
        RiskDashboard {
            systemic_risk_score: economy.systemic_risk_score,
            operational_risk_score: self.operational_risk_score,
            cyber_threat_level: self.cyber_threat_level,
            market_confidence: self.market_confidence,
            regulatory_credibility: self.regulatory_credibility,
            digital_run_probability: self.digital_run_probability,
            cyber_incidents_count: self.cyber_incidents_count,
            phishing_victims: self.phishing_victims,
            compliance_violations: self.compliance_violations.len(),
            systemic_alerts: self.systemic_risk_alerts.len(),
            system_downtime_hours: self.system_downtime_hours,
            cbdc_capacity_stress: self.cbdc_capacity_stress,
        }
    }
}

/// Raw deposit HHI doubled and capped at 1; 1 when no bank holds deposits
fn bank_concentration_risk(economy: &Economy) -> f64 {
    if economy.banks.is_empty() {
        return 0.0;
    }
    let total = economy.compute_total_bank_deposits();
    if total <= 0.0 {
        return 1.0;
    }
    let hhi: f64 = economy
        .banks
        .iter()
        .map(|b| (b.total_deposits / total).powi(2))
        .sum();
    (hhi * 2.0).min(1.0)
}

fn liquidity_system_risk(economy: &Economy) -> f64 {
    if economy.banks.is_empty() {
        return 0.0;
    }
    let stressed = economy.banks.iter().filter(|b| b.liquidity_stress_flag).count();
    let stress_ratio = stressed as f64 / economy.banks.len() as f64;
    let liquidity_gap = (1.0 - economy.compute_average_bank_liquidity()).max(0.0);
    unit_clamp(liquidity_gap * 0.5 + stress_ratio * 0.8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use approx::assert_relative_eq;

    fn economy() -> (Economy, RandomStream) {
        let mut rng = RandomStream::seeded(3);
        let economy = Economy::build(&ModelConfig::small(), &mut rng);
        (economy, rng)
    }

    fn certain_shocks() -> RiskConfig {
        RiskConfig {
            ransomware_probability: 1.0,
            phishing_probability: 1.0,
            ddos_probability: 1.0,
            ..RiskConfig::default()
        }
    }

    #[test]
    fn scenario_follows_conditions_and_adoption() {
        assert_eq!(StressScenario::select(1.0, 0.0), StressScenario::Mild);
        assert_eq!(StressScenario::select(0.93, 0.0), StressScenario::Moderate);
        assert_eq!(StressScenario::select(1.0, 0.35), StressScenario::Moderate);
        assert_eq!(StressScenario::select(1.0, 0.6), StressScenario::Severe);
        assert_eq!(StressScenario::select(0.8, 0.0), StressScenario::Severe);
    }

    #[test]
    fn quiet_config_draws_no_incidents() {
        let (mut economy, mut rng) = economy();
        let mut rm = RiskManager::new(RiskConfig::quiet());
        for _ in 0..50 {
            rm.step(&mut economy, &mut rng);
        }
        assert_eq!(rm.cyber_incidents_count, 0);
        assert_eq!(rm.phishing_victims, 0);
        assert_relative_eq!(rm.cyber_threat_level, 0.15);
        assert_relative_eq!(economy.central_bank.cbdc_operational_capacity, 1.0);
    }

    #[test]
    fn certain_shocks_hit_banks_consumers_and_infrastructure() {
        let (mut economy, mut rng) = economy();
        let wealth_before = economy.compute_total_consumer_wealth();
        let mut rm = RiskManager::new(certain_shocks());
        rm.step(&mut economy, &mut rng);

        assert_eq!(rm.cyber_incidents_count, 1);
        assert!(economy.banks.iter().any(|b| b.cyber_incident_flag));
        assert!(economy.banks.iter().all(|b| b.operational_capacity <= 1.0));
        assert_eq!(rm.phishing_victims, 1);
        assert!(economy.compute_total_consumer_wealth() < wealth_before);
        assert_relative_eq!(economy.central_bank.cbdc_operational_capacity, 0.8);
        assert!(rm.system_downtime_hours >= 2.0 && rm.system_downtime_hours < 8.0);
        // One ransomware and one DDoS alert in the window
        assert_relative_eq!(rm.cyber_threat_level, 0.25);
    }

    #[test]
    fn threat_level_is_capped() {
        let (mut economy, mut rng) = economy();
        let mut rm = RiskManager::new(certain_shocks());
        for _ in 0..20 {
            rm.step(&mut economy, &mut rng);
        }
        assert!(rm.cyber_threat_level <= 0.5);
    }

    #[test]
    fn stable_funding_shortfall_is_a_violation() {
        let (mut economy, mut rng) = economy();
        economy.banks[0].net_stable_funding_ratio = 0.7;
        let mut rm = RiskManager::new(RiskConfig::quiet());
        rm.step(&mut economy, &mut rng);

        assert!(rm
            .compliance_violations
            .iter()
            .any(|v| v.bank == BankId(0) && v.kind == ViolationKind::StableFunding));
        assert!(rm.regulatory_credibility < 1.0);
    }

    #[test]
    fn illiquid_bank_fails_stress_test() {
        let (mut economy, mut rng) = economy();
        economy.banks[1].total_deposits = 1000.0;
        economy.banks[1].cash_reserves = 0.0;
        economy.banks[1].securities = 0.0;
        let mut rm = RiskManager::new(RiskConfig::quiet());
        rm.step(&mut economy, &mut rng);

        assert!(economy.banks[1].liquidity_stress_flag);
        assert!(rm.systemic_risk_alerts.iter().any(|a| matches!(
            a.kind,
            AlertKind::LiquidityStress { bank: BankId(1), .. }
        )));
    }

    #[test]
    fn cbdc_demand_surge_beyond_capacity_is_flagged() {
        let (mut economy, mut rng) = economy();
        economy.current_step = 5;
        economy.central_bank.introduce_cbdc(5, &mut economy.consumers);
        let mut rm = RiskManager::new(RiskConfig::quiet());

        rm.step(&mut economy, &mut rng);
        assert!(!rm.cbdc_capacity_stress);

        economy.central_bank.cbdc_supply = 0.0;
        economy.central_bank.cbdc_outstanding = 0.0;
        let (_, surge) = StressScenario::select(
            economy.economic_conditions,
            economy.compute_cbdc_adoption_rate(),
        )
        .parameters();
        rm.step(&mut economy, &mut rng);

        assert!(rm.cbdc_capacity_stress);
        let expected = economy.compute_total_consumer_wealth() * surge;
        assert!(rm.systemic_risk_alerts.iter().any(|a| match a.kind {
            AlertKind::CbdcCapacityStress { demand, capacity } => {
                capacity == 0.0 && (demand - expected).abs() < 1e-9 * expected.max(1.0)
            }
            _ => false,
        }));
    }

    #[test]
    fn repeated_liquidity_alerts_trigger_emergency_support() {
        let (mut economy, mut rng) = economy();
        let mut rm = RiskManager::new(RiskConfig::quiet());
        for _ in 0..3 {
            economy.current_step += 1;
            economy.banks[0].total_deposits = 1000.0;
            economy.banks[0].cash_reserves = 0.0;
            economy.banks[0].securities = 0.0;
            rm.step(&mut economy, &mut rng);
        }
        assert!(economy.central_bank.emergency_liquidity_support);
    }

    #[test]
    fn sharp_deposit_drop_is_flagged_as_run() {
        let (mut economy, mut rng) = economy();
        for bank in economy.banks.iter_mut() {
            bank.total_deposits = 1000.0;
        }
        let mut rm = RiskManager::new(RiskConfig::quiet());
        rm.step(&mut economy, &mut rng);

        for bank in economy.banks.iter_mut() {
            bank.previous_deposits = 1000.0;
            bank.total_deposits = 500.0;
        }
        economy.current_step += 1;
        rm.step(&mut economy, &mut rng);

        assert_relative_eq!(rm.digital_run_probability, 1.0);
        assert!(economy.banks.iter().all(|b| b.digital_run_flag));
        assert!(economy.central_bank.cbdc_adoption_controls);
        assert!(rm.market_confidence < 1.0);
        assert!(rm.systemic_risk_alerts.iter().any(|a| a.severity == Severity::Critical));
    }

    #[test]
    fn systemic_score_stays_in_unit_interval() {
        let (mut economy, mut rng) = economy();
        let mut rm = RiskManager::new(certain_shocks());
        for _ in 0..30 {
            economy.current_step += 1;
            rm.step(&mut economy, &mut rng);
            assert!((0.0..=1.0).contains(&economy.systemic_risk_score));
            assert!(economy.economic_conditions >= ECONOMIC_CONDITIONS_FLOOR);
        }
    }
}
