//! Central bank agent
//!
//! Issues the CBDC, steers its rate and attractiveness, watches the
//! commercial banks and settles CBDC issuance against bank reserves so that
//! `cbdc_outstanding == central_bank_deposits` after every step.

use serde::Serialize;
use tracing::{info, warn};

use super::commercial_bank::CommercialBank;
use super::consumer::Consumer;
use super::merchant::Merchant;
use super::{ratio_or, unit_clamp, Centrality};
use crate::config::PolicyStance;
use crate::snapshot::TickSnapshot;

pub const INITIAL_CBDC_SUPPLY: f64 = 1_000_000.0;
const WEAK_BANK_LIQUIDITY: f64 = 0.05;
const WEAK_BANK_SHARE_TRIGGER: f64 = 0.3;
const HIGH_RISK: f64 = 0.7;
const LOW_RISK: f64 = 0.3;
const MIN_POLICY_FACTOR: f64 = 0.1;
const MAX_POLICY_FACTOR: f64 = 5.0;

/// Herfindahl concentration of deposits, rescaled so an even split is 0 and
/// a single bank holding everything is 1.
///
/// Returns 0.0 for fewer than two banks or no deposits at all.
pub fn deposit_concentration_risk(deposits: &[f64]) -> f64 {
    let n = deposits.len();
    let total: f64 = deposits.iter().sum();
    if n < 2 || total <= 0.0 {
        return 0.0;
    }
    let hhi: f64 = deposits.iter().map(|d| (d / total).powi(2)).sum();
    let min_hhi = 1.0 / n as f64;
    unit_clamp((hhi - min_hhi) / (1.0 - min_hhi))
}

#[derive(Debug, Clone, Serialize)]
pub struct CbdcStatistics {
    pub cbdc_introduced: bool,
    pub cbdc_adoption_rate: f64,
    pub cbdc_outstanding: f64,
    pub cbdc_interest_rate: f64,
    pub cbdc_attractiveness: f64,
    pub banking_system_health: f64,
    pub systemic_risk_level: f64,
    pub policy_effectiveness: f64,
    pub banknotes_outstanding: f64,
    pub deposit_to_cbdc_conversion: f64,
    pub banknote_to_cbdc_conversion: f64,
    pub cbdc_redeemed: f64,
}

#[derive(Debug, Clone)]
pub struct CentralBank {
    pub cbdc_introduced: bool,
    pub introduction_step: Option<usize>,
    pub cbdc_interest_rate: f64,
    pub cbdc_supply: f64,
    pub cbdc_outstanding: f64,
    /// Reserves received from banks against issued CBDC
    pub central_bank_deposits: f64,
    pub cbdc_redeemed: f64,
    pub monetary_policy_rate: f64,

    pub policy: PolicyStance,
    pub adoption_target: f64,
    base_attractiveness: f64,
    network_effect: f64,
    policy_factor: f64,

    pub cbdc_adoption_rate: f64,
    pub cbdc_market_share: f64,
    pub banking_system_health: f64,
    pub systemic_risk_level: f64,
    last_total_deposits: Option<f64>,

    pub centrality: Centrality,
    pub network_centrality: f64,

    pub banknotes_outstanding: f64,
    pub deposit_to_cbdc_conversion: f64,
    pub banknote_to_cbdc_conversion: f64,

    // Raised by the risk manager
    pub cbdc_operational_capacity: f64,
    pub emergency_liquidity_support: bool,
    pub cbdc_adoption_controls: bool,

    pub emergency_interventions: usize,
    pub standing_facility_lending: f64,
}

impl CentralBank {
    pub fn new(
        cbdc_interest_rate: f64,
        base_attractiveness: f64,
        policy: PolicyStance,
        adoption_target: f64,
    ) -> Self {
        CentralBank {
            cbdc_introduced: false,
            introduction_step: None,
            cbdc_interest_rate,
            cbdc_supply: 0.0,
            cbdc_outstanding: 0.0,
            central_bank_deposits: 0.0,
            cbdc_redeemed: 0.0,
            monetary_policy_rate: 0.02,
            policy,
            adoption_target,
            base_attractiveness,
            network_effect: 1.0,
            policy_factor: 1.0,
            cbdc_adoption_rate: 0.0,
            cbdc_market_share: 0.0,
            banking_system_health: 1.0,
            systemic_risk_level: 0.0,
            last_total_deposits: None,
            centrality: Centrality::default(),
            network_centrality: 0.0,
            banknotes_outstanding: 0.0,
            deposit_to_cbdc_conversion: 0.0,
            banknote_to_cbdc_conversion: 0.0,
            cbdc_operational_capacity: 1.0,
            emergency_liquidity_support: false,
            cbdc_adoption_controls: false,
            emergency_interventions: 0,
            standing_facility_lending: 0.0,
        }
    }

    /// Effective attractiveness: configured base, network effect and the
    /// bank's own policy factor
    pub fn cbdc_attractiveness(&self) -> f64 {
        self.base_attractiveness * self.attractiveness_factor()
    }

    /// Effective attractiveness relative to the configured base
    pub fn attractiveness_factor(&self) -> f64 {
        self.network_effect * self.policy_factor
    }

    pub fn policy_factor(&self) -> f64 {
        self.policy_factor
    }

    /// Network effect from the current adoption rate, set by the scheduler
    pub fn set_network_effect(&mut self, adoption_rate: f64) {
        self.network_effect = 1.0 + 0.5 * adoption_rate;
    }

    /// One-shot launch; later calls do nothing
    pub fn introduce_cbdc(&mut self, tick: usize, consumers: &mut [Consumer]) {
        if self.cbdc_introduced {
            return;
        }
        self.cbdc_introduced = true;
        self.introduction_step = Some(tick);
        self.cbdc_supply = INITIAL_CBDC_SUPPLY;
        for consumer in consumers.iter_mut() {
            consumer.cbdc_available = true;
        }
        info!(
            tick,
            rate = self.cbdc_interest_rate,
            supply = self.cbdc_supply,
            "central bank introduced CBDC"
        );
    }

    pub fn step(
        &mut self,
        snapshot: &TickSnapshot,
        banks: &mut [CommercialBank],
        consumers: &[Consumer],
        merchants: &[Merchant],
    ) {
        if !self.cbdc_introduced {
            return;
        }
        self.cbdc_adoption_rate = snapshot.adoption_rate;
        self.monitor_cbdc_impact(banks);
        self.adjust_cbdc_policy();
        self.monitor_banking_system(banks);
        self.settle_cbdc_exchange(banks, consumers, merchants);
        self.update_centrality(consumers);
        self.update_banknotes(consumers, merchants);
    }

    fn monitor_cbdc_impact(&mut self, banks: &[CommercialBank]) {
        let total: f64 = banks.iter().map(|b| b.total_deposits).sum();
        let change = match self.last_total_deposits {
            Some(previous) => ratio_or(total - previous, previous, 0.0),
            None => 0.0,
        };
        self.last_total_deposits = Some(total);

        let avg_liquidity =
            ratio_or(banks.iter().map(|b| b.liquidity_ratio).sum(), banks.len() as f64, 0.0);
        let deposit_health = (1.0 - change.abs() * 0.5).max(0.0);
        let liquidity_health = (avg_liquidity / 0.2).min(1.0);
        self.banking_system_health = (deposit_health + liquidity_health) / 2.0;

        let deposits: Vec<f64> = banks.iter().map(|b| b.total_deposits).collect();
        let rapid_adoption = (self.cbdc_adoption_rate * 2.0).min(1.0);
        self.systemic_risk_level = unit_clamp(
            rapid_adoption * 0.4
                + (1.0 - self.banking_system_health) * 0.4
                + deposit_concentration_risk(&deposits) * 0.2,
        );
    }

    fn adjust_cbdc_policy(&mut self) {
        match self.policy {
            PolicyStance::Throttling => {
                if self.systemic_risk_level > HIGH_RISK {
                    self.policy_factor *= 0.95;
                    if self.cbdc_interest_rate > 0.005 {
                        self.cbdc_interest_rate *= 0.98;
                    }
                } else if self.systemic_risk_level < LOW_RISK && self.cbdc_adoption_rate < 0.2 {
                    self.policy_factor *= 1.02;
                    if self.cbdc_interest_rate < 0.03 {
                        self.cbdc_interest_rate *= 1.01;
                    }
                }
            }
            PolicyStance::Promotion => {
                if self.cbdc_adoption_rate < self.adoption_target {
                    self.policy_factor *= 1.02;
                    self.cbdc_interest_rate = (self.cbdc_interest_rate * 1.01).min(0.03);
                }
            }
        }
        if self.cbdc_adoption_controls {
            self.policy_factor *= 0.9;
        }
        self.policy_factor = self.policy_factor.clamp(MIN_POLICY_FACTOR, MAX_POLICY_FACTOR);
    }

    fn monitor_banking_system(&mut self, banks: &mut [CommercialBank]) {
        if banks.is_empty() {
            return;
        }
        let weak = banks
            .iter()
            .filter(|b| b.liquidity_ratio < WEAK_BANK_LIQUIDITY)
            .count();
        if weak as f64 / banks.len() as f64 > WEAK_BANK_SHARE_TRIGGER {
            self.implement_emergency_measures(banks, weak);
        }
        if self.emergency_liquidity_support {
            self.lend_standing_facility(banks);
        }
    }

    /// Lower the policy rate, damp CBDC appeal and inject 10% of deposits
    /// into every weak bank. The injection creates money.
    fn implement_emergency_measures(&mut self, banks: &mut [CommercialBank], weak: usize) {
        self.monetary_policy_rate = (self.monetary_policy_rate * 0.9).max(0.001);
        self.policy_factor = (self.policy_factor * 0.9).max(MIN_POLICY_FACTOR);
        self.emergency_interventions += 1;

        let mut injected = 0.0;
        for bank in banks.iter_mut() {
            if bank.liquidity_ratio < WEAK_BANK_LIQUIDITY {
                let amount = bank.total_deposits * 0.1;
                bank.inject_emergency_liquidity(amount);
                injected += amount;
            }
        }
        warn!(weak_banks = weak, injected, "emergency liquidity injection");
    }

    /// Lend weak banks enough reserves to get back to the liquidity floor
    fn lend_standing_facility(&mut self, banks: &mut [CommercialBank]) {
        for bank in banks.iter_mut() {
            let target = bank.total_deposits * WEAK_BANK_LIQUIDITY;
            if bank.cash_reserves < target {
                let amount = target - bank.cash_reserves;
                bank.borrow_from_facility(amount);
                self.standing_facility_lending += amount;
            }
        }
    }

    /// 1:1 exchange between CBDC and bank reserves.
    ///
    /// New CBDC pulls reserves from banks in proportion to this tick's
    /// CBDC-related outflows (falling back to deposit share, then equal
    /// shares); redemptions return reserves pro rata to deposits.
    pub fn settle_cbdc_exchange(
        &mut self,
        banks: &mut [CommercialBank],
        consumers: &[Consumer],
        merchants: &[Merchant],
    ) {
        let demand: f64 = consumers.iter().map(|c| c.holdings.cbdc).sum::<f64>()
            + merchants.iter().map(|m| m.cbdc_balance).sum::<f64>();
        let delta = demand - self.cbdc_outstanding;

        if delta > 0.0 {
            let outflows: Vec<f64> = banks.iter().map(|b| b.outflows_this_tick).collect();
            let weights = if outflows.iter().sum::<f64>() > 0.0 {
                outflows
            } else {
                deposit_weights(banks)
            };
            let total: f64 = weights.iter().sum();
            for (bank, w) in banks.iter_mut().zip(&weights) {
                bank.transfer_reserves_to_central_bank(delta * ratio_or(*w, total, 0.0));
            }
        } else if delta < 0.0 {
            let weights = deposit_weights(banks);
            let total: f64 = weights.iter().sum();
            for (bank, w) in banks.iter_mut().zip(&weights) {
                bank.receive_redemption(-delta * ratio_or(*w, total, 0.0));
            }
            self.cbdc_redeemed -= delta;
        }

        for c in consumers {
            self.deposit_to_cbdc_conversion += c.flows().deposits_to_cbdc;
            self.banknote_to_cbdc_conversion += c.flows().banknotes_to_cbdc;
        }
        self.central_bank_deposits += delta;
        self.cbdc_outstanding = demand;
    }

    fn update_centrality(&mut self, consumers: &[Consumer]) {
        let (cbdc, liquid) = consumers.iter().fold((0.0, 0.0), |(cbdc, liquid), c| {
            (cbdc + c.holdings.cbdc, liquid + c.holdings.liquid())
        });
        let a = self.cbdc_adoption_rate;
        let s = ratio_or(cbdc, liquid, 0.0);
        self.cbdc_market_share = s;

        self.centrality = Centrality {
            degree: unit_clamp(0.10 + 0.60 * a + 0.20 * s),
            betweenness: unit_clamp(0.05 + 0.85 * a + 0.10 * s),
            closeness: unit_clamp(0.20 + 0.40 * a + 0.20 * s),
            eigenvector: unit_clamp(0.10 + 0.55 * a + 0.30 * s),
        };
        let monopoly_bonus = if a > 0.3 { 0.2 * (a - 0.3) } else { 0.0 };
        self.network_centrality = unit_clamp(0.1 + 0.5 * a + 0.3 * s + monopoly_bonus);
    }

    fn update_banknotes(&mut self, consumers: &[Consumer], merchants: &[Merchant]) {
        self.banknotes_outstanding = consumers.iter().map(|c| c.holdings.banknotes).sum::<f64>()
            + merchants.iter().map(|m| m.cash_balance).sum::<f64>();
    }

    /// Balance of hitting the adoption target against systemic risk
    pub fn policy_effectiveness(&self) -> f64 {
        let adoption = ratio_or(self.cbdc_adoption_rate, self.adoption_target, 1.0).min(1.0);
        (adoption + (1.0 - self.systemic_risk_level)) / 2.0
    }

    pub fn cbdc_statistics(&self) -> CbdcStatistics {
        CbdcStatistics {
            cbdc_introduced: self.cbdc_introduced,
            cbdc_adoption_rate: self.cbdc_adoption_rate,
            cbdc_outstanding: self.cbdc_outstanding,
            cbdc_interest_rate: self.cbdc_interest_rate,
            cbdc_attractiveness: self.cbdc_attractiveness(),
            banking_system_health: self.banking_system_health,
            systemic_risk_level: self.systemic_risk_level,
            policy_effectiveness: self.policy_effectiveness(),
            banknotes_outstanding: self.banknotes_outstanding,
            deposit_to_cbdc_conversion: self.deposit_to_cbdc_conversion,
            banknote_to_cbdc_conversion: self.banknote_to_cbdc_conversion,
            cbdc_redeemed: self.cbdc_redeemed,
        }
    }
}

/// Deposit shares, or equal weights when no bank holds deposits
fn deposit_weights(banks: &[CommercialBank]) -> Vec<f64> {
    let deposits: Vec<f64> = banks.iter().map(|b| b.total_deposits.max(0.0)).collect();
    if deposits.iter().sum::<f64>() > 0.0 {
        deposits
    } else {
        vec![1.0; banks.len()]
    }
}
