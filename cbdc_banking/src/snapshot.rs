//! Read-only view of the economy taken once per tick.
//!
//! Every agent that steps during a tick sees the same snapshot, so the
//! order in which agents are stepped never changes the rates, adoption
//! figures or stress levels they decide on.

use crate::model::Economy;
use crate::money::{BankId, PaymentMethod};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BankView {
    pub interest_rate: f64,
    pub liquidity_stress_level: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MerchantView {
    pub accepts_cbdc: bool,
    pub online: bool,
    /// Preference score per instrument, indexed by [`PaymentMethod::index`]
    pub preferences: [f64; 4],
    pub avg_transaction_size: f64,
    pub transaction_variance: f64,
}

impl MerchantView {
    pub fn preference(&self, method: PaymentMethod) -> f64 {
        self.preferences[method.index()]
    }
}

/// What a paying consumer needs to know about a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerView {
    pub adopter: bool,
    pub banked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickSnapshot {
    pub tick: usize,
    pub cbdc_introduced: bool,
    /// Ticks elapsed since the introduction tick, 0 before it
    pub steps_since_introduction: usize,
    /// Share of consumers that adopted, as of the end of the previous tick
    pub adoption_rate: f64,
    /// Share of adopters' liquid bank-and-CBDC money held as CBDC
    pub peer_cbdc_usage: f64,
    pub cbdc_interest_rate: f64,
    pub cbdc_attractiveness: f64,
    /// Effective attractiveness relative to the configured base
    pub attractiveness_factor: f64,
    pub cbdc_operational_capacity: f64,
    pub economic_conditions: f64,
    pub systemic_risk_score: f64,
    pub banks: Vec<BankView>,
    pub merchants: Vec<MerchantView>,
    pub peers: Vec<PeerView>,
}

impl Default for TickSnapshot {
    fn default() -> Self {
        TickSnapshot {
            tick: 0,
            cbdc_introduced: false,
            steps_since_introduction: 0,
            adoption_rate: 0.0,
            peer_cbdc_usage: 0.0,
            cbdc_interest_rate: 0.0,
            cbdc_attractiveness: 1.0,
            attractiveness_factor: 1.0,
            cbdc_operational_capacity: 1.0,
            economic_conditions: 1.0,
            systemic_risk_score: 0.0,
            banks: Vec::new(),
            merchants: Vec::new(),
            peers: Vec::new(),
        }
    }
}

impl TickSnapshot {
    pub fn capture(economy: &Economy) -> Self {
        let cb = &economy.central_bank;
        let steps_since_introduction = cb
            .introduction_step
            .map_or(0, |step| economy.current_step.saturating_sub(step));

        TickSnapshot {
            tick: economy.current_step,
            cbdc_introduced: cb.cbdc_introduced,
            steps_since_introduction,
            adoption_rate: economy.compute_cbdc_adoption_rate(),
            peer_cbdc_usage: economy.peer_cbdc_usage(),
            cbdc_interest_rate: cb.cbdc_interest_rate,
            cbdc_attractiveness: cb.cbdc_attractiveness(),
            attractiveness_factor: cb.attractiveness_factor(),
            cbdc_operational_capacity: cb.cbdc_operational_capacity,
            economic_conditions: economy.economic_conditions,
            systemic_risk_score: economy.systemic_risk_score,
            banks: economy
                .banks
                .iter()
                .map(|b| BankView {
                    interest_rate: b.interest_rate,
                    liquidity_stress_level: b.liquidity_stress_level,
                })
                .collect(),
            merchants: economy.merchants.iter().map(|m| m.view()).collect(),
            peers: economy
                .consumers
                .iter()
                .map(|c| PeerView {
                    adopter: c.cbdc_adopter,
                    banked: c.primary_bank.is_some(),
                })
                .collect(),
        }
    }

    pub fn bank(&self, id: BankId) -> Option<&BankView> {
        self.banks.get(id.0)
    }
}
