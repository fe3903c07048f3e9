//! Commercial bank agent
//!
//! A bank's deposit book is derived from its customers' balances every tick;
//! everything else on the balance sheet (reserves, securities, loans,
//! capital, borrowings) is the bank's own state and only moves through the
//! operations below or through central-bank settlement.
//!
//! Per-tick sequence:
//! 1. `update_deposits` - re-sum customer deposits, book CBDC-related outflow
//! 2. `make_loans` - lend against deposits net of the reserve requirement
//! 3. `calculate_metrics` - liquidity, LTD, profitability, market share
//! 4. `adjust_competitive_strategy` - deposit-rate ratchet toward the CBDC rate
//! 5. `handle_customer_attrition` - adopters leave with 10% chance
//! 6. `update_network_metrics` - centrality and interbank decay
//! 7. `calculate_liquidity_stress`
//! 8. Basel III, liquidity risk, cyber response and risk appetite

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::consumer::Consumer;
use super::{ratio_or, unit_clamp, Centrality, CentralityMeasure};
use crate::money::{BankId, ConsumerId};
use crate::random::RandomStream;
use crate::snapshot::TickSnapshot;

/// Spread charged over the deposit rate on loans at construction
pub const LENDING_SPREAD: f64 = 0.03;
pub const RESERVE_REQUIREMENT: f64 = 0.1;
const INITIAL_NETWORK_CENTRALITY: f64 = 0.3;

const LOAN_UTILIZATION: f64 = 0.8;
const CBDC_LENDING_DISCOUNT: f64 = 0.9;
const MAX_RATE_INCREASE: f64 = 0.015;
const MIN_LENDING_SPREAD: f64 = 0.01;
const ATTRITION_PROBABILITY: f64 = 0.1;
const CAPITAL_CONSERVATION_BUFFER: f64 = 0.025;
const BASE_CAPITAL_REQUIREMENT: f64 = 0.08;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankType {
    Large,
    SmallMedium,
}

impl BankType {
    pub fn name(self) -> &'static str {
        match self {
            BankType::Large => "large",
            BankType::SmallMedium => "small_medium",
        }
    }
}

/// Balance-sheet calibration and behavioural constants for one bank type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BankProfile {
    /// Deposits as a share of total assets
    pub deposit_ratio: f64,
    pub loan_ratio: f64,
    pub reserve_ratio: f64,
    pub securities_ratio: f64,
    pub loan_to_deposit_target: f64,
    pub net_interest_margin: f64,
    pub capital_ratio: f64,
    pub cbdc_vulnerability: f64,
    pub customer_stickiness: f64,
    pub digital_capability: f64,
    pub efficiency_ratio: f64,
    pub initial_lcr: f64,
    /// Share of deposits held on demand; the rest are time deposits
    pub demand_share: f64,
}

impl BankProfile {
    pub fn for_type(bank_type: BankType) -> Self {
        match bank_type {
            BankType::Large => BankProfile {
                deposit_ratio: 0.75,
                loan_ratio: 0.55,
                reserve_ratio: 0.15,
                securities_ratio: 0.25,
                loan_to_deposit_target: 0.733,
                net_interest_margin: 0.028,
                capital_ratio: 0.12,
                cbdc_vulnerability: 0.25,
                customer_stickiness: 0.80,
                digital_capability: 0.90,
                efficiency_ratio: 0.58,
                initial_lcr: 1.25,
                demand_share: 0.60,
            },
            BankType::SmallMedium => BankProfile {
                deposit_ratio: 0.82,
                loan_ratio: 0.62,
                reserve_ratio: 0.12,
                securities_ratio: 0.20,
                loan_to_deposit_target: 0.756,
                net_interest_margin: 0.034,
                capital_ratio: 0.10,
                cbdc_vulnerability: 0.65,
                customer_stickiness: 0.45,
                digital_capability: 0.65,
                efficiency_ratio: 0.65,
                initial_lcr: 1.10,
                demand_share: 0.70,
            },
        }
    }
}

/// What the scheduler must apply on the bank's behalf after it steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BankStepOutcome {
    /// Adopters leaving the bank this tick, in customer-id order
    pub departures: Vec<ConsumerId>,
    /// Fractional loyalty hit for every remaining customer after a cyber incident
    pub loyalty_shock: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CommercialBank {
    pub id: BankId,
    pub bank_type: BankType,
    pub profile: BankProfile,

    // Pricing
    pub interest_rate: f64,
    pub lending_rate: f64,
    pub reserve_requirement: f64,
    /// Scales loan demand; trimmed when the bank turns conservative
    pub lending_appetite: f64,

    // Liabilities
    pub total_deposits: f64,
    pub demand_deposits: f64,
    pub time_deposits: f64,
    /// Merchant balances parked at the bank, kept outside the consumer book
    pub business_deposits: f64,
    pub borrowings: f64,

    // Assets
    pub total_loans: f64,
    pub consumer_loans: f64,
    pub commercial_loans: f64,
    pub real_estate_loans: f64,
    pub cash_reserves: f64,
    pub securities: f64,

    // Capital
    pub tier1_capital: f64,
    pub tier2_capital: f64,
    pub initial_capital: f64,
    pub initial_deposits: f64,
    pub countercyclical_buffer: f64,
    pub enhanced_capital_requirement: bool,
    pub capital_buffer_requirement: f64,
    pub capital_adequacy_ratio: f64,

    // Ratios
    pub liquidity_ratio: f64,
    pub loan_to_deposit_ratio: f64,
    pub profitability: f64,
    pub market_share: f64,
    pub customer_retention_rate: f64,
    pub liquidity_coverage_ratio: f64,
    pub net_stable_funding_ratio: f64,

    // Network position
    pub network_centrality: f64,
    pub centrality: Centrality,
    pub interbank_connections: f64,

    // Stress and operational state
    pub liquidity_stress_level: f64,
    pub liquidity_stress_flag: bool,
    pub digital_run_flag: bool,
    pub operational_capacity: f64,
    pub cyber_incident_flag: bool,
    pub cyber_losses: f64,
    pub operational_risk_score: f64,
    pub business_continuity_score: f64,
    pub third_party_risk_exposure: f64,

    // CBDC exchange tracking
    pub cbdc_related_outflows: f64,
    /// CBDC-related outflow booked during the current tick; keys settlement
    pub outflows_this_tick: f64,
    pub reserves_transferred_to_cb: f64,
    pub previous_deposits: f64,

    pub customers: BTreeSet<ConsumerId>,
}

impl CommercialBank {
    pub fn new(
        id: BankId,
        bank_type: BankType,
        interest_rate: f64,
        interbank_connections: usize,
        rng: &mut RandomStream,
    ) -> Self {
        let profile = BankProfile::for_type(bank_type);
        let mut bank = CommercialBank {
            id,
            bank_type,
            profile,
            interest_rate,
            lending_rate: interest_rate + LENDING_SPREAD,
            reserve_requirement: RESERVE_REQUIREMENT,
            lending_appetite: 1.0,
            total_deposits: 0.0,
            demand_deposits: 0.0,
            time_deposits: 0.0,
            business_deposits: 0.0,
            borrowings: 0.0,
            total_loans: 0.0,
            consumer_loans: 0.0,
            commercial_loans: 0.0,
            real_estate_loans: 0.0,
            cash_reserves: 0.0,
            securities: 0.0,
            tier1_capital: 0.0,
            tier2_capital: 0.0,
            initial_capital: 0.0,
            initial_deposits: 0.0,
            countercyclical_buffer: 0.0,
            enhanced_capital_requirement: false,
            capital_buffer_requirement: 0.0,
            capital_adequacy_ratio: 0.0,
            liquidity_ratio: 1.0,
            loan_to_deposit_ratio: 0.0,
            profitability: 0.0,
            market_share: 0.0,
            customer_retention_rate: 1.0,
            liquidity_coverage_ratio: profile.initial_lcr,
            net_stable_funding_ratio: 1.1,
            network_centrality: INITIAL_NETWORK_CENTRALITY,
            centrality: Centrality::default(),
            interbank_connections: interbank_connections as f64,
            liquidity_stress_level: 0.0,
            liquidity_stress_flag: false,
            digital_run_flag: false,
            operational_capacity: 1.0,
            cyber_incident_flag: false,
            cyber_losses: 0.0,
            operational_risk_score: 0.05,
            business_continuity_score: 0.95,
            third_party_risk_exposure: 0.1,
            cbdc_related_outflows: 0.0,
            outflows_this_tick: 0.0,
            reserves_transferred_to_cb: 0.0,
            previous_deposits: 0.0,
            customers: BTreeSet::new(),
        };
        bank.initialize_centrality(rng);
        bank
    }

    /// Noisy starting centrality around the bank type's typical position
    fn initialize_centrality(&mut self, rng: &mut RandomStream) {
        // (mean large, mean small, sd large, sd small, floor)
        let params = |m: CentralityMeasure| match m {
            CentralityMeasure::Degree => (0.85, 0.35, 0.05, 0.08, 0.05),
            CentralityMeasure::Betweenness => (0.90, 0.25, 0.03, 0.05, 0.02),
            CentralityMeasure::Closeness => (0.80, 0.45, 0.04, 0.06, 0.08),
            CentralityMeasure::Eigenvector => (0.88, 0.30, 0.04, 0.05, 0.04),
        };
        for measure in CentralityMeasure::ALL {
            let (large, small, sd_large, sd_small, floor) = params(measure);
            let value = match self.bank_type {
                BankType::Large => rng.normal(large, sd_large),
                BankType::SmallMedium => rng.normal(small, sd_small),
            };
            *self.centrality.get_mut(measure) = value.clamp(floor, 1.0);
        }
    }

    /// Calibrate the balance sheet to the deposits actually assigned at
    /// construction, so bank and consumer books agree from tick zero.
    pub fn initialize_balance_sheet(&mut self, deposits: f64) {
        let p = self.profile;
        let total_assets = ratio_or(deposits, p.deposit_ratio, 0.0);

        self.total_deposits = deposits;
        self.initial_deposits = deposits;
        self.previous_deposits = deposits;
        self.split_deposits();

        self.cash_reserves = total_assets * p.reserve_ratio;
        self.securities = total_assets * p.securities_ratio;
        self.total_loans = deposits * p.loan_to_deposit_target;
        self.split_loans();

        let capital = total_assets * p.capital_ratio;
        self.tier1_capital = capital * 0.8;
        self.tier2_capital = capital * 0.2;
        self.initial_capital = capital;
        self.borrowings = 0.0;

        self.calculate_metrics(deposits);
    }

    pub fn capital(&self) -> f64 {
        self.tier1_capital + self.tier2_capital
    }

    pub fn add_customer(&mut self, consumer: ConsumerId) {
        self.customers.insert(consumer);
    }

    pub fn remove_customer(&mut self, consumer: ConsumerId) -> bool {
        self.customers.remove(&consumer)
    }

    pub fn step(
        &mut self,
        snapshot: &TickSnapshot,
        consumers: &[Consumer],
        market_deposits: f64,
        rng: &mut RandomStream,
    ) -> BankStepOutcome {
        self.liquidity_stress_flag = false;
        self.outflows_this_tick = 0.0;

        self.update_deposits(consumers);
        self.make_loans(snapshot.cbdc_introduced);
        self.calculate_metrics(market_deposits);
        self.adjust_competitive_strategy(snapshot);
        let departures = self.handle_customer_attrition(snapshot, consumers, rng);
        self.update_network_metrics(snapshot);
        self.calculate_liquidity_stress(snapshot);

        self.assess_operational_risks();
        self.monitor_basel_compliance();
        self.manage_liquidity_risks();
        let loyalty_shock = self.respond_to_cyber_threats();
        self.update_risk_appetite(snapshot);

        BankStepOutcome {
            departures,
            loyalty_shock,
        }
    }

    /// Re-sum the deposit book from current customers.
    ///
    /// Only the part of a drop matched by customers' recorded
    /// deposit-to-CBDC conversions is booked as CBDC-related; the rest is
    /// ordinary spending.
    pub fn update_deposits(&mut self, consumers: &[Consumer]) {
        let (current, converted) = self
            .customers
            .iter()
            .filter_map(|id| consumers.get(id.0))
            .fold((0.0, 0.0), |(dep, conv), c| {
                (dep + c.holdings.bank_deposits, conv + c.flows().deposits_to_cbdc)
            });

        let outflow = (self.total_deposits - current).max(0.0);
        let cbdc_outflow = outflow.min(converted);
        self.cbdc_related_outflows += cbdc_outflow;
        self.outflows_this_tick += cbdc_outflow;

        self.previous_deposits = self.total_deposits;
        self.total_deposits = current;
        self.split_deposits();
    }

    fn split_deposits(&mut self) {
        self.demand_deposits = self.total_deposits * self.profile.demand_share;
        self.time_deposits = self.total_deposits - self.demand_deposits;
    }

    /// Lending capacity is deposits net of required reserves; loans never
    /// exceed it.
    pub fn make_loans(&mut self, cbdc_introduced: bool) {
        let available = (self.total_deposits * (1.0 - self.reserve_requirement)).max(0.0);
        let mut demand = available * LOAN_UTILIZATION * self.lending_appetite;
        if cbdc_introduced {
            demand *= CBDC_LENDING_DISCOUNT;
        }
        self.total_loans = demand.min(available);
        self.split_loans();
    }

    fn split_loans(&mut self) {
        self.consumer_loans = self.total_loans * 0.35;
        self.commercial_loans = self.total_loans * 0.40;
        self.real_estate_loans = self.total_loans - self.consumer_loans - self.commercial_loans;
    }

    pub fn calculate_metrics(&mut self, market_deposits: f64) {
        self.liquidity_ratio = ratio_or(self.cash_reserves, self.total_deposits, 1.0);
        self.loan_to_deposit_ratio = ratio_or(self.total_loans, self.total_deposits, 0.0);
        self.profitability =
            self.total_loans * self.lending_rate - self.total_deposits * self.interest_rate;
        self.market_share = ratio_or(self.total_deposits, market_deposits, 0.0);
    }

    /// Ratchet the deposit rate up under CBDC competition, never past the
    /// point where the lending spread drops under one point.
    pub fn adjust_competitive_strategy(&mut self, snapshot: &TickSnapshot) {
        if !snapshot.cbdc_introduced {
            return;
        }
        let pressure = snapshot.adoption_rate * 0.5;
        let premium = (snapshot.cbdc_interest_rate - self.interest_rate).max(0.0) * 0.8;
        let adjustment = (pressure + premium).min(MAX_RATE_INCREASE);

        let new_rate = self.interest_rate + adjustment;
        if self.lending_rate - new_rate > MIN_LENDING_SPREAD {
            self.interest_rate = new_rate;
        }
    }

    /// Pick adopters that leave this tick. The scheduler detaches them.
    pub fn handle_customer_attrition(
        &mut self,
        snapshot: &TickSnapshot,
        consumers: &[Consumer],
        rng: &mut RandomStream,
    ) -> Vec<ConsumerId> {
        if !snapshot.cbdc_introduced {
            return Vec::new();
        }
        let before = self.customers.len();
        let mut departures = Vec::new();
        for id in &self.customers {
            let adopter = consumers.get(id.0).is_some_and(|c| c.cbdc_adopter);
            if adopter && rng.chance(ATTRITION_PROBABILITY) {
                departures.push(*id);
            }
        }
        if before > 0 {
            self.customer_retention_rate = (before - departures.len()) as f64 / before as f64;
        }
        departures
    }

    fn deposit_loss_vs_capital(&self) -> f64 {
        ratio_or(
            (self.initial_capital - self.total_deposits).max(0.0),
            self.initial_capital,
            0.0,
        )
    }

    pub fn update_network_metrics(&mut self, snapshot: &TickSnapshot) {
        if !snapshot.cbdc_introduced {
            return;
        }
        let adoption = snapshot.adoption_rate;
        let customer_loss = 1.0 - self.customer_retention_rate;
        let base_impact = adoption * self.profile.cbdc_vulnerability * (1.0 + customer_loss);
        let small = self.bank_type == BankType::SmallMedium;

        let mut impact = base_impact;
        if small {
            impact *= 2.0 * (1.0 + self.deposit_loss_vs_capital());
        }
        let decay = (impact * 0.03).min(0.05);
        self.network_centrality = (self.network_centrality - decay).max(0.05);

        let multiplier = if small { 2.0 } else { 1.0 };
        // (impact weight, decay rate, max decay, floor)
        let params = |m: CentralityMeasure| match m {
            CentralityMeasure::Degree => (0.8, 0.04, 0.08, 0.05),
            CentralityMeasure::Betweenness => (1.2, 0.05, 0.10, 0.02),
            CentralityMeasure::Closeness => (0.6, 0.03, 0.06, 0.08),
            CentralityMeasure::Eigenvector => (0.9, 0.035, 0.07, 0.04),
        };
        for measure in CentralityMeasure::ALL {
            let (weight, rate, max_decay, floor) = params(measure);
            let decay = (base_impact * multiplier * weight * rate).min(max_decay);
            let value = self.centrality.get_mut(measure);
            *value = (*value - decay).max(floor).min(1.0);
        }

        if adoption > 0.2 {
            let mut connection_impact = (adoption - 0.2) * 0.15;
            if small {
                connection_impact *= 1.5;
            }
            self.interbank_connections =
                (self.interbank_connections - connection_impact * 0.1).max(0.0);
        }
    }

    /// Outflow since last tick as a share of last tick's deposits
    pub fn deposit_velocity(&self) -> f64 {
        ratio_or(
            (self.previous_deposits - self.total_deposits).max(0.0),
            self.previous_deposits,
            0.0,
        )
    }

    pub fn calculate_liquidity_stress(&mut self, snapshot: &TickSnapshot) {
        if !snapshot.cbdc_introduced {
            return;
        }
        let adoption = snapshot.adoption_rate;
        let base = adoption * self.profile.cbdc_vulnerability;
        let velocity = self.deposit_velocity() * 0.5;
        let gap = (1.0 - self.liquidity_ratio).max(0.0) * 0.3;
        let flight = (1.0 - self.customer_retention_rate) * 0.2;

        let mut stress = (base + velocity + gap + flight).min(1.0);
        if self.bank_type == BankType::SmallMedium {
            stress = (stress * (1.0 + adoption * 0.8)).min(1.0);
            // Discontinuous crisis kicker for small banks
            if stress > 0.7 && adoption > 0.4 {
                stress = (stress * 1.2).min(1.0);
            }
        }
        self.liquidity_stress_level = unit_clamp(stress);
    }

    pub fn assess_operational_risks(&mut self) {
        let mut tech_risk = 0.0;
        if self.cyber_incident_flag {
            tech_risk += 0.2;
        }
        if self.operational_capacity < 0.9 {
            tech_risk += (1.0 - self.operational_capacity) * 0.3;
        }
        self.operational_risk_score = (tech_risk + self.third_party_risk_exposure * 0.1).min(0.3);
        self.business_continuity_score = (1.0 - self.operational_risk_score).max(0.5);
    }

    pub fn risk_weighted_assets(&self) -> f64 {
        self.consumer_loans * 0.75
            + self.commercial_loans
            + self.real_estate_loans * 0.35
            + self.securities * 0.2
    }

    pub fn required_capital_ratio(&self) -> f64 {
        let mut required =
            BASE_CAPITAL_REQUIREMENT + CAPITAL_CONSERVATION_BUFFER + self.countercyclical_buffer;
        if self.enhanced_capital_requirement {
            required += self.capital_buffer_requirement;
        }
        required
    }

    /// Top up capital to the Basel III requirement, then refresh LCR/NSFR
    pub fn monitor_basel_compliance(&mut self) {
        let rwa = self.risk_weighted_assets();
        if rwa > 0.0 {
            let required = self.required_capital_ratio();
            let ratio = self.capital() / rwa;
            if ratio < required {
                let deficit = (required - ratio) * rwa;
                self.tier1_capital += deficit * 0.8;
                self.tier2_capital += deficit * 0.2;
            }
            self.capital_adequacy_ratio = self.capital() / rwa;
        }
        self.update_liquidity_ratios();
    }

    fn update_liquidity_ratios(&mut self) {
        let liquid_assets = self.cash_reserves + self.securities * 0.85;
        let net_outflows = self.total_deposits * 0.03;
        if net_outflows > 0.0 {
            self.liquidity_coverage_ratio = liquid_assets / net_outflows;
        }

        let stable_funding = self.total_deposits * 0.9 + self.borrowings * 0.5;
        let required_funding = self.consumer_loans * 0.65
            + self.commercial_loans * 0.85
            + self.real_estate_loans * 0.65
            + self.securities * 0.15;
        if required_funding > 0.0 {
            self.net_stable_funding_ratio = stable_funding / required_funding;
        }
    }

    /// Emergency borrowing on a fast outflow and an LCR buffer top-up
    pub fn manage_liquidity_risks(&mut self) {
        let velocity = self.deposit_velocity();
        if velocity > 0.1 {
            self.liquidity_stress_flag = true;
            let emergency = (velocity * self.total_deposits).min(self.cash_reserves * 0.5);
            self.borrowings += emergency;
            self.cash_reserves += emergency;
        }

        if self.liquidity_coverage_ratio < 1.1 {
            let buffer = self.total_deposits * 0.05;
            self.securities += buffer * 0.6;
            self.cash_reserves += buffer * 0.4;
            self.borrowings += buffer;
        }
    }

    /// Mark a cyber incident; the response runs in the bank's next step
    pub fn record_cyber_incident(&mut self, losses: f64, capacity_loss: f64) {
        self.cyber_incident_flag = true;
        self.cyber_losses += losses;
        self.operational_capacity = unit_clamp(self.operational_capacity * (1.0 - capacity_loss));
    }

    /// Returns the loyalty shock to apply to remaining customers
    pub fn respond_to_cyber_threats(&mut self) -> Option<f64> {
        if !self.cyber_incident_flag {
            return None;
        }
        self.operational_capacity *= 0.9;
        self.tier1_capital -= self.cyber_losses * 0.5;
        let customer_impact = (self.cyber_losses / self.total_deposits.max(1.0)).min(0.1);

        if self.operational_capacity < 0.8 {
            self.business_continuity_score *= 0.9;
            self.operational_capacity = (self.operational_capacity * 1.05).min(1.0);
        }
        self.cyber_incident_flag = false;
        self.cyber_losses = 0.0;
        Some(customer_impact)
    }

    pub fn update_risk_appetite(&mut self, snapshot: &TickSnapshot) {
        let cbdc_risk = snapshot.adoption_rate * self.profile.cbdc_vulnerability;
        let liquidity_risk = (1.1 - self.liquidity_coverage_ratio).max(0.0);
        let exposure = cbdc_risk + self.operational_risk_score + liquidity_risk;

        if exposure > 0.4 {
            self.lending_rate += 0.001;
            self.interest_rate = (self.interest_rate - 0.0005).max(0.0);
            self.lending_appetite *= 1.0 - (exposure * 0.1).min(0.05);
        } else if exposure < 0.2 {
            self.lending_rate = (self.lending_rate - 0.0005).max(0.03);
            self.interest_rate += 0.0003;
        }
        self.countercyclical_buffer = (snapshot.systemic_risk_score * 0.05).min(0.025);
    }

    /// Book a departing customer's remaining deposits: the CBDC part is a
    /// CBDC-related outflow, the banknote part is paid out of reserves.
    pub fn release_departed_deposits(&mut self, to_cbdc: f64, to_banknotes: f64) {
        self.total_deposits = (self.total_deposits - to_cbdc - to_banknotes).max(0.0);
        self.split_deposits();
        self.cbdc_related_outflows += to_cbdc;
        self.outflows_this_tick += to_cbdc;
        self.pay_out_of_reserves(to_banknotes);
        self.liquidity_ratio = ratio_or(self.cash_reserves, self.total_deposits, 1.0);
    }

    /// Pay from reserves, borrowing whatever reserves cannot cover
    fn pay_out_of_reserves(&mut self, amount: f64) -> f64 {
        let paid = amount.min(self.cash_reserves).max(0.0);
        self.cash_reserves -= paid;
        let shortfall = amount - paid;
        self.borrowings += shortfall;
        shortfall
    }

    /// Move reserves to the central bank against newly issued CBDC.
    /// Returns the part that had to be borrowed.
    pub fn transfer_reserves_to_central_bank(&mut self, amount: f64) -> f64 {
        self.reserves_transferred_to_cb += amount;
        self.pay_out_of_reserves(amount)
    }

    /// Reserves returned when CBDC is redeemed into deposits
    pub fn receive_redemption(&mut self, amount: f64) {
        self.cash_reserves += amount;
        self.reserves_transferred_to_cb -= amount;
    }

    /// Central-bank injection into reserves and tier-1 capital
    pub fn inject_emergency_liquidity(&mut self, amount: f64) {
        self.cash_reserves += amount;
        self.tier1_capital += amount;
        self.liquidity_ratio = ratio_or(self.cash_reserves, self.total_deposits, 1.0);
    }

    /// Standing-facility loan credited to reserves
    pub fn borrow_from_facility(&mut self, amount: f64) {
        self.borrowings += amount;
        self.cash_reserves += amount;
        self.liquidity_ratio = ratio_or(self.cash_reserves, self.total_deposits, 1.0);
    }

    pub fn financial_strength(&self) -> f64 {
        let liquidity = (self.liquidity_ratio / 0.2).min(1.0);
        let profitability = (self.profitability / 1000.0).clamp(0.0, 1.0);
        let stress = (1.0 - self.liquidity_stress_level).max(0.0);

        liquidity * 0.3
            + profitability * 0.3
            + self.market_share * 0.2
            + self.network_centrality * 0.1
            + stress * 0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::consumer::BehaviouralTraits;
    use crate::money::Holdings;
    use approx::assert_relative_eq;

    fn bank(bank_type: BankType) -> CommercialBank {
        let mut rng = RandomStream::seeded(1);
        CommercialBank::new(BankId(0), bank_type, 0.02, 3, &mut rng)
    }

    fn customer(id: usize, deposits: f64, adopter: bool) -> Consumer {
        let holdings = Holdings {
            bank_deposits: deposits,
            ..Holdings::default()
        };
        let mut c = Consumer::new(ConsumerId(id), holdings, BehaviouralTraits::neutral(), 0.03);
        c.primary_bank = Some(BankId(0));
        c.cbdc_adopter = adopter;
        c
    }

    fn live(adoption_rate: f64) -> TickSnapshot {
        TickSnapshot {
            cbdc_introduced: true,
            adoption_rate,
            cbdc_interest_rate: 0.01,
            ..TickSnapshot::default()
        }
    }

    #[test]
    fn zero_deposits_report_full_liquidity() {
        let mut b = bank(BankType::SmallMedium);
        b.initialize_balance_sheet(0.0);
        b.calculate_metrics(0.0);

        assert_eq!(b.liquidity_ratio, 1.0);
        assert_eq!(b.loan_to_deposit_ratio, 0.0);
        assert_eq!(b.market_share, 0.0);
    }

    #[test]
    fn balance_sheet_follows_calibration() {
        let mut b = bank(BankType::Large);
        b.initialize_balance_sheet(75_000.0);

        // Assets = 75_000 / 0.75
        assert_relative_eq!(b.cash_reserves, 15_000.0, epsilon = 1e-9);
        assert_relative_eq!(b.securities, 25_000.0, epsilon = 1e-9);
        assert_relative_eq!(b.total_loans, 75_000.0 * 0.733, epsilon = 1e-9);
        assert_relative_eq!(b.capital(), 12_000.0, epsilon = 1e-9);
        assert_relative_eq!(b.demand_deposits, 45_000.0, epsilon = 1e-9);
        assert_relative_eq!(b.liquidity_ratio, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn loans_never_exceed_lending_capacity() {
        let mut b = bank(BankType::SmallMedium);
        b.initialize_balance_sheet(10_000.0);
        b.lending_appetite = 5.0;
        b.make_loans(false);

        assert!(b.total_loans <= b.total_deposits * (1.0 - b.reserve_requirement) + 1e-9);
        assert_relative_eq!(
            b.consumer_loans + b.commercial_loans + b.real_estate_loans,
            b.total_loans,
            epsilon = 1e-9
        );
    }

    #[test]
    fn competitive_ratchet_keeps_spread() {
        let mut b = bank(BankType::Large);
        b.lending_rate = 0.05;
        let snapshot = live(0.5);

        for _ in 0..10 {
            let before = b.interest_rate;
            b.adjust_competitive_strategy(&snapshot);
            assert!(b.interest_rate >= before, "rate fell from {}", before);
            assert!(b.lending_rate - b.interest_rate > MIN_LENDING_SPREAD - 1e-12);
        }
        // 0.02 -> 0.035 in one step, then blocked by the spread rule
        assert_relative_eq!(b.interest_rate, 0.035, epsilon = 1e-12);
    }

    #[test]
    fn deposit_drop_only_counts_conversions_as_cbdc_outflow() {
        let mut b = bank(BankType::Large);
        let mut consumers = vec![customer(0, 1000.0, false), customer(1, 1000.0, false)];
        b.add_customer(ConsumerId(0));
        b.add_customer(ConsumerId(1));
        b.initialize_balance_sheet(2000.0);

        // Spending alone is not CBDC flight
        consumers[0].holdings.bank_deposits = 800.0;
        b.update_deposits(&consumers);
        assert_relative_eq!(b.total_deposits, 1800.0);
        assert_eq!(b.cbdc_related_outflows, 0.0);
        assert_relative_eq!(b.deposit_velocity(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn attrition_only_picks_adopters() {
        let mut b = bank(BankType::SmallMedium);
        let consumers: Vec<Consumer> = (0..200).map(|i| customer(i, 100.0, i % 2 == 0)).collect();
        for c in &consumers {
            b.add_customer(c.id);
        }
        let mut rng = RandomStream::seeded(5);
        let departures = b.handle_customer_attrition(&live(0.5), &consumers, &mut rng);

        assert!(!departures.is_empty());
        assert!(departures.iter().all(|id| id.0 % 2 == 0));
        let expected = (200 - departures.len()) as f64 / 200.0;
        assert_relative_eq!(b.customer_retention_rate, expected);
    }

    #[test]
    fn no_attrition_before_introduction() {
        let mut b = bank(BankType::SmallMedium);
        let consumers = vec![customer(0, 100.0, true)];
        b.add_customer(ConsumerId(0));
        let mut rng = RandomStream::seeded(5);
        let departures =
            b.handle_customer_attrition(&TickSnapshot::default(), &consumers, &mut rng);
        assert!(departures.is_empty());
    }

    #[test]
    fn centrality_decays_but_stays_floored() {
        let mut b = bank(BankType::SmallMedium);
        b.initialize_balance_sheet(100.0);
        b.customer_retention_rate = 0.5;
        let snapshot = live(1.0);
        for _ in 0..500 {
            b.update_network_metrics(&snapshot);
        }

        assert_relative_eq!(b.centrality.degree, 0.05);
        assert_relative_eq!(b.centrality.betweenness, 0.02);
        assert_relative_eq!(b.centrality.closeness, 0.08);
        assert_relative_eq!(b.centrality.eigenvector, 0.04);
        assert_relative_eq!(b.network_centrality, 0.05);
        assert_eq!(b.interbank_connections, 0.0);
    }

    #[test]
    fn small_banks_lose_betweenness_faster_than_large() {
        let mut large = bank(BankType::Large);
        let mut small = bank(BankType::SmallMedium);
        large.centrality.betweenness = 0.8;
        small.centrality.betweenness = 0.8;
        let snapshot = live(0.4);

        large.update_network_metrics(&snapshot);
        small.update_network_metrics(&snapshot);

        assert!(0.8 - small.centrality.betweenness > 0.8 - large.centrality.betweenness);
    }

    #[test]
    fn small_bank_stress_escalates_in_crisis() {
        let mut small = bank(BankType::SmallMedium);
        small.liquidity_ratio = 0.0;
        small.customer_retention_rate = 0.2;
        small.calculate_liquidity_stress(&live(0.5));

        let mut large = bank(BankType::Large);
        large.liquidity_ratio = 0.0;
        large.customer_retention_rate = 0.2;
        large.calculate_liquidity_stress(&live(0.5));

        assert!(small.liquidity_stress_level > large.liquidity_stress_level);
        assert!(small.liquidity_stress_level <= 1.0);
    }

    #[test]
    fn basel_shortfall_is_topped_up() {
        let mut b = bank(BankType::Large);
        b.initialize_balance_sheet(100_000.0);
        b.tier1_capital = 0.0;
        b.tier2_capital = 0.0;
        b.monitor_basel_compliance();

        assert_relative_eq!(
            b.capital_adequacy_ratio,
            b.required_capital_ratio(),
            epsilon = 1e-9
        );
        assert_relative_eq!(b.tier1_capital, 4.0 * b.tier2_capital, epsilon = 1e-6);
    }

    #[test]
    fn cyber_response_charges_capital_and_resets() {
        let mut b = bank(BankType::Large);
        b.initialize_balance_sheet(10_000.0);
        let tier1 = b.tier1_capital;
        b.record_cyber_incident(400.0, 0.1);

        let shock = b.respond_to_cyber_threats();
        assert_eq!(shock, Some(0.04));
        assert_relative_eq!(b.tier1_capital, tier1 - 200.0);
        assert!(!b.cyber_incident_flag);
        assert_eq!(b.respond_to_cyber_threats(), None);
    }

    #[test]
    fn reserve_shortfall_is_borrowed() {
        let mut b = bank(BankType::Large);
        b.cash_reserves = 100.0;
        let shortfall = b.transfer_reserves_to_central_bank(150.0);

        assert_relative_eq!(shortfall, 50.0);
        assert_eq!(b.cash_reserves, 0.0);
        assert_relative_eq!(b.borrowings, 50.0);
        assert_relative_eq!(b.reserves_transferred_to_cb, 150.0);
    }

    #[test]
    fn departed_deposits_leave_the_book() {
        let mut b = bank(BankType::Large);
        b.initialize_balance_sheet(1000.0);
        let cash = b.cash_reserves;
        b.release_departed_deposits(300.0, 100.0);

        assert_relative_eq!(b.total_deposits, 600.0);
        assert_relative_eq!(b.cbdc_related_outflows, 300.0);
        assert_relative_eq!(b.outflows_this_tick, 300.0);
        assert_relative_eq!(b.cash_reserves, cash - 100.0);
    }
}
