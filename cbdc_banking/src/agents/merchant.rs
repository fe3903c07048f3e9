//! Merchant agent
//!
//! Merchants receive consumer payments in every instrument they accept,
//! decide once whether to start accepting CBDC, and sweep part of their
//! takings to a primary bank as business deposits.

use serde::{Deserialize, Serialize};

use super::ratio_or;
use crate::money::{BankId, MerchantId, PaymentMethod};
use crate::random::RandomStream;
use crate::snapshot::{MerchantView, TickSnapshot};

/// Per-transaction processing cost by instrument, before adjustments
const BASE_PAYMENT_COSTS: [f64; 4] = [0.005, 0.025, 0.015, 0.002];
const INITIAL_REVENUE: f64 = 5000.0;
const CASH_SWEEP_SHARE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    Retail,
    Restaurant,
    Online,
    Utility,
    Grocery,
}

impl BusinessType {
    pub const ALL: [BusinessType; 5] = [
        BusinessType::Retail,
        BusinessType::Restaurant,
        BusinessType::Online,
        BusinessType::Utility,
        BusinessType::Grocery,
    ];

    /// (payments per tick, average size, size spread)
    fn transaction_pattern(self) -> (f64, f64, f64) {
        match self {
            BusinessType::Retail => (50.0, 85.0, 40.0),
            BusinessType::Restaurant => (80.0, 45.0, 25.0),
            BusinessType::Online => (30.0, 120.0, 80.0),
            BusinessType::Utility => (200.0, 150.0, 50.0),
            BusinessType::Grocery => (120.0, 65.0, 30.0),
        }
    }

    fn adoption_multiplier(self) -> f64 {
        match self {
            BusinessType::Online => 1.8,
            BusinessType::Retail => 1.2,
            BusinessType::Restaurant => 1.0,
            BusinessType::Grocery => 1.1,
            BusinessType::Utility => 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessSize {
    Small,
    Medium,
    Large,
}

impl BusinessSize {
    fn volume_multiplier(self) -> f64 {
        match self {
            BusinessSize::Small => 0.5,
            BusinessSize::Medium => 1.0,
            BusinessSize::Large => 2.5,
        }
    }

    fn adoption_multiplier(self) -> f64 {
        match self {
            BusinessSize::Small => 0.8,
            BusinessSize::Medium => 1.0,
            BusinessSize::Large => 1.5,
        }
    }

    fn network_weight(self) -> f64 {
        match self {
            BusinessSize::Small => 0.3,
            BusinessSize::Medium => 0.6,
            BusinessSize::Large => 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BusinessProfile {
    pub business_type: BusinessType,
    pub size: BusinessSize,
    pub monthly_revenue: f64,
    pub tick_transactions: usize,
    pub avg_transaction_size: f64,
    pub total_payment_volume: f64,
    pub cbdc_share: f64,
    pub card_share: f64,
    pub cash_share: f64,
    pub bank_transfer_share: f64,
    pub technology_adoption_rate: f64,
    pub network_centrality: f64,
}

#[derive(Debug, Clone)]
pub struct Merchant {
    pub id: MerchantId,
    pub business_type: BusinessType,
    pub size: BusinessSize,
    pub primary_bank: Option<BankId>,

    pub cash_balance: f64,
    pub bank_balance: f64,
    pub cbdc_balance: f64,
    pub processing_costs: f64,

    pub accepts_cbdc: bool,
    pub cbdc_adoption_step: Option<usize>,
    /// `None` for instruments the merchant cannot take
    pub payment_costs: [Option<f64>; 4],
    pub payment_preferences: [f64; 4],
    pub technology_adoption_rate: f64,
    pub customer_payment_influence: f64,

    pub expected_transactions: f64,
    pub avg_transaction_size: f64,
    pub transaction_variance: f64,

    /// Cumulative received volume by instrument
    pub payment_volumes: [f64; 4],
    tick_volumes: [f64; 4],
    tick_transactions: usize,

    pub monthly_revenue: f64,
    pub network_centrality: f64,
    pub customer_connections: usize,
}

impl Merchant {
    pub fn new(
        id: MerchantId,
        business_type: BusinessType,
        size: BusinessSize,
        primary_bank: Option<BankId>,
    ) -> Self {
        let (count, avg, variance) = business_type.transaction_pattern();
        let multiplier = size.volume_multiplier();
        let mut merchant = Merchant {
            id,
            business_type,
            size,
            primary_bank,
            cash_balance: 0.0,
            bank_balance: 0.0,
            cbdc_balance: 0.0,
            processing_costs: 0.0,
            accepts_cbdc: false,
            cbdc_adoption_step: None,
            payment_costs: [None; 4],
            payment_preferences: [0.0; 4],
            technology_adoption_rate: 0.3,
            customer_payment_influence: 0.4,
            expected_transactions: (count * multiplier).floor(),
            avg_transaction_size: avg * multiplier,
            transaction_variance: variance,
            payment_volumes: [0.0; 4],
            tick_volumes: [0.0; 4],
            tick_transactions: 0,
            monthly_revenue: INITIAL_REVENUE,
            network_centrality: 0.1,
            customer_connections: 0,
        };
        merchant.setup_payment_costs();
        merchant.update_preferences();
        merchant
    }

    /// Costs and technology appetite from size and business type
    fn setup_payment_costs(&mut self) {
        let (scale, tech) = match self.size {
            BusinessSize::Large => (0.7, 0.8),
            BusinessSize::Medium => (0.85, 0.5),
            BusinessSize::Small => (1.0, 0.2),
        };
        let mut costs = BASE_PAYMENT_COSTS.map(|c| Some(c * scale));
        self.technology_adoption_rate = tech;

        let cash = PaymentMethod::Cash.index();
        let cbdc = PaymentMethod::Cbdc.index();
        match self.business_type {
            BusinessType::Online => {
                costs[cash] = None;
                costs[cbdc] = costs[cbdc].map(|c| c * 0.5);
                self.technology_adoption_rate = 0.9;
            }
            BusinessType::Grocery => {
                costs = costs.map(|c| c.map(|c| c * 1.2));
                costs[cash] = costs[cash].map(|c| c * 0.7);
            }
            BusinessType::Restaurant => {
                costs[cash] = costs[cash].map(|c| c * 0.8);
            }
            BusinessType::Retail | BusinessType::Utility => {}
        }
        self.payment_costs = costs;
    }

    /// Cheaper instruments score higher: `1 - cost / max_cost`
    fn update_preferences(&mut self) {
        let max_cost = self
            .payment_costs
            .iter()
            .flatten()
            .fold(0.0_f64, |acc, c| acc.max(*c));
        self.payment_preferences = self
            .payment_costs
            .map(|cost| cost.map_or(0.0, |c| 1.0 - ratio_or(c, max_cost, 0.0)));
    }

    pub fn accepts(&self, method: PaymentMethod) -> bool {
        match method {
            PaymentMethod::Cbdc => self.accepts_cbdc,
            other => self.payment_costs[other.index()].is_some(),
        }
    }

    pub fn view(&self) -> MerchantView {
        MerchantView {
            accepts_cbdc: self.accepts_cbdc,
            online: self.business_type == BusinessType::Online,
            preferences: self.payment_preferences,
            avg_transaction_size: self.avg_transaction_size,
            transaction_variance: self.transaction_variance,
        }
    }

    /// Credit a consumer payment to the balance for its instrument
    pub fn receive_payment(&mut self, method: PaymentMethod, amount: f64) {
        match method {
            PaymentMethod::Cash => self.cash_balance += amount,
            PaymentMethod::Card | PaymentMethod::BankTransfer => self.bank_balance += amount,
            PaymentMethod::Cbdc => self.cbdc_balance += amount,
        }
        let cost = self.payment_costs[method.index()].unwrap_or(0.0);
        self.processing_costs += amount * cost;
        self.tick_volumes[method.index()] += amount;
        self.tick_transactions += 1;
    }

    pub fn step(&mut self, snapshot: &TickSnapshot, rng: &mut RandomStream) {
        self.consider_cbdc_adoption(snapshot, rng);
        self.update_business_metrics(snapshot);
        self.manage_business_banking();
        self.adapt_payment_strategy(snapshot, rng);
        self.update_network_position();
        self.close_tick();
    }

    pub fn adoption_probability(&self, snapshot: &TickSnapshot) -> f64 {
        let pressure = snapshot.adoption_rate * self.customer_payment_influence;
        (self.technology_adoption_rate + pressure)
            * self.business_type.adoption_multiplier()
            * self.size.adoption_multiplier()
    }

    fn consider_cbdc_adoption(&mut self, snapshot: &TickSnapshot, rng: &mut RandomStream) {
        if self.accepts_cbdc || !snapshot.cbdc_introduced {
            return;
        }
        if rng.chance(self.adoption_probability(snapshot)) {
            self.accepts_cbdc = true;
            self.cbdc_adoption_step = Some(snapshot.tick);
        }
    }

    /// Revenue follows economic conditions plus a small CBDC efficiency gain
    fn update_business_metrics(&mut self, snapshot: &TickSnapshot) {
        let gain = if snapshot.cbdc_introduced {
            self.payment_method_share(PaymentMethod::Cbdc) * 0.02
        } else {
            0.0
        };
        let takings: f64 = self.tick_volumes.iter().sum();
        let base = INITIAL_REVENUE.max(takings * 30.0);
        self.monthly_revenue = base * snapshot.economic_conditions * (1.0 + gain);
    }

    /// Sweep a slice of till cash into the bank account
    fn manage_business_banking(&mut self) {
        if self.primary_bank.is_none() {
            return;
        }
        let sweep = self.cash_balance * CASH_SWEEP_SHARE;
        self.cash_balance -= sweep;
        self.bank_balance += sweep;
    }

    fn adapt_payment_strategy(&mut self, snapshot: &TickSnapshot, rng: &mut RandomStream) {
        if !snapshot.cbdc_introduced {
            return;
        }
        if snapshot.adoption_rate > 0.3 && rng.chance(0.05) {
            self.technology_adoption_rate = (self.technology_adoption_rate * 1.05).min(0.95);
            let cbdc = PaymentMethod::Cbdc.index();
            if let Some(cost) = self.payment_costs[cbdc] {
                if cost > 0.001 {
                    self.payment_costs[cbdc] = Some(cost * 0.98);
                }
            }
        }
        self.update_preferences();
    }

    fn update_network_position(&mut self) {
        let volume: f64 = self.tick_volumes.iter().sum();
        let volume_factor = (volume / 10_000.0).min(1.0);
        let customer_factor = (self.tick_transactions as f64 / 100.0).min(1.0);
        self.network_centrality =
            volume_factor * 0.4 + customer_factor * 0.4 + self.size.network_weight() * 0.2;
        self.customer_connections = self.tick_transactions;
    }

    pub fn total_volume(&self) -> f64 {
        self.payment_volumes.iter().sum()
    }

    /// Share of cumulative received volume in `method`; 0.0 before any sale
    pub fn payment_method_share(&self, method: PaymentMethod) -> f64 {
        let current = self.payment_volumes[method.index()] + self.tick_volumes[method.index()];
        let total = self.total_volume() + self.tick_volumes.iter().sum::<f64>();
        ratio_or(current, total, 0.0)
    }

    /// Fold this tick's takings into the cumulative volumes
    fn close_tick(&mut self) {
        for (total, tick) in self.payment_volumes.iter_mut().zip(self.tick_volumes) {
            *total += tick;
        }
        self.tick_volumes = [0.0; 4];
        self.tick_transactions = 0;
    }

    pub fn business_profile(&self) -> BusinessProfile {
        BusinessProfile {
            business_type: self.business_type,
            size: self.size,
            monthly_revenue: self.monthly_revenue,
            tick_transactions: self.customer_connections,
            avg_transaction_size: self.avg_transaction_size,
            total_payment_volume: self.total_volume(),
            cbdc_share: self.payment_method_share(PaymentMethod::Cbdc),
            card_share: self.payment_method_share(PaymentMethod::Card),
            cash_share: self.payment_method_share(PaymentMethod::Cash),
            bank_transfer_share: self.payment_method_share(PaymentMethod::BankTransfer),
            technology_adoption_rate: self.technology_adoption_rate,
            network_centrality: self.network_centrality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn live(adoption_rate: f64) -> TickSnapshot {
        TickSnapshot {
            tick: 12,
            cbdc_introduced: true,
            adoption_rate,
            ..TickSnapshot::default()
        }
    }

    #[test]
    fn online_merchants_cannot_take_cash() {
        let m = Merchant::new(MerchantId(0), BusinessType::Online, BusinessSize::Small, None);

        assert!(!m.accepts(PaymentMethod::Cash));
        assert_eq!(m.payment_preferences[PaymentMethod::Cash.index()], 0.0);
        assert_relative_eq!(m.technology_adoption_rate, 0.9);
        assert_relative_eq!(m.payment_costs[PaymentMethod::Cbdc.index()].unwrap_or(0.0), 0.001);
    }

    #[test]
    fn cheapest_instrument_is_preferred() {
        let m = Merchant::new(MerchantId(0), BusinessType::Retail, BusinessSize::Medium, None);
        let prefs = m.payment_preferences;

        // Card is the most expensive and scores zero
        assert_relative_eq!(prefs[PaymentMethod::Card.index()], 0.0);
        assert!(prefs[PaymentMethod::Cbdc.index()] > prefs[PaymentMethod::Cash.index()]);
        assert!(prefs[PaymentMethod::Cash.index()] > prefs[PaymentMethod::BankTransfer.index()]);
    }

    #[test]
    fn size_scales_ticket_and_volume() {
        let small = Merchant::new(MerchantId(0), BusinessType::Grocery, BusinessSize::Small, None);
        let large = Merchant::new(MerchantId(1), BusinessType::Grocery, BusinessSize::Large, None);

        assert_relative_eq!(small.avg_transaction_size, 32.5);
        assert_relative_eq!(large.avg_transaction_size, 162.5);
        assert_eq!(large.expected_transactions, 300.0);
    }

    #[test]
    fn no_adoption_before_introduction() {
        let mut m = Merchant::new(MerchantId(0), BusinessType::Online, BusinessSize::Large, None);
        let mut rng = RandomStream::seeded(2);
        for _ in 0..50 {
            m.step(&TickSnapshot::default(), &mut rng);
        }
        assert!(!m.accepts_cbdc);
    }

    #[test]
    fn adoption_is_irreversible() {
        let mut m = Merchant::new(MerchantId(0), BusinessType::Online, BusinessSize::Large, None);
        let mut rng = RandomStream::seeded(2);
        // Probability exceeds one for a large online merchant
        m.step(&live(0.0), &mut rng);
        assert!(m.accepts_cbdc);
        assert_eq!(m.cbdc_adoption_step, Some(12));

        for _ in 0..20 {
            m.step(&live(0.9), &mut rng);
            assert!(m.accepts_cbdc);
        }
        assert_eq!(m.cbdc_adoption_step, Some(12));
    }

    #[test]
    fn receipts_land_in_matching_balance() {
        let mut m = Merchant::new(
            MerchantId(0),
            BusinessType::Retail,
            BusinessSize::Small,
            Some(BankId(1)),
        );
        m.receive_payment(PaymentMethod::Cash, 100.0);
        m.receive_payment(PaymentMethod::Card, 50.0);
        m.receive_payment(PaymentMethod::Cbdc, 25.0);

        assert_relative_eq!(m.cash_balance, 100.0);
        assert_relative_eq!(m.bank_balance, 50.0);
        assert_relative_eq!(m.cbdc_balance, 25.0);
        assert_relative_eq!(m.payment_method_share(PaymentMethod::Cash), 100.0 / 175.0);
        assert_relative_eq!(
            m.processing_costs,
            100.0 * 0.005 + 50.0 * 0.025 + 25.0 * 0.002,
            epsilon = 1e-12
        );

        m.step(&TickSnapshot::default(), &mut RandomStream::seeded(0));
        // A tenth of the till is swept to the bank
        assert_relative_eq!(m.cash_balance, 90.0);
        assert_relative_eq!(m.bank_balance, 60.0);
        assert_relative_eq!(m.total_volume(), 175.0);
    }
}
