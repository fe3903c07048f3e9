//! Consumer agent
//!
//! Consumers hold money in three tiers (deposits at their primary bank,
//! banknotes, CBDC) plus illiquid other assets. Each tick they earn income,
//! pay merchants and peers, consider adopting the CBDC and, once adopted,
//! drift their deposit/CBDC split toward a preferred ratio.
//!
//! Every movement of money is recorded in [`TickFlows`], so a consumer's
//! wealth change over a tick always equals
//! `income - spending - losses + transfers_in`.

use serde::Serialize;

use crate::money::{BankId, CbdcLimits, ConsumerId, Holdings, MerchantId, PaymentMethod};
use crate::money::{MoneyTier, TransactionLedger};
use crate::random::RandomStream;
use crate::snapshot::{MerchantView, PeerView, TickSnapshot};

pub const MAX_CBDC_PREFERENCE: f64 = 0.9;
const PEER_PAYMENT_MEAN: f64 = 60.0;
const PEER_PAYMENT_SD: f64 = 30.0;
const MIN_PAYMENT: f64 = 1.0;
const REBALANCE_SPEED: f64 = 0.1;
const MOMENTUM_RAMP_STEPS: f64 = 12.0;
const STRESS_ADOPTION_WEIGHT: f64 = 0.05;

/// Behavioural parameters drawn once at creation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BehaviouralTraits {
    pub risk_aversion: f64,
    pub bank_loyalty: f64,
    pub interest_sensitivity: f64,
    pub convenience_preference: f64,
    pub social_influence_weight: f64,
    pub spending_rate: f64,
    pub income_rate: f64,
}

impl BehaviouralTraits {
    pub fn draw(rng: &mut RandomStream) -> Self {
        BehaviouralTraits {
            risk_aversion: rng.bounded_normal(0.5, 0.2, 0.1, 0.9),
            bank_loyalty: rng.bounded_normal(0.7, 0.2, 0.1, 0.95),
            interest_sensitivity: rng.bounded_normal(0.5, 0.2, 0.1, 0.9),
            convenience_preference: rng.bounded_normal(0.5, 0.2, 0.1, 0.9),
            social_influence_weight: rng.bounded_normal(0.3, 0.1, 0.0, 0.6),
            spending_rate: rng.bounded_normal(0.02, 0.005, 0.01, 0.05),
            income_rate: rng.bounded_normal(0.015, 0.005, 0.01, 0.03),
        }
    }

    /// Every trait at its population mean
    pub fn neutral() -> Self {
        BehaviouralTraits {
            risk_aversion: 0.5,
            bank_loyalty: 0.7,
            interest_sensitivity: 0.5,
            convenience_preference: 0.5,
            social_influence_weight: 0.3,
            spending_rate: 0.02,
            income_rate: 0.015,
        }
    }
}

/// Money moved during the current tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TickFlows {
    pub income: f64,
    pub spending: f64,
    pub losses: f64,
    pub transfers_in: f64,
    pub deposits_to_cbdc: f64,
    pub banknotes_to_cbdc: f64,
    pub cbdc_to_deposits: f64,
    /// Consumer-initiated funding into CBDC, counted against the transfer cap
    pub cbdc_funded: f64,
    pub cbdc_redeemed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payee {
    Merchant(MerchantId),
    Consumer(ConsumerId),
}

/// A payment made during the consumer stage, credited to the payee after
/// every consumer has stepped
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Payment {
    pub payer: ConsumerId,
    pub payee: Payee,
    pub method: PaymentMethod,
    pub amount: f64,
}

/// Everything a consumer reads or writes besides itself
pub struct ConsumerContext<'a> {
    pub snapshot: &'a TickSnapshot,
    pub limits: &'a CbdcLimits,
    pub transactions_per_step: f64,
    pub peer_payment_share: f64,
    pub rng: &'a mut RandomStream,
    pub ledger: &'a mut TransactionLedger,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinancialProfile {
    pub total_wealth: f64,
    pub liquid_assets: f64,
    pub bank_deposits: f64,
    pub banknotes: f64,
    pub cbdc_holdings: f64,
    pub cbdc_ratio: f64,
    pub cbdc_adopter: bool,
    pub adoption_step: Option<usize>,
    pub risk_aversion: f64,
    pub bank_loyalty: f64,
    pub interest_sensitivity: f64,
}

#[derive(Debug, Clone)]
pub struct Consumer {
    pub id: ConsumerId,
    pub initial_wealth: f64,
    pub holdings: Holdings,
    pub traits: BehaviouralTraits,
    pub base_adoption_probability: f64,
    pub cbdc_available: bool,
    /// One-way: never reset once set
    pub cbdc_adopter: bool,
    pub adoption_step: Option<usize>,
    pub primary_bank: Option<BankId>,
    pub cyber_victim: bool,
    flows: TickFlows,
}

impl Consumer {
    pub fn new(
        id: ConsumerId,
        holdings: Holdings,
        traits: BehaviouralTraits,
        base_adoption_probability: f64,
    ) -> Self {
        Consumer {
            id,
            initial_wealth: holdings.total(),
            holdings,
            traits,
            base_adoption_probability,
            cbdc_available: false,
            cbdc_adopter: false,
            adoption_step: None,
            primary_bank: None,
            cyber_victim: false,
            flows: TickFlows::default(),
        }
    }

    pub fn wealth(&self) -> f64 {
        self.holdings.total()
    }

    pub fn flows(&self) -> &TickFlows {
        &self.flows
    }

    pub fn is_banked(&self) -> bool {
        self.primary_bank.is_some()
    }

    fn steps_since_adoption(&self, tick: usize) -> usize {
        self.adoption_step.map_or(0, |step| tick.saturating_sub(step))
    }

    fn funding_room(&self, limits: &CbdcLimits, tick: usize) -> f64 {
        limits.funding_room(
            self.holdings.cbdc,
            self.flows.cbdc_funded,
            self.steps_since_adoption(tick),
        )
    }

    pub fn step(&mut self, ctx: &mut ConsumerContext<'_>) -> Vec<Payment> {
        self.flows = TickFlows::default();
        self.cyber_victim = false;

        let payments = self.economic_activity(ctx);
        if self.cbdc_available && !self.cbdc_adopter {
            self.consider_cbdc_adoption(ctx.snapshot, ctx.limits, ctx.rng);
        }
        if self.cbdc_adopter {
            self.rebalance_portfolio(ctx.snapshot, ctx.limits);
        }
        self.update_banking_relationship(ctx.rng);
        payments
    }

    /// Income credit, payments, then any unspent budget drawn down
    /// proportionally across the liquid tiers
    fn economic_activity(&mut self, ctx: &mut ConsumerContext<'_>) -> Vec<Payment> {
        let income = self.initial_wealth * self.traits.income_rate;
        self.receive_income(income, ctx.snapshot, ctx.limits);

        let budget = (self.wealth() * self.traits.spending_rate).min(self.holdings.liquid());
        let payments = self.execute_transactions(budget, ctx);
        let paid: f64 = payments.iter().map(|p| p.amount).sum();
        let drawn = self.holdings.draw_down_proportionally(budget - paid);
        self.flows.spending += paid + drawn;
        payments
    }

    fn receive_income(&mut self, income: f64, snapshot: &TickSnapshot, limits: &CbdcLimits) {
        self.flows.income += income;
        let mut rest = income;
        if self.cbdc_adopter {
            let wanted = if self.is_banked() {
                income * self.cbdc_preference(snapshot)
            } else {
                income
            };
            let to_cbdc = wanted.min(self.funding_room(limits, snapshot.tick)).max(0.0);
            self.holdings.cbdc += to_cbdc;
            self.flows.cbdc_funded += to_cbdc;
            rest -= to_cbdc;
        }
        if self.is_banked() {
            self.holdings.bank_deposits += rest;
        } else {
            self.holdings.banknotes += rest;
        }
    }

    fn execute_transactions(
        &mut self,
        budget: f64,
        ctx: &mut ConsumerContext<'_>,
    ) -> Vec<Payment> {
        let mut payments = Vec::new();
        if budget < MIN_PAYMENT {
            return payments;
        }
        let snapshot = ctx.snapshot;
        let has_peers = snapshot.peers.len() > 1;
        let count = ctx.rng.poisson(ctx.transactions_per_step);
        let mut remaining = budget;

        for _ in 0..count {
            if remaining < MIN_PAYMENT {
                break;
            }
            let to_peer = has_peers
                && (snapshot.merchants.is_empty() || ctx.rng.chance(ctx.peer_payment_share));

            let (payee, amount, method) = if to_peer {
                let Some(peer) = self.pick_peer(snapshot.peers.len(), ctx.rng) else {
                    break;
                };
                let amount = ctx
                    .rng
                    .normal(PEER_PAYMENT_MEAN, PEER_PAYMENT_SD)
                    .clamp(MIN_PAYMENT, remaining);
                let method = self.peer_method(&snapshot.peers[peer.0], amount);
                (Payee::Consumer(peer), amount, method)
            } else {
                let Some(index) = ctx.rng.index(snapshot.merchants.len()) else {
                    break;
                };
                let merchant = &snapshot.merchants[index];
                let amount = ctx
                    .rng
                    .normal(merchant.avg_transaction_size, merchant.transaction_variance)
                    .clamp(MIN_PAYMENT, remaining);
                let method = self.merchant_method(merchant, amount, snapshot, ctx.rng);
                (Payee::Merchant(MerchantId(index)), amount, method)
            };

            let Some(method) = method else {
                continue;
            };
            *self.holdings.balance_mut(method.tier()) -= amount;
            ctx.ledger.record(method, amount);
            remaining -= amount;
            payments.push(Payment {
                payer: self.id,
                payee,
                method,
                amount,
            });
        }
        payments
    }

    fn pick_peer(&self, population: usize, rng: &mut RandomStream) -> Option<ConsumerId> {
        // Draw from everyone but ourselves
        let draw = rng.index(population.checked_sub(1)?)?;
        let index = if draw >= self.id.0 { draw + 1 } else { draw };
        Some(ConsumerId(index))
    }

    fn can_pay(&self, method: PaymentMethod, amount: f64) -> bool {
        let funded = self.holdings.balance(method.tier()) >= amount;
        match method.tier() {
            MoneyTier::Deposits => funded && self.is_banked(),
            MoneyTier::Cbdc => funded && self.cbdc_adopter,
            MoneyTier::Banknotes => funded,
        }
    }

    /// Weighted pick over the instruments both sides can use.
    ///
    /// Small tickets lean to cash, large ones to transfers and CBDC; CBDC
    /// gains weight with adoption and the payer's taste for convenience.
    fn merchant_method(
        &self,
        merchant: &MerchantView,
        amount: f64,
        snapshot: &TickSnapshot,
        rng: &mut RandomStream,
    ) -> Option<PaymentMethod> {
        let cash = PaymentMethod::Cash.index();
        let card = PaymentMethod::Card.index();
        let transfer = PaymentMethod::BankTransfer.index();
        let cbdc = PaymentMethod::Cbdc.index();

        let mut weights = merchant.preferences;
        if amount < 20.0 {
            weights[cash] *= 1.5;
            weights[card] *= 0.7;
        } else if amount > 200.0 {
            weights[transfer] *= 1.3;
            weights[cbdc] *= 1.2;
        }
        if snapshot.cbdc_introduced {
            let a = snapshot.adoption_rate;
            weights[cbdc] = weights[cbdc] * (1.0 + 2.0 * a) + 0.4 * a;
            weights[cbdc] *= 0.5 + self.traits.convenience_preference;
        }

        for method in PaymentMethod::ALL {
            let usable = match method {
                PaymentMethod::Cash => !merchant.online,
                PaymentMethod::Cbdc => {
                    merchant.accepts_cbdc && rng.chance(snapshot.cbdc_operational_capacity)
                }
                PaymentMethod::Card | PaymentMethod::BankTransfer => true,
            };
            if !usable || !self.can_pay(method, amount) {
                weights[method.index()] = 0.0;
            }
        }
        rng.weighted_index(&weights).map(|i| PaymentMethod::ALL[i])
    }

    fn peer_method(&self, peer: &PeerView, amount: f64) -> Option<PaymentMethod> {
        if peer.adopter && self.can_pay(PaymentMethod::Cbdc, amount) {
            Some(PaymentMethod::Cbdc)
        } else if peer.banked && self.can_pay(PaymentMethod::BankTransfer, amount) {
            Some(PaymentMethod::BankTransfer)
        } else if self.can_pay(PaymentMethod::Cash, amount) {
            Some(PaymentMethod::Cash)
        } else {
            None
        }
    }

    /// Per-tick adoption probability given the shared snapshot
    pub fn adoption_probability(&self, snapshot: &TickSnapshot) -> f64 {
        let t = &self.traits;
        // Network effect and central-bank policy reach adoption only through
        // this multiplier on the base probability.
        let mut p = self.base_adoption_probability * snapshot.attractiveness_factor;

        if let Some(bank) = self.primary_bank.and_then(|id| snapshot.bank(id)) {
            let advantage = snapshot.cbdc_interest_rate - bank.interest_rate;
            p += t.interest_sensitivity * advantage * 10.0;
            p += bank.liquidity_stress_level * STRESS_ADOPTION_WEIGHT;
        }

        let momentum =
            1.0 + 0.5 * (snapshot.steps_since_introduction as f64 / MOMENTUM_RAMP_STEPS).min(1.0);
        p += t.social_influence_weight * snapshot.adoption_rate * momentum;
        p += t.convenience_preference * 0.1;
        p -= t.risk_aversion * 0.05;
        p -= t.bank_loyalty * 0.08;
        p
    }

    fn consider_cbdc_adoption(
        &mut self,
        snapshot: &TickSnapshot,
        limits: &CbdcLimits,
        rng: &mut RandomStream,
    ) {
        if rng.chance(self.adoption_probability(snapshot)) {
            self.adopt_cbdc(snapshot.tick, limits);
        }
    }

    /// One-time move of 20-50% of deposits into CBDC, less for loyal
    /// customers, plus a smaller slice of banknotes. Both respect the caps.
    pub fn adopt_cbdc(&mut self, tick: usize, limits: &CbdcLimits) {
        if self.cbdc_adopter {
            return;
        }
        self.cbdc_adopter = true;
        self.adoption_step = Some(tick);

        let rate = 0.2 + (1.0 - self.traits.bank_loyalty) * 0.3;
        if self.is_banked() {
            let amount = (self.holdings.bank_deposits * rate).min(self.funding_room(limits, tick));
            self.holdings.bank_deposits -= amount;
            self.holdings.cbdc += amount;
            self.flows.deposits_to_cbdc += amount;
            self.flows.cbdc_funded += amount;
        }
        let notes = (self.holdings.banknotes * rate * 0.5).min(self.funding_room(limits, tick));
        self.holdings.banknotes -= notes;
        self.holdings.cbdc += notes;
        self.flows.banknotes_to_cbdc += notes;
        self.flows.cbdc_funded += notes;
    }

    /// Target share of liquid bank-and-CBDC money to hold as CBDC
    pub fn cbdc_preference(&self, snapshot: &TickSnapshot) -> f64 {
        if !self.cbdc_adopter {
            return 0.0;
        }
        let t = &self.traits;
        let mut pref = 0.3;
        if let Some(bank) = self.primary_bank.and_then(|id| snapshot.bank(id)) {
            pref += t.interest_sensitivity * (snapshot.cbdc_interest_rate - bank.interest_rate) * 5.0;
        }
        pref += t.convenience_preference * 0.2;
        pref -= t.risk_aversion * 0.15;
        pref -= t.bank_loyalty * 0.2;
        pref += t.social_influence_weight * snapshot.peer_cbdc_usage * 0.3;
        pref += (self.steps_since_adoption(snapshot.tick) as f64 * 0.005).min(0.1);
        pref.clamp(0.0, MAX_CBDC_PREFERENCE)
    }

    /// Close a tenth of the gap to the preferred CBDC share, if it is worth it
    fn rebalance_portfolio(&mut self, snapshot: &TickSnapshot, limits: &CbdcLimits) {
        if !self.is_banked() {
            return;
        }
        let liquid = self.holdings.bank_deposits + self.holdings.cbdc;
        if liquid <= 0.0 {
            return;
        }
        let target = liquid * self.cbdc_preference(snapshot);
        let adjustment = (target - self.holdings.cbdc) * REBALANCE_SPEED;
        if adjustment.abs() <= 1.0 {
            return;
        }

        if adjustment > 0.0 {
            let amount = adjustment
                .min(self.holdings.bank_deposits)
                .min(self.funding_room(limits, snapshot.tick));
            self.holdings.bank_deposits -= amount;
            self.holdings.cbdc += amount;
            self.flows.deposits_to_cbdc += amount;
            self.flows.cbdc_funded += amount;
        } else {
            let amount = (-adjustment)
                .min(self.holdings.cbdc)
                .min(limits.redemption_room(self.flows.cbdc_redeemed));
            self.holdings.cbdc -= amount;
            self.holdings.bank_deposits += amount;
            self.flows.cbdc_to_deposits += amount;
            self.flows.cbdc_redeemed += amount;
        }
    }

    fn update_banking_relationship(&mut self, rng: &mut RandomStream) {
        if self.is_banked()
            && self.holdings.bank_deposits < self.initial_wealth * 0.1
            && rng.chance(0.05)
        {
            self.traits.bank_loyalty *= 0.9;
        }
    }

    /// Credit an incoming peer payment in the matching tier. CBDC above the
    /// holding cap spills into deposits, or banknotes for the unbanked.
    pub fn receive_payment(
        &mut self,
        method: PaymentMethod,
        amount: f64,
        limits: &CbdcLimits,
        tick: usize,
    ) {
        self.flows.transfers_in += amount;
        match method.tier() {
            MoneyTier::Banknotes => self.holdings.banknotes += amount,
            MoneyTier::Deposits => self.credit_cash_or_deposit(amount),
            MoneyTier::Cbdc => {
                let room = (limits.holding_cap(self.steps_since_adoption(tick))
                    - self.holdings.cbdc)
                    .max(0.0);
                let kept = amount.min(room);
                self.holdings.cbdc += kept;
                let overflow = amount - kept;
                if overflow > 0.0 {
                    self.credit_cash_or_deposit(overflow);
                    if self.is_banked() {
                        self.flows.cbdc_to_deposits += overflow;
                    }
                }
            }
        }
    }

    fn credit_cash_or_deposit(&mut self, amount: f64) {
        if self.is_banked() {
            self.holdings.bank_deposits += amount;
        } else {
            self.holdings.banknotes += amount;
        }
    }

    /// Cut ties with the primary bank. Remaining deposits go to CBDC as far
    /// as the limits allow and the rest is withdrawn as banknotes.
    ///
    /// Returns `(to_cbdc, to_banknotes)`.
    pub fn detach_from_bank(&mut self, limits: &CbdcLimits, tick: usize) -> (f64, f64) {
        let deposits = self.holdings.bank_deposits;
        let to_cbdc = if self.cbdc_adopter {
            deposits.min(self.funding_room(limits, tick))
        } else {
            0.0
        };
        let to_banknotes = deposits - to_cbdc;

        self.holdings.bank_deposits = 0.0;
        self.holdings.cbdc += to_cbdc;
        self.holdings.banknotes += to_banknotes;
        self.flows.deposits_to_cbdc += to_cbdc;
        self.flows.cbdc_funded += to_cbdc;
        self.primary_bank = None;
        (to_cbdc, to_banknotes)
    }

    /// Cyber theft out of the liquid tiers; returns what was taken
    pub fn suffer_loss(&mut self, amount: f64) -> f64 {
        let taken = self.holdings.draw_down_proportionally(amount);
        self.flows.losses += taken;
        self.cyber_victim = true;
        taken
    }

    pub fn apply_loyalty_shock(&mut self, impact: f64) {
        self.traits.bank_loyalty *= 1.0 - impact.clamp(0.0, 1.0);
    }

    pub fn financial_profile(&self) -> FinancialProfile {
        let liquid = self.holdings.bank_deposits + self.holdings.cbdc;
        FinancialProfile {
            total_wealth: self.wealth(),
            liquid_assets: liquid,
            bank_deposits: self.holdings.bank_deposits,
            banknotes: self.holdings.banknotes,
            cbdc_holdings: self.holdings.cbdc,
            cbdc_ratio: super::ratio_or(self.holdings.cbdc, liquid, 0.0),
            cbdc_adopter: self.cbdc_adopter,
            adoption_step: self.adoption_step,
            risk_aversion: self.traits.risk_aversion,
            bank_loyalty: self.traits.bank_loyalty,
            interest_sensitivity: self.traits.interest_sensitivity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::BankView;
    use approx::assert_relative_eq;

    fn consumer(deposits: f64, banknotes: f64) -> Consumer {
        let holdings = Holdings {
            bank_deposits: deposits,
            banknotes,
            cbdc: 0.0,
            other_assets: 500.0,
        };
        let mut c = Consumer::new(ConsumerId(0), holdings, BehaviouralTraits::neutral(), 0.03);
        c.primary_bank = Some(BankId(0));
        c
    }

    fn snapshot() -> TickSnapshot {
        TickSnapshot {
            tick: 10,
            cbdc_introduced: true,
            cbdc_interest_rate: 0.01,
            banks: vec![BankView {
                interest_rate: 0.02,
                liquidity_stress_level: 0.0,
            }],
            peers: vec![
                PeerView {
                    adopter: true,
                    banked: true,
                },
                PeerView {
                    adopter: true,
                    banked: true,
                },
            ],
            merchants: vec![MerchantView {
                accepts_cbdc: true,
                online: false,
                preferences: [0.8, 0.0, 0.4, 0.9],
                avg_transaction_size: 50.0,
                transaction_variance: 10.0,
            }],
            ..TickSnapshot::default()
        }
    }

    fn step(c: &mut Consumer, snapshot: &TickSnapshot, seed: u64) -> Vec<Payment> {
        let limits = CbdcLimits::unlimited();
        let mut rng = RandomStream::seeded(seed);
        let mut ledger = TransactionLedger::default();
        let mut ctx = ConsumerContext {
            snapshot,
            limits: &limits,
            transactions_per_step: 3.0,
            peer_payment_share: 0.2,
            rng: &mut rng,
            ledger: &mut ledger,
        };
        c.step(&mut ctx)
    }

    #[test]
    fn wealth_change_matches_recorded_flows() {
        let snapshot = snapshot();
        for seed in 0..20 {
            let mut c = consumer(4000.0, 500.0);
            c.cbdc_available = true;
            let before = c.wealth();
            step(&mut c, &snapshot, seed);

            let f = c.flows();
            let expected = before + f.income - f.spending - f.losses + f.transfers_in;
            assert_relative_eq!(c.wealth(), expected, max_relative = 1e-9);
            assert!(c.holdings.bank_deposits >= 0.0);
            assert!(c.holdings.banknotes >= 0.0);
            assert!(c.holdings.cbdc >= 0.0);
        }
    }

    #[test]
    fn payments_match_ledger_and_budget() {
        let snapshot = snapshot();
        let mut c = consumer(4000.0, 500.0);
        let limits = CbdcLimits::unlimited();
        let mut rng = RandomStream::seeded(3);
        let mut ledger = TransactionLedger::default();
        let mut ctx = ConsumerContext {
            snapshot: &snapshot,
            limits: &limits,
            transactions_per_step: 5.0,
            peer_payment_share: 0.5,
            rng: &mut rng,
            ledger: &mut ledger,
        };
        let payments = c.step(&mut ctx);

        let paid: f64 = payments.iter().map(|p| p.amount).sum();
        assert_relative_eq!(ledger.total_volume(), paid, epsilon = 1e-9);
        assert_eq!(ledger.total_count(), payments.len() as u64);
        assert!(paid <= c.flows().spending + 1e-9);
        // Non-adopters never pay in CBDC
        assert!(payments.iter().all(|p| p.method != PaymentMethod::Cbdc));
        assert!(payments
            .iter()
            .all(|p| p.payee != Payee::Consumer(ConsumerId(0))));
    }

    #[test]
    fn online_merchant_never_gets_cash() {
        let mut snapshot = snapshot();
        snapshot.merchants[0].online = true;
        snapshot.peers.truncate(1);
        for seed in 0..30 {
            let mut c = consumer(4000.0, 500.0);
            let payments = step(&mut c, &snapshot, seed);
            assert!(payments.iter().all(|p| p.method != PaymentMethod::Cash));
        }
    }

    #[test]
    fn adoption_is_irreversible_and_moves_deposits() {
        let mut c = consumer(1000.0, 200.0);
        c.traits.bank_loyalty = 0.5;
        c.adopt_cbdc(7, &CbdcLimits::unlimited());

        assert!(c.cbdc_adopter);
        assert_eq!(c.adoption_step, Some(7));
        // 35% of deposits, 17.5% of banknotes
        assert_relative_eq!(c.holdings.bank_deposits, 650.0, epsilon = 1e-9);
        assert_relative_eq!(c.holdings.cbdc, 350.0 + 35.0, epsilon = 1e-9);
        assert_relative_eq!(c.flows().deposits_to_cbdc, 350.0, epsilon = 1e-9);

        c.adopt_cbdc(9, &CbdcLimits::unlimited());
        assert_eq!(c.adoption_step, Some(7));
    }

    #[test]
    fn adoption_respects_cooling_period_cap() {
        let mut c = consumer(10_000.0, 0.0);
        c.traits.bank_loyalty = 0.1;
        c.adopt_cbdc(0, &CbdcLimits::holding_limits());

        assert_relative_eq!(c.holdings.cbdc, 1000.0);
        assert_relative_eq!(c.holdings.bank_deposits, 9000.0);
    }

    #[test]
    fn preference_is_bounded() {
        let mut snapshot = snapshot();
        snapshot.cbdc_interest_rate = 1.0;
        snapshot.peer_cbdc_usage = 1.0;
        let mut c = consumer(100.0, 0.0);
        assert_eq!(c.cbdc_preference(&snapshot), 0.0);

        c.cbdc_adopter = true;
        c.traits.interest_sensitivity = 0.9;
        assert_eq!(c.cbdc_preference(&snapshot), MAX_CBDC_PREFERENCE);

        snapshot.cbdc_interest_rate = -1.0;
        assert_eq!(c.cbdc_preference(&snapshot), 0.0);
    }

    #[test]
    fn bank_stress_raises_adoption_probability() {
        let mut snapshot = snapshot();
        let c = consumer(100.0, 0.0);
        let calm = c.adoption_probability(&snapshot);
        snapshot.banks[0].liquidity_stress_level = 1.0;
        let stressed = c.adoption_probability(&snapshot);

        assert_relative_eq!(stressed - calm, STRESS_ADOPTION_WEIGHT, epsilon = 1e-12);
    }

    #[test]
    fn attractiveness_scales_only_the_base_probability() {
        let mut snapshot = snapshot();
        let c = consumer(100.0, 0.0);
        snapshot.attractiveness_factor = 1.0;
        let neutral = c.adoption_probability(&snapshot);
        snapshot.attractiveness_factor = 2.0;
        let boosted = c.adoption_probability(&snapshot);
        snapshot.attractiveness_factor = 0.5;
        let throttled = c.adoption_probability(&snapshot);

        assert_relative_eq!(boosted - neutral, c.base_adoption_probability, epsilon = 1e-12);
        assert_relative_eq!(
            neutral - throttled,
            0.5 * c.base_adoption_probability,
            epsilon = 1e-12
        );
    }

    #[test]
    fn rebalancing_moves_toward_target() {
        let snapshot = snapshot();
        let mut c = consumer(1000.0, 0.0);
        c.cbdc_adopter = true;
        c.adoption_step = Some(10);
        c.traits = BehaviouralTraits {
            bank_loyalty: 0.1,
            risk_aversion: 0.1,
            convenience_preference: 0.9,
            ..BehaviouralTraits::neutral()
        };
        let target_share = c.cbdc_preference(&snapshot);
        c.rebalance_portfolio(&snapshot, &CbdcLimits::unlimited());

        assert_relative_eq!(c.holdings.cbdc, 1000.0 * target_share * 0.1, epsilon = 1e-9);
        assert_relative_eq!(c.holdings.bank_deposits + c.holdings.cbdc, 1000.0);
    }

    #[test]
    fn cbdc_receipt_over_cap_spills_into_deposits() {
        let mut c = consumer(0.0, 0.0);
        c.cbdc_adopter = true;
        c.adoption_step = Some(0);
        c.holdings.cbdc = 2900.0;
        c.receive_payment(PaymentMethod::Cbdc, 300.0, &CbdcLimits::holding_limits(), 20);

        assert_relative_eq!(c.holdings.cbdc, 3000.0);
        assert_relative_eq!(c.holdings.bank_deposits, 200.0);
        assert_relative_eq!(c.flows().transfers_in, 300.0);
    }

    #[test]
    fn detaching_converts_remaining_deposits() {
        let mut c = consumer(5000.0, 0.0);
        c.cbdc_adopter = true;
        c.adoption_step = Some(0);
        let (to_cbdc, to_notes) = c.detach_from_bank(&CbdcLimits::holding_limits(), 20);

        assert_relative_eq!(to_cbdc, 1000.0);
        assert_relative_eq!(to_notes, 4000.0);
        assert_eq!(c.primary_bank, None);
        assert_eq!(c.holdings.bank_deposits, 0.0);
    }
}
