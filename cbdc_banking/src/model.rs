//! The banking economy and its tick scheduler.
//!
//! [`Economy`] owns every agent and answers the aggregate reporter
//! questions. [`CbdcBankingModel`] advances it one tick at a time in a fixed
//! order and is the single system agent the event loop drives.

use des::{Agent, Response};
use serde::Serialize;
use tracing::debug;

use crate::agents::central_bank::CbdcStatistics;
use crate::agents::commercial_bank::LENDING_SPREAD;
use crate::agents::consumer::{BehaviouralTraits, ConsumerContext, Payee, Payment};
use crate::agents::merchant::{BusinessSize, BusinessType};
use crate::agents::risk_manager::RiskDashboard;
use crate::agents::{
    ratio_or, AgentRef, BankType, CentralBank, CentralityMeasure, CommercialBank, Consumer,
    Merchant, RiskManager,
};
use crate::collector::DataCollector;
use crate::config::ModelConfig;
use crate::error::ConfigError;
use crate::money::{BankId, CbdcLimits, ConsumerId, Holdings, MerchantId, TransactionLedger};
use crate::random::RandomStream;
use crate::snapshot::TickSnapshot;
use crate::{Event, SimulationStats, Stats};

/// Merchant size mix: small, medium, large
const MERCHANT_SIZE_WEIGHTS: [f64; 3] = [0.6, 0.3, 0.1];

/// Every agent of the economy plus the few model-level state variables
#[derive(Debug, Clone)]
pub struct Economy {
    pub central_bank: CentralBank,
    pub banks: Vec<CommercialBank>,
    pub consumers: Vec<Consumer>,
    pub merchants: Vec<Merchant>,
    /// 1.0 is normal; operational risk drags it down
    pub economic_conditions: f64,
    pub systemic_risk_score: f64,
    /// Payments over the whole run
    pub transactions: TransactionLedger,
    pub last_tick_transactions: TransactionLedger,
    pub current_step: usize,
}

impl Economy {
    /// Create the population and calibrate bank balance sheets to the
    /// deposits actually assigned. The configuration is assumed valid.
    pub fn build(config: &ModelConfig, rng: &mut RandomStream) -> Self {
        let central_bank = CentralBank::new(
            config.cbdc_interest_rate,
            config.cbdc_attractiveness,
            config.policy,
            config.adoption_target,
        );

        let n_banks = config.n_commercial_banks;
        let n_large = ((n_banks as f64 * config.large_bank_fraction).round() as usize)
            .clamp(1, n_banks.max(1));
        let mut banks: Vec<CommercialBank> = (0..n_banks)
            .map(|i| {
                let (bank_type, connections) = if i < n_large {
                    (BankType::Large, n_banks - 1)
                } else if n_banks > 1 {
                    (BankType::SmallMedium, 1 + rng.index(n_banks - 1).unwrap_or(0))
                } else {
                    (BankType::SmallMedium, 0)
                };
                CommercialBank::new(BankId(i), bank_type, config.bank_interest_rate, connections, rng)
            })
            .collect();

        let wealth = config.initial_consumer_wealth;
        let deposits = wealth * config.initial_deposit_share;
        let banknotes = wealth * config.initial_banknote_share;
        let mut consumers = Vec::with_capacity(config.n_consumers);
        for i in 0..config.n_consumers {
            let holdings = Holdings {
                bank_deposits: deposits,
                banknotes,
                cbdc: 0.0,
                other_assets: (wealth - deposits - banknotes).max(0.0),
            };
            let traits = BehaviouralTraits::draw(rng);
            let mut consumer =
                Consumer::new(ConsumerId(i), holdings, traits, config.cbdc_adoption_rate);
            if let Some(b) = rng.index(banks.len()) {
                consumer.primary_bank = Some(BankId(b));
                banks[b].add_customer(consumer.id);
            }
            consumers.push(consumer);
        }

        let merchants = (0..config.n_merchants)
            .map(|i| {
                let business_type = rng
                    .index(BusinessType::ALL.len())
                    .map_or(BusinessType::Retail, |t| BusinessType::ALL[t]);
                let size = match rng.weighted_index(&MERCHANT_SIZE_WEIGHTS) {
                    Some(0) | None => BusinessSize::Small,
                    Some(1) => BusinessSize::Medium,
                    Some(_) => BusinessSize::Large,
                };
                let bank = rng.index(banks.len()).map(BankId);
                Merchant::new(MerchantId(i), business_type, size, bank)
            })
            .collect();

        let mut economy = Economy {
            central_bank,
            banks,
            consumers,
            merchants,
            economic_conditions: 1.0,
            systemic_risk_score: 0.0,
            transactions: TransactionLedger::default(),
            last_tick_transactions: TransactionLedger::default(),
            current_step: 0,
        };
        economy.initialize_bank_balance_sheets();
        economy
    }

    fn initialize_bank_balance_sheets(&mut self) {
        for bank in self.banks.iter_mut() {
            let deposits: f64 = bank
                .customers
                .iter()
                .filter_map(|id| self.consumers.get(id.0))
                .map(|c| c.holdings.bank_deposits)
                .sum();
            bank.initialize_balance_sheet(deposits);
        }
        let market = self.compute_total_bank_deposits();
        for bank in self.banks.iter_mut() {
            bank.calculate_metrics(market);
        }
    }

    /// Deposits held by banked consumers, i.e. what the banks' books will
    /// sum to once they refresh
    pub fn consumer_bank_deposits(&self) -> f64 {
        self.consumers
            .iter()
            .filter(|c| c.is_banked())
            .map(|c| c.holdings.bank_deposits)
            .sum()
    }

    /// Credit every payment to its payee
    pub fn settle_payments(&mut self, payments: &[Payment], limits: &CbdcLimits, tick: usize) {
        for payment in payments {
            match payment.payee {
                Payee::Merchant(id) => {
                    if let Some(m) = self.merchants.get_mut(id.0) {
                        m.receive_payment(payment.method, payment.amount);
                    }
                }
                Payee::Consumer(id) => {
                    if let Some(c) = self.consumers.get_mut(id.0) {
                        c.receive_payment(payment.method, payment.amount, limits, tick);
                    }
                }
            }
        }
    }

    pub fn refresh_business_deposits(&mut self) {
        for bank in self.banks.iter_mut() {
            bank.business_deposits = self
                .merchants
                .iter()
                .filter(|m| m.primary_bank == Some(bank.id))
                .map(|m| m.bank_balance)
                .sum();
        }
    }

    /// End a consumer's banking relationship on both sides at once
    pub fn detach_customer(&mut self, consumer: ConsumerId, limits: &CbdcLimits, tick: usize) {
        let Some(c) = self.consumers.get_mut(consumer.0) else {
            return;
        };
        let Some(bank_id) = c.primary_bank else {
            return;
        };
        let (to_cbdc, to_banknotes) = c.detach_from_bank(limits, tick);
        if let Some(bank) = self.banks.get_mut(bank_id.0) {
            bank.remove_customer(consumer);
            bank.release_departed_deposits(to_cbdc, to_banknotes);
        }
    }

    pub fn apply_loyalty_shock(&mut self, bank: BankId, impact: f64) {
        let Some(bank) = self.banks.get(bank.0) else {
            return;
        };
        for id in &bank.customers {
            if let Some(c) = self.consumers.get_mut(id.0) {
                c.apply_loyalty_shock(impact);
            }
        }
    }

    /// Reset deposit rates to the configured base plus CBDC competitive
    /// pressure, capped at 1.5x the base; lending rates follow at the
    /// standard spread. Overrides each bank's own rate moves for the tick.
    pub fn adjust_market_conditions(&mut self, base_rate: f64) {
        if !self.central_bank.cbdc_introduced {
            return;
        }
        let pressure = self.compute_cbdc_adoption_rate() * 0.1;
        let rate = (base_rate + pressure).min(base_rate * 1.5);
        for bank in self.banks.iter_mut() {
            bank.interest_rate = rate;
            bank.lending_rate = rate + LENDING_SPREAD;
        }
    }

    pub fn agents(&self) -> impl Iterator<Item = AgentRef<'_>> {
        std::iter::once(AgentRef::CentralBank(&self.central_bank))
            .chain(self.banks.iter().map(AgentRef::Bank))
            .chain(self.consumers.iter().map(AgentRef::Consumer))
            .chain(self.merchants.iter().map(AgentRef::Merchant))
    }

    // Reporters

    /// Share of consumers that adopted; 0.0 before introduction
    pub fn compute_cbdc_adoption_rate(&self) -> f64 {
        if !self.central_bank.cbdc_introduced {
            return 0.0;
        }
        ratio_or(self.compute_cbdc_adopters() as f64, self.consumers.len() as f64, 0.0)
    }

    pub fn compute_cbdc_adopters(&self) -> usize {
        self.consumers.iter().filter(|c| c.cbdc_adopter).count()
    }

    pub fn compute_total_cbdc_holdings(&self) -> f64 {
        self.consumers.iter().map(|c| c.holdings.cbdc).sum()
    }

    pub fn compute_total_bank_deposits(&self) -> f64 {
        self.banks.iter().map(|b| b.total_deposits).sum()
    }

    pub fn compute_total_bank_loans(&self) -> f64 {
        self.banks.iter().map(|b| b.total_loans).sum()
    }

    pub fn compute_total_consumer_wealth(&self) -> f64 {
        self.consumers.iter().map(|c| c.wealth()).sum()
    }

    /// Banknotes held by consumers and merchants
    pub fn compute_total_banknotes(&self) -> f64 {
        self.consumers.iter().map(|c| c.holdings.banknotes).sum::<f64>()
            + self.merchants.iter().map(|m| m.cash_balance).sum::<f64>()
    }

    pub fn compute_average_bank_liquidity(&self) -> f64 {
        ratio_or(
            self.banks.iter().map(|b| b.liquidity_ratio).sum(),
            self.banks.len() as f64,
            0.0,
        )
    }

    pub fn compute_average_liquidity_stress(&self) -> f64 {
        ratio_or(
            self.banks.iter().map(|b| b.liquidity_stress_level).sum(),
            self.banks.len() as f64,
            0.0,
        )
    }

    /// Share of adopters' bank-and-CBDC money held as CBDC
    pub fn peer_cbdc_usage(&self) -> f64 {
        let (cbdc, total) = self
            .consumers
            .iter()
            .filter(|c| c.cbdc_adopter)
            .fold((0.0, 0.0), |(cbdc, total), c| {
                (
                    cbdc + c.holdings.cbdc,
                    total + c.holdings.cbdc + c.holdings.bank_deposits,
                )
            });
        ratio_or(cbdc, total, 0.0)
    }

    fn banks_of(&self, bank_type: Option<BankType>) -> impl Iterator<Item = &CommercialBank> {
        self.banks
            .iter()
            .filter(move |b| bank_type.is_none_or(|t| b.bank_type == t))
    }

    fn mean_over(&self, bank_type: Option<BankType>, f: impl Fn(&CommercialBank) -> f64) -> f64 {
        let (sum, n) = self
            .banks_of(bank_type)
            .fold((0.0, 0usize), |(sum, n), b| (sum + f(b), n + 1));
        ratio_or(sum, n as f64, 0.0)
    }

    /// Mean scalar network centrality over banks of a type, or all banks
    pub fn compute_bank_centrality(&self, bank_type: Option<BankType>) -> f64 {
        self.mean_over(bank_type, |b| b.network_centrality)
    }

    pub fn compute_average_centrality(
        &self,
        measure: CentralityMeasure,
        bank_type: Option<BankType>,
    ) -> f64 {
        self.mean_over(bank_type, |b| b.centrality.get(measure))
    }

    /// Connections over the N(N-1) possible directed links
    pub fn compute_interbank_density(&self) -> f64 {
        let n = self.banks.len();
        if n < 2 {
            return 0.0;
        }
        let connections: f64 = self.banks.iter().map(|b| b.interbank_connections).sum();
        connections / (n * (n - 1)) as f64
    }

    pub fn compute_central_bank_centrality(&self) -> f64 {
        self.central_bank.network_centrality
    }

    pub fn compute_merchants_accepting_cbdc(&self) -> usize {
        self.merchants.iter().filter(|m| m.accepts_cbdc).count()
    }
}

/// Before-and-after comparison of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub steps: usize,
    pub final_cbdc_adoption_rate: f64,
    pub final_cbdc_holdings: f64,
    pub cbdc_adopters: usize,
    pub initial_bank_deposits: f64,
    pub final_bank_deposits: f64,
    pub deposit_reduction_rate: f64,
    pub final_bank_loans: f64,
    pub average_final_liquidity: f64,
    pub merchants_accepting_cbdc: usize,
    pub cbdc: CbdcStatistics,
    pub risk: Option<RiskDashboard>,
}

/// Clock, scheduler and metric collection around an [`Economy`]
pub struct CbdcBankingModel {
    config: ModelConfig,
    pub economy: Economy,
    pub risk_manager: Option<RiskManager>,
    rng: RandomStream,
    collector: DataCollector,
}

impl CbdcBankingModel {
    pub fn new(config: ModelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = RandomStream::seeded(config.seed);
        let economy = Economy::build(&config, &mut rng);
        let risk_manager = config
            .enable_risk_manager
            .then(|| RiskManager::new(config.risk.clone()));

        let mut collector = DataCollector::with_default_reporters();
        collector.collect(&economy);

        Ok(CbdcBankingModel {
            config,
            economy,
            risk_manager,
            rng,
            collector,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn collector(&self) -> &DataCollector {
        &self.collector
    }

    pub fn current_step(&self) -> usize {
        self.economy.current_step
    }

    /// Advance one tick.
    ///
    /// Every agent reads the snapshot taken at the start of the tick; the
    /// only same-tick state they see from others arrives through the slices
    /// the scheduler passes explicitly.
    pub fn step(&mut self) {
        let limits = &self.config.limits;
        let economy = &mut self.economy;
        economy.current_step += 1;
        let tick = economy.current_step;

        if tick == self.config.cbdc_introduction_step {
            economy.central_bank.introduce_cbdc(tick, &mut economy.consumers);
        }
        if economy.central_bank.cbdc_introduced {
            let adoption = economy.compute_cbdc_adoption_rate();
            economy.central_bank.set_network_effect(adoption);
        }
        let snapshot = TickSnapshot::capture(economy);

        let mut ledger = TransactionLedger::default();
        let mut payments = Vec::new();
        for consumer in economy.consumers.iter_mut() {
            let mut ctx = ConsumerContext {
                snapshot: &snapshot,
                limits,
                transactions_per_step: self.config.transactions_per_step,
                peer_payment_share: self.config.peer_payment_share,
                rng: &mut self.rng,
                ledger: &mut ledger,
            };
            payments.extend(consumer.step(&mut ctx));
        }
        economy.settle_payments(&payments, limits, tick);

        for merchant in economy.merchants.iter_mut() {
            merchant.step(&snapshot, &mut self.rng);
        }
        economy.refresh_business_deposits();

        let market_deposits = economy.consumer_bank_deposits();
        let mut outcomes = Vec::with_capacity(economy.banks.len());
        for bank in economy.banks.iter_mut() {
            outcomes.push(bank.step(&snapshot, &economy.consumers, market_deposits, &mut self.rng));
        }
        for (i, outcome) in outcomes.into_iter().enumerate() {
            for consumer in outcome.departures {
                economy.detach_customer(consumer, limits, tick);
            }
            if let Some(impact) = outcome.loyalty_shock {
                economy.apply_loyalty_shock(BankId(i), impact);
            }
        }

        economy.central_bank.step(
            &snapshot,
            &mut economy.banks,
            &economy.consumers,
            &economy.merchants,
        );
        if let Some(risk_manager) = self.risk_manager.as_mut() {
            risk_manager.step(economy, &mut self.rng);
        }
        economy.adjust_market_conditions(self.config.bank_interest_rate);

        economy.transactions.merge(&ledger);
        economy.last_tick_transactions = ledger;

        debug_assert!(
            !economy.central_bank.cbdc_introduced
                || (economy.central_bank.cbdc_outstanding
                    - economy.central_bank.central_bank_deposits)
                    .abs()
                    <= 1e-6 * economy.central_bank.cbdc_outstanding.max(1.0),
            "CBDC outstanding out of balance with central bank deposits"
        );
        debug!(
            tick,
            adoption = economy.compute_cbdc_adoption_rate(),
            deposits = economy.compute_total_bank_deposits(),
            cbdc_outstanding = economy.central_bank.cbdc_outstanding,
            "tick complete"
        );

        self.collector.collect(&self.economy);
    }

    pub fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    pub fn risk_dashboard(&self) -> Option<RiskDashboard> {
        self.risk_manager
            .as_ref()
            .map(|rm| rm.risk_dashboard(&self.economy))
    }

    pub fn simulation_summary(&self) -> SimulationSummary {
        let economy = &self.economy;
        let deposits = self.collector.column("total_bank_deposits").unwrap_or_default();
        let initial = deposits.first().copied().unwrap_or(0.0);
        let last = deposits.last().copied().unwrap_or(0.0);

        SimulationSummary {
            steps: economy.current_step,
            final_cbdc_adoption_rate: economy.compute_cbdc_adoption_rate(),
            final_cbdc_holdings: economy.compute_total_cbdc_holdings(),
            cbdc_adopters: economy.compute_cbdc_adopters(),
            initial_bank_deposits: initial,
            final_bank_deposits: last,
            deposit_reduction_rate: ratio_or(initial - last, initial, 0.0),
            final_bank_loans: economy.compute_total_bank_loans(),
            average_final_liquidity: economy.compute_average_bank_liquidity(),
            merchants_accepting_cbdc: economy.compute_merchants_accepting_cbdc(),
            cbdc: economy.central_bank.cbdc_statistics(),
            risk: self.risk_dashboard(),
        }
    }

    pub fn simulation_stats(&self) -> SimulationStats {
        SimulationStats {
            seed: self.config.seed,
            steps_completed: self.economy.current_step,
            summary: self.simulation_summary(),
            adoption_history: self
                .collector
                .column("cbdc_adoption_rate")
                .unwrap_or_default(),
            deposit_history: self
                .collector
                .column("total_bank_deposits")
                .unwrap_or_default(),
        }
    }
}

impl Agent<Event, Stats> for CbdcBankingModel {
    fn act(&mut self, _current_t: usize, data: &Event) -> Response<Event, Stats> {
        match data {
            Event::Step { step } => {
                self.step();
                Response::event(step + 1, Event::Step { step: step + 1 })
            }
        }
    }

    fn stats(&self) -> Stats {
        Stats::Simulation(self.simulation_stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use approx::assert_relative_eq;

    fn quiet_small() -> ModelConfig {
        ModelConfig {
            risk: RiskConfig::quiet(),
            ..ModelConfig::small()
        }
    }

    #[test]
    fn invalid_config_fails_fast() {
        let config = ModelConfig {
            n_commercial_banks: 0,
            ..ModelConfig::small()
        };
        assert!(matches!(
            CbdcBankingModel::new(config),
            Err(ConfigError::NoCommercialBanks)
        ));
    }

    #[test]
    fn construction_links_both_sides_and_calibrates_books() {
        let model = CbdcBankingModel::new(ModelConfig::default()).unwrap();
        let economy = &model.economy;

        assert_eq!(economy.consumers.len(), 200);
        assert_eq!(economy.banks.len(), 8);
        assert_eq!(
            economy.banks.iter().filter(|b| b.bank_type == BankType::Large).count(),
            2
        );
        for c in &economy.consumers {
            let bank = c.primary_bank.unwrap();
            assert!(economy.banks[bank.0].customers.contains(&c.id));
        }
        let customers: usize = economy.banks.iter().map(|b| b.customers.len()).sum();
        assert_eq!(customers, 200);
        assert_relative_eq!(
            economy.compute_total_bank_deposits(),
            economy.consumer_bank_deposits(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn introduction_fires_at_configured_tick() {
        let mut model = CbdcBankingModel::new(quiet_small()).unwrap();
        model.run(4);
        assert!(!model.economy.central_bank.cbdc_introduced);
        model.step();
        assert!(model.economy.central_bank.cbdc_introduced);
        assert_eq!(model.economy.central_bank.introduction_step, Some(5));
        assert!(model.economy.consumers.iter().all(|c| c.cbdc_available));
    }

    #[test]
    fn collector_gets_one_row_per_tick_plus_initial() {
        let mut model = CbdcBankingModel::new(quiet_small()).unwrap();
        model.run(7);
        assert_eq!(model.collector().model_rows().len(), 8);
        let steps = model.collector().column("step").unwrap();
        assert_eq!(steps, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn market_adjustment_is_bounded() {
        let mut model = CbdcBankingModel::new(quiet_small()).unwrap();
        model.run(30);
        let base = model.config().bank_interest_rate;
        for bank in &model.economy.banks {
            assert!(bank.interest_rate <= base * 1.5 + 1e-12);
            assert!(bank.lending_rate >= bank.interest_rate + LENDING_SPREAD - 1e-12);
        }
    }

    #[test]
    fn market_adjustment_tracks_adoption_pressure() {
        let mut economy = Economy::build(&quiet_small(), &mut RandomStream::seeded(4));
        economy.central_bank.introduce_cbdc(5, &mut economy.consumers);
        economy.consumers[0].cbdc_adopter = true;
        economy.consumers[1].cbdc_adopter = true;
        economy.banks[0].interest_rate = 0.09;
        economy.banks[1].interest_rate = 0.01;

        economy.adjust_market_conditions(0.05);
        for bank in &economy.banks {
            assert_relative_eq!(bank.interest_rate, 0.07, max_relative = 1e-12);
            assert_relative_eq!(bank.lending_rate, 0.10, max_relative = 1e-12);
        }

        economy.banks[0].interest_rate = 0.035;
        economy.adjust_market_conditions(0.02);
        for bank in &economy.banks {
            assert_relative_eq!(bank.interest_rate, 0.03, max_relative = 1e-12);
            assert_relative_eq!(bank.lending_rate, 0.06, max_relative = 1e-12);
        }
    }

    #[test]
    fn interbank_density_is_a_share() {
        let model = CbdcBankingModel::new(ModelConfig::default()).unwrap();
        let density = model.economy.compute_interbank_density();
        assert!(density > 0.0 && density <= 1.0);
    }

    #[test]
    fn event_loop_drives_the_model() {
        let model = CbdcBankingModel::new(quiet_small()).unwrap();
        let agents: Vec<Box<dyn Agent<Event, Stats>>> = vec![Box::new(model)];
        let mut event_loop = des::EventLoop::new(vec![(1, Event::Step { step: 1 })], agents);
        event_loop.run(12);

        let all_stats = event_loop.stats();
        let Stats::Simulation(stats) = &all_stats[0];
        assert_eq!(stats.steps_completed, 12);
        assert_eq!(stats.adoption_history.len(), 13);
    }

    #[test]
    fn summary_reports_deposit_reduction() {
        let mut model = CbdcBankingModel::new(quiet_small()).unwrap();
        model.run(20);
        let summary = model.simulation_summary();

        assert_eq!(summary.steps, 20);
        let expected = (summary.initial_bank_deposits - summary.final_bank_deposits)
            / summary.initial_bank_deposits;
        assert_relative_eq!(summary.deposit_reduction_rate, expected, max_relative = 1e-12);
        assert!(summary.risk.is_some());
    }
}
