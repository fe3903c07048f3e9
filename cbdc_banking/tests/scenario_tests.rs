use approx::assert_abs_diff_eq;
use cbdc_banking::agents::central_bank::deposit_concentration_risk;
use cbdc_banking::agents::{BankType, CentralityMeasure, CommercialBank};
use cbdc_banking::money::{BankId, CbdcLimits};
use cbdc_banking::random::RandomStream;
use cbdc_banking::scenarios::{build_event_loop, run_seed_sweep};
use cbdc_banking::{CbdcBankingModel, ModelConfig, PolicyStance, RiskConfig, Stats};
use proptest::prelude::*;

/// Run `config` for `steps` ticks and return the finished model
fn run_model(config: ModelConfig, steps: usize) -> CbdcBankingModel {
    let mut model = CbdcBankingModel::new(config).unwrap();
    model.run(steps);
    model
}

#[test]
fn bank_without_deposits_reports_full_liquidity() {
    let mut rng = RandomStream::seeded(1);
    let mut bank = CommercialBank::new(BankId(0), BankType::SmallMedium, 0.02, 1, &mut rng);
    assert_eq!(bank.liquidity_ratio, 1.0);

    bank.initialize_balance_sheet(0.0);
    assert_eq!(bank.liquidity_ratio, 1.0);
    assert_eq!(bank.loan_to_deposit_ratio, 0.0);
    assert_eq!(bank.market_share, 0.0);
}

#[test]
fn small_scenario_replays_exactly() {
    let first = run_model(ModelConfig::small(), 20);
    let second = run_model(ModelConfig::small(), 20);

    let adopters = first.economy.compute_cbdc_adopters();
    assert_eq!(adopters, second.economy.compute_cbdc_adopters());
    assert!(adopters <= 10);
    assert_eq!(
        first.collector().column("cbdc_adoption_rate"),
        second.collector().column("cbdc_adoption_rate")
    );
    assert_eq!(
        first.collector().column("total_bank_deposits"),
        second.collector().column("total_bank_deposits")
    );
}

#[test]
fn saturated_adoption_pins_the_adopter_count() {
    let config = ModelConfig {
        cbdc_adoption_rate: 1.0,
        policy: PolicyStance::Promotion,
        risk: RiskConfig::quiet(),
        ..ModelConfig::small()
    };
    let intro = config.cbdc_introduction_step;
    let first = run_model(config.clone(), 20);
    let second = run_model(config, 20);

    assert_eq!(first.economy.compute_cbdc_adopters(), 10);
    assert_eq!(second.economy.compute_cbdc_adopters(), 10);
    for consumer in &first.economy.consumers {
        let step = consumer.adoption_step.unwrap();
        assert!((intro..=20).contains(&step), "consumer {} adopted at {}", consumer.id, step);
    }
    let steps: Vec<_> = first.economy.consumers.iter().map(|c| c.adoption_step).collect();
    let replayed: Vec<_> = second.economy.consumers.iter().map(|c| c.adoption_step).collect();
    assert_eq!(steps, replayed);
    assert_eq!(
        first.collector().column("total_bank_deposits"),
        second.collector().column("total_bank_deposits")
    );
}

#[test]
fn different_seeds_diverge() {
    let a = run_model(ModelConfig::small().with_seed(1), 20);
    let b = run_model(ModelConfig::small().with_seed(2), 20);
    assert_ne!(
        a.collector().column("total_bank_deposits"),
        b.collector().column("total_bank_deposits")
    );
}

#[test]
fn equal_deposits_have_no_concentration() {
    assert_eq!(deposit_concentration_risk(&[250.0, 250.0, 250.0, 250.0]), 0.0);
    assert_eq!(deposit_concentration_risk(&[1000.0, 0.0, 0.0]), 1.0);
    assert_eq!(deposit_concentration_risk(&[]), 0.0);
    assert_eq!(deposit_concentration_risk(&[0.0, 0.0]), 0.0);
}

#[test]
fn event_loop_and_direct_stepping_agree() {
    let mut event_loop = build_event_loop(ModelConfig::small()).unwrap();
    event_loop.run(25);
    let all_stats = event_loop.stats();
    let Stats::Simulation(stats) = &all_stats[0];

    let direct = run_model(ModelConfig::small(), 25);
    assert_eq!(stats.steps_completed, 25);
    assert_eq!(stats.summary.cbdc_adopters, direct.economy.compute_cbdc_adopters());
    assert_eq!(
        Some(stats.deposit_history.clone()),
        direct.collector().column("total_bank_deposits")
    );
}

#[test]
fn parallel_sweep_is_independent_of_thread_count() {
    let config = ModelConfig::small();
    let one = run_seed_sweep(&config, 15, 4, Some(1)).unwrap();
    let four = run_seed_sweep(&config, 15, 4, Some(4)).unwrap();

    for (a, b) in one.iter().zip(&four) {
        let (a, b) = (a.as_ref().unwrap(), b.as_ref().unwrap());
        assert_eq!(a.seed, b.seed);
        assert_eq!(a.adoption_history, b.adoption_history);
    }
}

#[test]
fn holding_limits_cap_every_wallet() {
    let limits = CbdcLimits::holding_limits();
    let cap = limits.wallet_cap.unwrap();
    let model = run_model(
        ModelConfig {
            limits,
            cbdc_adoption_rate: 0.2,
            ..ModelConfig::small()
        },
        60,
    );

    for consumer in &model.economy.consumers {
        assert!(
            consumer.holdings.cbdc <= cap + 1e-9,
            "consumer {} holds {}",
            consumer.id,
            consumer.holdings.cbdc
        );
    }
}

#[test]
fn long_run_keeps_cbdc_backed_by_reserves() {
    let model = run_model(
        ModelConfig {
            risk: RiskConfig::quiet(),
            cbdc_adoption_rate: 0.1,
            ..ModelConfig::default()
        },
        150,
    );
    let summary = model.simulation_summary();

    assert!(summary.final_cbdc_holdings > 0.0);
    assert!(summary.cbdc_adopters > 0);
    assert_abs_diff_eq!(
        summary.cbdc.cbdc_outstanding,
        model.economy.central_bank.central_bank_deposits,
        epsilon = 1e-6 * summary.cbdc.cbdc_outstanding.max(1.0)
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn concentration_risk_is_bounded(deposits in prop::collection::vec(0.0f64..1e6, 0..12)) {
        let risk = deposit_concentration_risk(&deposits);
        prop_assert!((0.0..=1.0).contains(&risk));
    }

    #[test]
    fn any_seed_keeps_rates_and_centralities_in_range(seed in 0u64..10_000) {
        let model = run_model(ModelConfig::small().with_seed(seed), 25);
        let economy = &model.economy;

        let adoption = economy.compute_cbdc_adoption_rate();
        prop_assert!((0.0..=1.0).contains(&adoption));
        prop_assert!((0.0..=1.0).contains(&economy.systemic_risk_score));
        for bank in &economy.banks {
            for measure in CentralityMeasure::ALL {
                prop_assert!((0.0..=1.0).contains(&bank.centrality.get(measure)));
            }
            prop_assert!(bank.total_deposits >= 0.0);
            prop_assert!(bank.liquidity_ratio >= 0.0);
        }
    }

    #[test]
    fn any_seed_conserves_consumer_wealth(seed in 0u64..10_000) {
        let mut model = CbdcBankingModel::new(ModelConfig::small().with_seed(seed)).unwrap();
        for _ in 0..12 {
            let before: Vec<f64> = model.economy.consumers.iter().map(|c| c.wealth()).collect();
            model.step();
            for (consumer, wealth_before) in model.economy.consumers.iter().zip(before) {
                let f = consumer.flows();
                let expected = wealth_before + f.income - f.spending - f.losses + f.transfers_in;
                let tolerance = 1e-6 * expected.abs().max(1.0);
                prop_assert!((consumer.wealth() - expected).abs() <= tolerance);
            }
        }
    }
}
