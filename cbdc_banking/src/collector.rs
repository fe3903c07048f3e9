//! Reporter registry and the per-tick tables it fills.
//!
//! A model reporter is a plain function of the [`Economy`] returning a
//! scalar; an agent reporter is a function of one agent. The collector
//! calls every reporter once per tick and appends a row, so the tables can
//! be read after the run or between ticks.

use serde::Serialize;

use crate::agents::{AgentId, AgentRef, BankType, CentralityMeasure};
use crate::model::Economy;
use crate::money::PaymentMethod;

pub type ModelReporter = fn(&Economy) -> f64;
pub type AgentReporter = fn(AgentRef<'_>) -> f64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRow {
    pub step: usize,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentRow {
    pub step: usize,
    pub agent: AgentId,
    pub values: Vec<f64>,
}

pub struct DataCollector {
    model_reporters: Vec<(&'static str, ModelReporter)>,
    agent_reporters: Vec<(&'static str, AgentReporter)>,
    model_rows: Vec<ModelRow>,
    agent_rows: Vec<AgentRow>,
}

impl DataCollector {
    /// No reporters registered
    pub fn new() -> Self {
        DataCollector {
            model_reporters: Vec::new(),
            agent_reporters: Vec::new(),
            model_rows: Vec::new(),
            agent_rows: Vec::new(),
        }
    }

    pub fn with_default_reporters() -> Self {
        let mut collector = DataCollector::new();
        register_default_model_reporters(&mut collector);
        register_default_agent_reporters(&mut collector);
        collector
    }

    /// Register a model reporter. Rows collected earlier have no value for
    /// it, so register before the first `collect`.
    pub fn add_model_reporter(&mut self, name: &'static str, reporter: ModelReporter) {
        self.model_reporters.push((name, reporter));
    }

    pub fn add_agent_reporter(&mut self, name: &'static str, reporter: AgentReporter) {
        self.agent_reporters.push((name, reporter));
    }

    pub fn collect(&mut self, economy: &Economy) {
        let step = economy.current_step;
        self.model_rows.push(ModelRow {
            step,
            values: self.model_reporters.iter().map(|(_, f)| f(economy)).collect(),
        });

        if self.agent_reporters.is_empty() {
            return;
        }
        for agent in economy.agents() {
            self.agent_rows.push(AgentRow {
                step,
                agent: agent.id(),
                values: self.agent_reporters.iter().map(|(_, f)| f(agent)).collect(),
            });
        }
    }

    pub fn model_reporter_names(&self) -> Vec<&'static str> {
        self.model_reporters.iter().map(|(name, _)| *name).collect()
    }

    pub fn agent_reporter_names(&self) -> Vec<&'static str> {
        self.agent_reporters.iter().map(|(name, _)| *name).collect()
    }

    pub fn model_rows(&self) -> &[ModelRow] {
        &self.model_rows
    }

    pub fn agent_rows(&self) -> &[AgentRow] {
        &self.agent_rows
    }

    /// One model reporter's time series, oldest first
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.model_reporters.iter().position(|(n, _)| *n == name)?;
        Some(
            self.model_rows
                .iter()
                .filter_map(|row| row.values.get(index).copied())
                .collect(),
        )
    }

    pub fn latest(&self, name: &str) -> Option<f64> {
        self.column(name)?.last().copied()
    }

    /// One agent's rows for a reporter, oldest first
    pub fn agent_series(&self, agent: AgentId, name: &str) -> Option<Vec<f64>> {
        let index = self.agent_reporters.iter().position(|(n, _)| *n == name)?;
        Some(
            self.agent_rows
                .iter()
                .filter(|row| row.agent == agent)
                .filter_map(|row| row.values.get(index).copied())
                .collect(),
        )
    }
}

impl Default for DataCollector {
    fn default() -> Self {
        DataCollector::new()
    }
}

fn register_default_model_reporters(collector: &mut DataCollector) {
    collector.add_model_reporter("step", |e| e.current_step as f64);
    collector.add_model_reporter("cbdc_adoption_rate", |e| e.compute_cbdc_adoption_rate());
    collector.add_model_reporter("total_cbdc_holdings", |e| e.compute_total_cbdc_holdings());
    collector.add_model_reporter("total_bank_deposits", |e| e.compute_total_bank_deposits());
    collector.add_model_reporter("total_bank_loans", |e| e.compute_total_bank_loans());
    collector.add_model_reporter("cbdc_adopters", |e| e.compute_cbdc_adopters() as f64);
    collector.add_model_reporter("average_bank_liquidity", |e| e.compute_average_bank_liquidity());
    collector.add_model_reporter("average_bank_centrality", |e| e.compute_bank_centrality(None));
    collector.add_model_reporter("large_bank_centrality", |e| {
        e.compute_bank_centrality(Some(BankType::Large))
    });
    collector.add_model_reporter("small_bank_centrality", |e| {
        e.compute_bank_centrality(Some(BankType::SmallMedium))
    });
    collector.add_model_reporter("average_degree_centrality", |e| {
        e.compute_average_centrality(CentralityMeasure::Degree, None)
    });
    collector.add_model_reporter("average_betweenness_centrality", |e| {
        e.compute_average_centrality(CentralityMeasure::Betweenness, None)
    });
    collector.add_model_reporter("average_closeness_centrality", |e| {
        e.compute_average_centrality(CentralityMeasure::Closeness, None)
    });
    collector.add_model_reporter("average_eigenvector_centrality", |e| {
        e.compute_average_centrality(CentralityMeasure::Eigenvector, None)
    });
    collector.add_model_reporter("large_bank_betweenness", |e| {
        e.compute_average_centrality(CentralityMeasure::Betweenness, Some(BankType::Large))
    });
    collector.add_model_reporter("small_bank_betweenness", |e| {
        e.compute_average_centrality(CentralityMeasure::Betweenness, Some(BankType::SmallMedium))
    });
    collector.add_model_reporter("average_liquidity_stress", |e| {
        e.compute_average_liquidity_stress()
    });
    collector.add_model_reporter("interbank_network_density", |e| e.compute_interbank_density());
    collector.add_model_reporter("central_bank_centrality", |e| {
        e.compute_central_bank_centrality()
    });
    collector.add_model_reporter("cbdc_outstanding", |e| e.central_bank.cbdc_outstanding);
    collector.add_model_reporter("central_bank_deposits", |e| {
        e.central_bank.central_bank_deposits
    });
    collector.add_model_reporter("banknotes_outstanding", |e| e.compute_total_banknotes());
    collector.add_model_reporter("merchants_accepting_cbdc", |e| {
        e.compute_merchants_accepting_cbdc() as f64
    });
    collector.add_model_reporter("systemic_risk_score", |e| e.systemic_risk_score);
    collector.add_model_reporter("economic_conditions", |e| e.economic_conditions);
    collector.add_model_reporter("cash_volume_share", |e| {
        e.transactions.share(PaymentMethod::Cash)
    });
    collector.add_model_reporter("card_volume_share", |e| {
        e.transactions.share(PaymentMethod::Card)
    });
    collector.add_model_reporter("bank_transfer_volume_share", |e| {
        e.transactions.share(PaymentMethod::BankTransfer)
    });
    collector.add_model_reporter("cbdc_volume_share", |e| {
        e.transactions.share(PaymentMethod::Cbdc)
    });
}

fn register_default_agent_reporters(collector: &mut DataCollector) {
    collector.add_agent_reporter("wealth", |a| match a {
        AgentRef::Consumer(c) => c.wealth(),
        AgentRef::Merchant(m) => m.cash_balance + m.bank_balance + m.cbdc_balance,
        _ => 0.0,
    });
    collector.add_agent_reporter("cbdc_holdings", |a| match a {
        AgentRef::Consumer(c) => c.holdings.cbdc,
        AgentRef::Merchant(m) => m.cbdc_balance,
        AgentRef::CentralBank(cb) => cb.cbdc_outstanding,
        AgentRef::Bank(_) => 0.0,
    });
    collector.add_agent_reporter("bank_deposits", |a| match a {
        AgentRef::Consumer(c) => c.holdings.bank_deposits,
        AgentRef::Merchant(m) => m.bank_balance,
        _ => 0.0,
    });
    collector.add_agent_reporter("cbdc_adopter", |a| match a {
        AgentRef::Consumer(c) => f64::from(u8::from(c.cbdc_adopter)),
        AgentRef::Merchant(m) => f64::from(u8::from(m.accepts_cbdc)),
        _ => 0.0,
    });
    collector.add_agent_reporter("liquidity_ratio", |a| match a {
        AgentRef::Bank(b) => b.liquidity_ratio,
        _ => 0.0,
    });
    collector.add_agent_reporter("total_deposits", |a| match a {
        AgentRef::Bank(b) => b.total_deposits,
        _ => 0.0,
    });
    collector.add_agent_reporter("total_loans", |a| match a {
        AgentRef::Bank(b) => b.total_loans,
        _ => 0.0,
    });
    collector.add_agent_reporter("liquidity_stress_level", |a| match a {
        AgentRef::Bank(b) => b.liquidity_stress_level,
        _ => 0.0,
    });
    collector.add_agent_reporter("network_centrality", |a| match a {
        AgentRef::Bank(b) => b.network_centrality,
        AgentRef::CentralBank(cb) => cb.network_centrality,
        AgentRef::Merchant(m) => m.network_centrality,
        AgentRef::Consumer(_) => 0.0,
    });
}
