//! Agent populations of the banking economy.
//!
//! Agents never hold a reference to the model. Each tick the scheduler
//! hands them a read-only [`TickSnapshot`](crate::snapshot::TickSnapshot),
//! the random stream, and whatever slices of the population they are
//! allowed to read or mutate.

pub mod central_bank;
pub mod commercial_bank;
pub mod consumer;
pub mod merchant;
pub mod risk_manager;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::money::{BankId, ConsumerId, MerchantId};

pub use central_bank::CentralBank;
pub use commercial_bank::{BankType, CommercialBank};
pub use consumer::Consumer;
pub use merchant::Merchant;
pub use risk_manager::RiskManager;

/// Identity of any agent in the economy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentId {
    CentralBank,
    Bank(BankId),
    Consumer(ConsumerId),
    Merchant(MerchantId),
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentId::CentralBank => write!(f, "central_bank"),
            AgentId::Bank(id) => id.fmt(f),
            AgentId::Consumer(id) => id.fmt(f),
            AgentId::Merchant(id) => id.fmt(f),
        }
    }
}

/// Borrowed view of one agent, handed to per-agent reporters
#[derive(Debug, Clone, Copy)]
pub enum AgentRef<'a> {
    CentralBank(&'a CentralBank),
    Bank(&'a CommercialBank),
    Consumer(&'a Consumer),
    Merchant(&'a Merchant),
}

impl AgentRef<'_> {
    pub fn id(&self) -> AgentId {
        match self {
            AgentRef::CentralBank(_) => AgentId::CentralBank,
            AgentRef::Bank(b) => AgentId::Bank(b.id),
            AgentRef::Consumer(c) => AgentId::Consumer(c.id),
            AgentRef::Merchant(m) => AgentId::Merchant(m.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralityMeasure {
    Degree,
    Betweenness,
    Closeness,
    Eigenvector,
}

impl CentralityMeasure {
    pub const ALL: [CentralityMeasure; 4] = [
        CentralityMeasure::Degree,
        CentralityMeasure::Betweenness,
        CentralityMeasure::Closeness,
        CentralityMeasure::Eigenvector,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CentralityMeasure::Degree => "degree",
            CentralityMeasure::Betweenness => "betweenness",
            CentralityMeasure::Closeness => "closeness",
            CentralityMeasure::Eigenvector => "eigenvector",
        }
    }
}

/// The four network-centrality measures, each kept in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Centrality {
    pub degree: f64,
    pub betweenness: f64,
    pub closeness: f64,
    pub eigenvector: f64,
}

impl Centrality {
    pub fn get(&self, measure: CentralityMeasure) -> f64 {
        match measure {
            CentralityMeasure::Degree => self.degree,
            CentralityMeasure::Betweenness => self.betweenness,
            CentralityMeasure::Closeness => self.closeness,
            CentralityMeasure::Eigenvector => self.eigenvector,
        }
    }

    pub fn get_mut(&mut self, measure: CentralityMeasure) -> &mut f64 {
        match measure {
            CentralityMeasure::Degree => &mut self.degree,
            CentralityMeasure::Betweenness => &mut self.betweenness,
            CentralityMeasure::Closeness => &mut self.closeness,
            CentralityMeasure::Eigenvector => &mut self.eigenvector,
        }
    }

    pub fn is_bounded(&self) -> bool {
        CentralityMeasure::ALL
            .iter()
            .all(|m| (0.0..=1.0).contains(&self.get(*m)))
    }
}

/// Clamp into [0, 1], mapping NaN to 0
pub(crate) fn unit_clamp(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Ratio with a documented fallback for an empty denominator
pub(crate) fn ratio_or(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        fallback
    }
}
