//! Money tiers, payment instruments and the CBDC holding limits.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConsumerId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BankId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MerchantId(pub usize);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer_{}", self.0)
    }
}

impl fmt::Display for BankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bank_{}", self.0)
    }
}

impl fmt::Display for MerchantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "merchant_{}", self.0)
    }
}

/// Instrument used to settle a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Cbdc,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::BankTransfer,
        PaymentMethod::Cbdc,
    ];

    /// Position in per-method arrays
    pub fn index(self) -> usize {
        match self {
            PaymentMethod::Cash => 0,
            PaymentMethod::Card => 1,
            PaymentMethod::BankTransfer => 2,
            PaymentMethod::Cbdc => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cbdc => "cbdc",
        }
    }

    /// Money tier the instrument draws on
    pub fn tier(self) -> MoneyTier {
        match self {
            PaymentMethod::Cash => MoneyTier::Banknotes,
            PaymentMethod::Card | PaymentMethod::BankTransfer => MoneyTier::Deposits,
            PaymentMethod::Cbdc => MoneyTier::Cbdc,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Banknotes and CBDC are central-bank liabilities, deposits are owed by a
/// commercial bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneyTier {
    Banknotes,
    Deposits,
    Cbdc,
}

/// A consumer's portfolio across the money tiers plus illiquid assets
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Holdings {
    pub bank_deposits: f64,
    pub banknotes: f64,
    pub cbdc: f64,
    pub other_assets: f64,
}

impl Holdings {
    pub fn total(&self) -> f64 {
        self.bank_deposits + self.banknotes + self.cbdc + self.other_assets
    }

    /// Balances usable for payments
    pub fn liquid(&self) -> f64 {
        self.bank_deposits + self.banknotes + self.cbdc
    }

    pub fn balance(&self, tier: MoneyTier) -> f64 {
        match tier {
            MoneyTier::Banknotes => self.banknotes,
            MoneyTier::Deposits => self.bank_deposits,
            MoneyTier::Cbdc => self.cbdc,
        }
    }

    pub fn balance_mut(&mut self, tier: MoneyTier) -> &mut f64 {
        match tier {
            MoneyTier::Banknotes => &mut self.banknotes,
            MoneyTier::Deposits => &mut self.bank_deposits,
            MoneyTier::Cbdc => &mut self.cbdc,
        }
    }

    /// Take `amount` out of the liquid tiers in proportion to their balances.
    ///
    /// Returns what was actually withdrawn, which is less than `amount` only
    /// when liquid balances run out.
    pub fn draw_down_proportionally(&mut self, amount: f64) -> f64 {
        let liquid = self.liquid();
        if amount <= 0.0 || liquid <= 0.0 {
            return 0.0;
        }
        if amount >= liquid {
            self.bank_deposits = 0.0;
            self.banknotes = 0.0;
            self.cbdc = 0.0;
            return liquid;
        }
        let keep = 1.0 - amount / liquid;
        self.bank_deposits *= keep;
        self.banknotes *= keep;
        self.cbdc *= keep;
        amount
    }
}

/// Per-consumer CBDC limits. `None` means unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CbdcLimits {
    /// Maximum CBDC balance a consumer may hold
    pub wallet_cap: Option<f64>,
    /// Length of the reduced-cap period after a consumer adopts
    pub cooling_period_steps: usize,
    /// Balance cap while in the cooling period
    pub cooling_period_cap: Option<f64>,
    /// Maximum funding into CBDC per step
    pub transfer_cap_per_step: Option<f64>,
    /// Maximum redemption out of CBDC per step
    pub redemption_cap_per_step: Option<f64>,
}

impl Default for CbdcLimits {
    fn default() -> Self {
        CbdcLimits::unlimited()
    }
}

impl CbdcLimits {
    pub fn unlimited() -> Self {
        CbdcLimits {
            wallet_cap: None,
            cooling_period_steps: 0,
            cooling_period_cap: None,
            transfer_cap_per_step: None,
            redemption_cap_per_step: None,
        }
    }

    /// Holding limits in the style of the tiered-CBDC proposals
    pub fn holding_limits() -> Self {
        CbdcLimits {
            wallet_cap: Some(3000.0),
            cooling_period_steps: 6,
            cooling_period_cap: Some(1000.0),
            transfer_cap_per_step: Some(1000.0),
            redemption_cap_per_step: Some(1000.0),
        }
    }

    /// Balance ceiling for a consumer who adopted `steps_since_adoption` ago
    pub fn holding_cap(&self, steps_since_adoption: usize) -> f64 {
        let mut cap = self.wallet_cap.unwrap_or(f64::INFINITY);
        if steps_since_adoption < self.cooling_period_steps {
            if let Some(cooling) = self.cooling_period_cap {
                cap = cap.min(cooling);
            }
        }
        cap
    }

    /// How much more CBDC can be funded this step
    pub fn funding_room(&self, current_cbdc: f64, funded_this_step: f64, steps_since_adoption: usize) -> f64 {
        let balance_room = (self.holding_cap(steps_since_adoption) - current_cbdc).max(0.0);
        let transfer_room = self
            .transfer_cap_per_step
            .map_or(f64::INFINITY, |cap| (cap - funded_this_step).max(0.0));
        balance_room.min(transfer_room)
    }

    /// How much more CBDC can be redeemed this step
    pub fn redemption_room(&self, redeemed_this_step: f64) -> f64 {
        self.redemption_cap_per_step
            .map_or(f64::INFINITY, |cap| (cap - redeemed_this_step).max(0.0))
    }
}

/// Payment volumes and counts keyed by instrument.
///
/// Agents write into a per-tick ledger which the model merges into the
/// run totals at the tick boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionLedger {
    volumes: [f64; 4],
    counts: [u64; 4],
}

impl TransactionLedger {
    pub fn record(&mut self, method: PaymentMethod, amount: f64) {
        self.volumes[method.index()] += amount;
        self.counts[method.index()] += 1;
    }

    pub fn volume(&self, method: PaymentMethod) -> f64 {
        self.volumes[method.index()]
    }

    pub fn count(&self, method: PaymentMethod) -> u64 {
        self.counts[method.index()]
    }

    pub fn total_volume(&self) -> f64 {
        self.volumes.iter().sum()
    }

    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Share of volume settled with `method`; 0.0 for an empty ledger
    pub fn share(&self, method: PaymentMethod) -> f64 {
        let total = self.total_volume();
        if total > 0.0 {
            self.volume(method) / total
        } else {
            0.0
        }
    }

    pub fn merge(&mut self, other: &TransactionLedger) {
        for i in 0..4 {
            self.volumes[i] += other.volumes[i];
            self.counts[i] += other.counts[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn proportional_draw_down_keeps_mix() {
        let mut h = Holdings {
            bank_deposits: 600.0,
            banknotes: 100.0,
            cbdc: 300.0,
            other_assets: 500.0,
        };
        let taken = h.draw_down_proportionally(100.0);

        assert_relative_eq!(taken, 100.0);
        assert_relative_eq!(h.bank_deposits, 540.0);
        assert_relative_eq!(h.banknotes, 90.0);
        assert_relative_eq!(h.cbdc, 270.0);
        assert_relative_eq!(h.other_assets, 500.0);
    }

    #[test]
    fn draw_down_stops_at_liquid_balance() {
        let mut h = Holdings {
            bank_deposits: 10.0,
            banknotes: 5.0,
            cbdc: 0.0,
            other_assets: 100.0,
        };
        let taken = h.draw_down_proportionally(50.0);

        assert_relative_eq!(taken, 15.0);
        assert_eq!(h.liquid(), 0.0);
        assert_relative_eq!(h.total(), 100.0);
    }

    #[test]
    fn unlimited_wallet_has_unbounded_room() {
        let limits = CbdcLimits::unlimited();
        assert!(limits.funding_room(1e9, 1e9, 0).is_infinite());
        assert!(limits.redemption_room(1e9).is_infinite());
    }

    #[test]
    fn cooling_period_tightens_cap() {
        let limits = CbdcLimits::holding_limits();

        assert_relative_eq!(limits.holding_cap(0), 1000.0);
        assert_relative_eq!(limits.holding_cap(5), 1000.0);
        assert_relative_eq!(limits.holding_cap(6), 3000.0);
    }

    #[test]
    fn funding_room_takes_tightest_limit() {
        let limits = CbdcLimits::holding_limits();

        // Balance room 2500, transfer room 1000 - 400
        assert_relative_eq!(limits.funding_room(500.0, 400.0, 10), 600.0);
        // Over the cap: no room at all
        assert_relative_eq!(limits.funding_room(3500.0, 0.0, 10), 0.0);
    }

    #[test]
    fn ledger_shares() {
        let mut ledger = TransactionLedger::default();
        assert_eq!(ledger.share(PaymentMethod::Cbdc), 0.0);

        ledger.record(PaymentMethod::Cbdc, 30.0);
        ledger.record(PaymentMethod::Cash, 10.0);
        ledger.record(PaymentMethod::Card, 60.0);

        assert_relative_eq!(ledger.share(PaymentMethod::Cbdc), 0.3);
        assert_eq!(ledger.total_count(), 3);

        let mut total = TransactionLedger::default();
        total.merge(&ledger);
        total.merge(&ledger);
        assert_relative_eq!(total.volume(PaymentMethod::Card), 120.0);
        assert_eq!(total.count(PaymentMethod::Cash), 2);
    }
}
