//! Basket, cure, and reserve ledgers.
//!
//! Ledgers are created empty at interpreter construction and persist for
//! the life of that instance. They record consumption facts only; policy
//! (capacity, limits) stays with the declaring statements and is applied
//! by the covenant and waterfall engines.

use std::collections::BTreeMap;

use proviso_core::CureType;

use crate::types::{MutationError, UsageRecord};

// ──────────────────────────────────────────────
// Basket ledger
// ──────────────────────────────────────────────

/// Per-basket usage entry. Invariant: `cumulative_used` equals the sum of
/// `history` amounts; `record_use` is the only writer.
#[derive(Debug, Clone, Default)]
pub struct BasketEntry {
    pub cumulative_used: f64,
    pub history: Vec<UsageRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct BasketLedger {
    entries: BTreeMap<String, BasketEntry>,
}

impl BasketLedger {
    pub fn new() -> BasketLedger {
        BasketLedger::default()
    }

    /// Append a usage record. Never clamps to capacity: overdraft is
    /// representable and is the caller's breach signal.
    pub fn record_use(&mut self, basket: &str, amount: f64, memo: Option<String>, date: Option<String>) {
        let entry = self.entries.entry(basket.to_string()).or_default();
        entry.cumulative_used += amount;
        entry.history.push(UsageRecord { amount, memo, date });
    }

    pub fn used(&self, basket: &str) -> f64 {
        self.entries
            .get(basket)
            .map(|e| e.cumulative_used)
            .unwrap_or(0.0)
    }

    pub fn history(&self, basket: &str) -> &[UsageRecord] {
        self.entries
            .get(basket)
            .map(|e| e.history.as_slice())
            .unwrap_or(&[])
    }

    /// Drop the entry entirely (basket removed by amendment).
    pub fn remove(&mut self, basket: &str) {
        self.entries.remove(basket);
    }

    /// Zero the entry (explicit reset clause on a replacement).
    pub fn reset(&mut self, basket: &str) {
        self.entries.insert(basket.to_string(), BasketEntry::default());
    }
}

// ──────────────────────────────────────────────
// Cure ledger
// ──────────────────────────────────────────────

/// Consumption entry keyed by cure-mechanism identity, not covenant name.
/// Covenants naming the same mechanism share this entry.
#[derive(Debug, Clone)]
pub struct CureEntry {
    pub cure_type: CureType,
    pub uses_consumed: u32,
    pub amount_consumed: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CureLedger {
    entries: BTreeMap<String, CureEntry>,
}

impl CureLedger {
    pub fn new() -> CureLedger {
        CureLedger::default()
    }

    pub fn entry(&self, mechanism: &str) -> Option<&CureEntry> {
        self.entries.get(mechanism)
    }

    pub fn uses_consumed(&self, mechanism: &str) -> u32 {
        self.entries.get(mechanism).map(|e| e.uses_consumed).unwrap_or(0)
    }

    pub fn amount_consumed(&self, mechanism: &str) -> f64 {
        self.entries
            .get(mechanism)
            .map(|e| e.amount_consumed)
            .unwrap_or(0.0)
    }

    /// Record one application of the mechanism.
    pub fn consume(&mut self, mechanism: &str, cure_type: CureType, amount: f64) {
        let entry = self.entries.entry(mechanism.to_string()).or_insert(CureEntry {
            cure_type,
            uses_consumed: 0,
            amount_consumed: 0.0,
        });
        entry.uses_consumed += 1;
        entry.amount_consumed += amount;
    }
}

// ──────────────────────────────────────────────
// Reserve ledger
// ──────────────────────────────────────────────

/// Reserve balances, mutated only through `fund` and `draw`. Balances
/// never go below zero; an overdraw fails whole and changes nothing.
#[derive(Debug, Clone, Default)]
pub struct ReserveLedger {
    balances: BTreeMap<String, f64>,
}

impl ReserveLedger {
    pub fn new() -> ReserveLedger {
        ReserveLedger::default()
    }

    pub fn balance(&self, reserve: &str) -> f64 {
        self.balances.get(reserve).copied().unwrap_or(0.0)
    }

    /// Deposit into a reserve. Returns the new balance.
    pub fn fund(&mut self, reserve: &str, amount: f64) -> f64 {
        let balance = self.balances.entry(reserve.to_string()).or_insert(0.0);
        *balance += amount;
        *balance
    }

    /// Withdraw from a reserve. The draw is all-or-nothing: a balance
    /// short of `amount` fails with `InsufficientReserveBalance` and the
    /// balance is untouched.
    pub fn draw(&mut self, reserve: &str, amount: f64) -> Result<f64, MutationError> {
        let available = self.balance(reserve);
        if amount > available {
            return Err(MutationError::InsufficientReserveBalance {
                reserve: reserve.to_string(),
                requested: amount,
                available,
            });
        }
        let balance = self.balances.entry(reserve.to_string()).or_insert(0.0);
        *balance -= amount;
        Ok(*balance)
    }

    pub fn remove(&mut self, reserve: &str) {
        self.balances.remove(reserve);
    }

    pub fn reset(&mut self, reserve: &str) {
        self.balances.insert(reserve.to_string(), 0.0);
    }
}
