//! Embedded sales tax accumulated from settled payments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::Money;

/// Tax embedded in a gross amount: `amount - floor(amount / 1.16)`.
///
/// The net part is floored to whole currency units, so the tax portion also
/// carries the amount's cents.
pub fn embedded_tax(amount: Money) -> Money {
    let whole_net_units = amount.cents().div_euclid(116);
    amount - Money::from_units(whole_net_units)
}

/// One ledger row, appended per settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxEntry {
    pub id: u64,
    pub amount: Money,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxSummary {
    pub amount: Money,
    /// Highest entry id included, used to clear the reviewed entries.
    pub last_entry: Option<u64>,
}

impl TaxSummary {
    pub fn from_entries(entries: &[TaxEntry]) -> Self {
        Self {
            amount: entries.iter().map(|e| e.amount).sum(),
            last_entry: entries.iter().map(|e| e.id).max(),
        }
    }
}
