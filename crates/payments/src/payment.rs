use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{Entity, Money, OrderId, PaymentId, Percentage};

use crate::means::PaymentMeans;

/// The permanent financial record of a settled payment. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub means: PaymentMeans,
    /// Discount in effect when the payment was initiated.
    pub applied_discount: Percentage,
    /// Gateway intent that produced this payment (`None` for fully discounted payments).
    pub gateway_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Payment {
    /// A payment settled without a gateway (100% discount).
    pub fn fully_discounted(id: PaymentId, order_id: OrderId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            order_id,
            amount: Money::ZERO,
            means: PaymentMeans::Unknown,
            applied_discount: Percentage::FULL,
            gateway_intent_id: None,
            created_at: now,
        }
    }

    /// Whether the payment was created in the same calendar month as `now`.
    pub fn in_month_of(&self, now: DateTime<Utc>) -> bool {
        self.created_at.year() == now.year() && self.created_at.month() == now.month()
    }
}
