use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{OrderId, Percentage};

/// How a payment intent was created.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentOrigin {
    /// Customer-facing checkout started through the payment gate.
    Checkout,
    /// Off-session charge against the stored method of a recurring order.
    Recurring,
}

/// Local record of the (single) live gateway intent of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentRecord {
    pub order_id: OrderId,
    pub gateway_id: String,
    /// Discount snapshot carried over to the payment on settlement.
    pub applied_discount: Percentage,
    pub origin: IntentOrigin,
    pub created_at: DateTime<Utc>,
}

impl PaymentIntentRecord {
    pub fn max_age() -> Duration {
        Duration::hours(24)
    }

    /// Intents 24h old or older are discarded rather than reused.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at >= Self::max_age()
    }
}
