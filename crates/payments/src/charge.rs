use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::OrderId;

/// An in-flight recurring-charge retry cycle. At most one per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCharge {
    pub order_id: OrderId,
    pub attempt_count: u8,
    pub created_at: DateTime<Utc>,
}

impl PendingCharge {
    pub const MAX_ATTEMPTS: u8 = 3;

    pub fn new(order_id: OrderId, now: DateTime<Utc>) -> Self {
        Self {
            order_id,
            attempt_count: 0,
            created_at: now,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= Self::MAX_ATTEMPTS
    }

    pub fn record_failure(&mut self) {
        self.attempt_count = (self.attempt_count + 1).min(Self::MAX_ATTEMPTS);
    }
}
