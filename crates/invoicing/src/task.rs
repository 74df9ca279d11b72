use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::PaymentId;

/// How a payment will be invoiced.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceTaskKind {
    /// One invoice for one payment, addressed to the owner's billing profile.
    Individual,
    /// Consolidated into the periodic invoice for the generic receiver.
    Global,
}

impl InvoiceTaskKind {
    pub fn for_owner(has_billing_profile: bool) -> Self {
        if has_billing_profile {
            InvoiceTaskKind::Individual
        } else {
            InvoiceTaskKind::Global
        }
    }
}

/// Pending invoice-generation work. Removed only once an invoice is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTask {
    pub payment_id: PaymentId,
    pub kind: InvoiceTaskKind,
    pub queued_at: DateTime<Utc>,
}

impl InvoiceTask {
    pub fn new(payment_id: PaymentId, has_billing_profile: bool, now: DateTime<Utc>) -> Self {
        Self {
            payment_id,
            kind: InvoiceTaskKind::for_owner(has_billing_profile),
            queued_at: now,
        }
    }
}
