use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, PaymentId};

/// Why an issued invoice is being cancelled on the provider.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationReason {
    /// Issued with errors; a replacement invoice is referenced.
    #[serde(rename = "02")]
    Correction,
}

impl CancellationReason {
    pub fn code(self) -> &'static str {
        match self {
            CancellationReason::Correction => "02",
        }
    }
}

/// Mapping from a payment to the live provider invoice covering it.
///
/// A global invoice produces one record per included payment, all sharing the
/// same `provider_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub payment_id: PaymentId,
    pub provider_id: String,
    pub issued_at: DateTime<Utc>,
}

impl InvoiceRecord {
    pub fn replacement_window() -> Duration {
        Duration::hours(72)
    }

    /// Invoices may only be replaced within 72h of the payment's creation.
    pub fn ensure_replaceable(payment_created_at: DateTime<Utc>, now: DateTime<Utc>) -> DomainResult<()> {
        if now - payment_created_at > Self::replacement_window() {
            return Err(DomainError::forbidden(
                "invoices can only be regenerated within 72 hours of the payment",
            ));
        }
        Ok(())
    }
}
