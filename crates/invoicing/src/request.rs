use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use atelier_payments::PaymentMeans;

use crate::concept::InvoiceConcept;

/// An owner's fiscal identity registered with the invoicing provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingProfile {
    pub provider_client_id: String,
    /// Invoice usage code; the configured default applies when absent.
    pub cfdi_use: Option<String>,
}

/// Calendar month covered by a global invoice.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPeriod {
    pub year: i32,
    pub month: u32,
}

impl GlobalPeriod {
    /// Monthly periodicity code.
    pub const PERIODICITY: &'static str = "04";

    pub fn containing(now: DateTime<Utc>) -> Self {
        Self {
            year: now.year(),
            month: now.month(),
        }
    }

    /// Two-digit month code, `"01"..="12"`.
    pub fn month_code(&self) -> String {
        format!("{:02}", self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum InvoiceScope {
    Individual,
    Global { period: GlobalPeriod },
}

/// Everything the provider needs to issue one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub receiver_id: String,
    pub cfdi_use: String,
    pub means: PaymentMeans,
    pub scope: InvoiceScope,
    pub concepts: Vec<InvoiceConcept>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_uses_calendar_month() {
        let period = GlobalPeriod::containing(Utc.with_ymd_and_hms(2025, 7, 31, 23, 59, 0).unwrap());
        assert_eq!(period.year, 2025);
        assert_eq!(period.month_code(), "07");
    }
}
