use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult};

/// Funding source of a card, as reported by the gateway.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardFunding {
    Credit,
    Debit,
    Prepaid,
    Unknown,
}

/// What kind of payment method settled a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MethodKind {
    /// Bank transfer credited to the customer's gateway balance.
    CustomerBalance,
    Card { funding: CardFunding },
    Other { name: String },
}

/// Normalized payment-means code recorded on payments and invoices.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMeans {
    #[serde(rename = "03")]
    BankTransfer,
    #[serde(rename = "04")]
    CreditCard,
    #[serde(rename = "28")]
    DebitCard,
    /// Neutral code for payments settled without money changing hands.
    #[serde(rename = "99")]
    Unknown,
}

impl PaymentMeans {
    pub fn code(self) -> &'static str {
        match self {
            PaymentMeans::BankTransfer => "03",
            PaymentMeans::CreditCard => "04",
            PaymentMeans::DebitCard => "28",
            PaymentMeans::Unknown => "99",
        }
    }

    pub fn from_code(code: &str) -> DomainResult<Self> {
        match code {
            "03" => Ok(PaymentMeans::BankTransfer),
            "04" => Ok(PaymentMeans::CreditCard),
            "28" => Ok(PaymentMeans::DebitCard),
            "99" => Ok(PaymentMeans::Unknown),
            other => Err(DomainError::validation(format!(
                "unknown payment means code '{other}'"
            ))),
        }
    }

    /// Map a settled method to its code. Non-credit cards are recorded as debit.
    pub fn classify(kind: &MethodKind) -> DomainResult<Self> {
        match kind {
            MethodKind::CustomerBalance => Ok(PaymentMeans::BankTransfer),
            MethodKind::Card {
                funding: CardFunding::Credit,
            } => Ok(PaymentMeans::CreditCard),
            MethodKind::Card { .. } => Ok(PaymentMeans::DebitCard),
            MethodKind::Other { name } => Err(DomainError::validation(format!(
                "payment method '{name}' cannot be classified"
            ))),
        }
    }
}

impl core::fmt::Display for PaymentMeans {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}
