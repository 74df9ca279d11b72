use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, Entity, OrderId, OwnerId};

/// Order status lifecycle.
///
/// `Cancelled` and `Completed` are terminal. `Development`, `Production`,
/// `Maintenance` and `ClientReview` are the statuses in which an order is
/// billable by the recurring scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Planning,
    PaymentRequired,
    Development,
    Production,
    Maintenance,
    ClientReview,
    OnHold,
    Archived,
    Cancelled,
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 10] = [
        OrderStatus::Planning,
        OrderStatus::PaymentRequired,
        OrderStatus::Development,
        OrderStatus::Production,
        OrderStatus::Maintenance,
        OrderStatus::ClientReview,
        OrderStatus::OnHold,
        OrderStatus::Archived,
        OrderStatus::Cancelled,
        OrderStatus::Completed,
    ];

    /// Statuses in which work is under way and the next charge may fall due.
    pub const PAYMENT_ELIGIBLE: [OrderStatus; 4] = [
        OrderStatus::Development,
        OrderStatus::Production,
        OrderStatus::Maintenance,
        OrderStatus::ClientReview,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Completed)
    }

    pub fn is_payment_eligible(self) -> bool {
        Self::PAYMENT_ELIGIBLE.contains(&self)
    }

    /// Stable numeric code used by persistence and external payloads.
    pub fn code(self) -> u8 {
        match self {
            OrderStatus::Planning => 1,
            OrderStatus::PaymentRequired => 2,
            OrderStatus::Development => 3,
            OrderStatus::Production => 4,
            OrderStatus::Maintenance => 5,
            OrderStatus::ClientReview => 6,
            OrderStatus::OnHold => 7,
            OrderStatus::Archived => 8,
            OrderStatus::Cancelled => 9,
            OrderStatus::Completed => 10,
        }
    }

    pub fn from_code(code: u8) -> DomainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or_else(|| DomainError::validation(format!("unknown order status code {code}")))
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            OrderStatus::Planning => "planning",
            OrderStatus::PaymentRequired => "payment_required",
            OrderStatus::Development => "development",
            OrderStatus::Production => "production",
            OrderStatus::Maintenance => "maintenance",
            OrderStatus::ClientReview => "client_review",
            OrderStatus::OnHold => "on_hold",
            OrderStatus::Archived => "archived",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// Duration and billing cadence of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTerms {
    pub duration_weeks: u32,
    pub installments: u32,
    pub is_recurring: bool,
}

impl OrderTerms {
    pub const MIN_WEEKS: u32 = 2;
    pub const MAX_WEEKS: u32 = 48;
    pub const MAX_INSTALLMENTS: u32 = 12;
    pub const RECURRING_WEEKS: u32 = 4;

    /// Validate the terms.
    ///
    /// Invariants: `installments <= floor(duration_weeks / 2)`; a recurring
    /// order runs exactly 4 weeks with a single installment.
    pub fn new(duration_weeks: u32, installments: u32, is_recurring: bool) -> DomainResult<Self> {
        if !(Self::MIN_WEEKS..=Self::MAX_WEEKS).contains(&duration_weeks) || duration_weeks % 2 != 0 {
            return Err(DomainError::validation(format!(
                "duration must be an even number of weeks between {} and {} (got {duration_weeks})",
                Self::MIN_WEEKS,
                Self::MAX_WEEKS
            )));
        }

        if !(1..=Self::MAX_INSTALLMENTS).contains(&installments) {
            return Err(DomainError::validation(format!(
                "installments must be between 1 and {} (got {installments})",
                Self::MAX_INSTALLMENTS
            )));
        }

        if is_recurring && (duration_weeks != Self::RECURRING_WEEKS || installments != 1) {
            return Err(DomainError::forbidden(
                "recurring orders must run 4 weeks with a single installment",
            ));
        }

        if installments > duration_weeks / 2 {
            return Err(DomainError::forbidden(
                "installments are not valid for the given duration",
            ));
        }

        Ok(Self {
            duration_weeks,
            installments,
            is_recurring,
        })
    }
}

/// Input for creating an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub owner_id: OwnerId,
    pub name: String,
    pub description: String,
    pub tag: String,
    pub duration_weeks: u32,
    pub installments: u32,
    pub is_recurring: bool,
    pub portfolio_consent: bool,
}

/// Editable fields of an order while it is being planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub name: String,
    pub description: String,
    pub tag: String,
    pub duration_weeks: u32,
    pub installments: u32,
    pub is_recurring: bool,
    pub portfolio_consent: bool,
}

/// A billable service order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner_id: OwnerId,
    pub name: String,
    pub description: String,
    pub tag: String,
    pub status: OrderStatus,
    pub terms: OrderTerms,
    pub portfolio_consent: bool,
    pub created_at: DateTime<Utc>,
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Order {
    /// Create an order in `Planning` after validating its terms.
    pub fn create(id: OrderId, input: NewOrder, now: DateTime<Utc>) -> DomainResult<Self> {
        let terms = OrderTerms::new(input.duration_weeks, input.installments, input.is_recurring)?;
        validate_text("name", &input.name, 120)?;
        validate_text("tag", &input.tag, 60)?;

        Ok(Self {
            id,
            owner_id: input.owner_id,
            name: input.name,
            description: input.description,
            tag: input.tag,
            status: OrderStatus::Planning,
            terms,
            portfolio_consent: input.portfolio_consent,
            created_at: now,
        })
    }

    /// Orders are editable (items, discount, contract, terms) only while planned.
    pub fn is_modifiable(&self) -> bool {
        self.status == OrderStatus::Planning
    }

    pub fn ensure_modifiable(&self) -> DomainResult<()> {
        if !self.is_modifiable() {
            return Err(DomainError::forbidden("order is not modifiable"));
        }
        Ok(())
    }

    /// Apply an update while the order is still in planning.
    pub fn update(&mut self, update: OrderUpdate) -> DomainResult<()> {
        self.ensure_modifiable()?;
        let terms = OrderTerms::new(update.duration_weeks, update.installments, update.is_recurring)?;
        validate_text("name", &update.name, 120)?;
        validate_text("tag", &update.tag, 60)?;

        self.name = update.name;
        self.description = update.description;
        self.tag = update.tag;
        self.terms = terms;
        self.portfolio_consent = update.portfolio_consent;
        Ok(())
    }
}

pub(crate) fn validate_text(field: &str, value: &str, max_len: usize) -> DomainResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max_len {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(())
}
