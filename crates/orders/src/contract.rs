//! Service contract attached to an order before it leaves planning.

use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult};

use crate::order::validate_text;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    Feature,
    Technology,
    TechnicalRestriction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub description: String,
    pub kind: GoalKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliverable {
    pub label: String,
    pub description: String,
    pub method: String,
    pub acceptance: String,
}

/// A usage cap for recurring services (e.g. "monthly edits", "hours", 10).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLimit {
    pub label: String,
    pub unit: String,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub goals: Vec<Goal>,
    pub deliverables: Vec<Deliverable>,
    pub usage_limits: Vec<UsageLimit>,
}

impl Contract {
    pub const MAX_ENTRIES: usize = 30;

    /// Validate the contract content for an order.
    ///
    /// Recurring orders must define at least one usage limit.
    pub fn validate(&self, is_recurring: bool) -> DomainResult<()> {
        check_count("goals", self.goals.len(), 1)?;
        check_count("deliverables", self.deliverables.len(), 1)?;
        check_count("usage limits", self.usage_limits.len(), 0)?;

        for goal in &self.goals {
            validate_text("goal description", &goal.description, 140)?;
        }
        for d in &self.deliverables {
            validate_text("deliverable label", &d.label, 60)?;
            validate_text("deliverable description", &d.description, 140)?;
            validate_text("deliverable method", &d.method, 60)?;
            validate_text("deliverable acceptance", &d.acceptance, 220)?;
        }
        for limit in &self.usage_limits {
            validate_text("usage limit label", &limit.label, 60)?;
            validate_text("usage limit unit", &limit.unit, 30)?;
            if limit.amount == 0 {
                return Err(DomainError::validation("usage limit amount must be positive"));
            }
        }

        if is_recurring && self.usage_limits.is_empty() {
            return Err(DomainError::forbidden(
                "recurring orders need at least one usage limit",
            ));
        }
        Ok(())
    }
}

fn check_count(field: &str, len: usize, min: usize) -> DomainResult<()> {
    if len < min || len > Contract::MAX_ENTRIES {
        return Err(DomainError::validation(format!(
            "{field} must have between {min} and {} entries",
            Contract::MAX_ENTRIES
        )));
    }
    Ok(())
}
