//! Guarded status transitions (admin-initiated).
//!
//! `check_transition` only decides; it never mutates. Settlement and overdue
//! detection move orders through a separate forced path in the service layer
//! and do not consult these rules. `PaymentRequired` is left forward only by
//! settlement, never through this function.

use atelier_core::{DomainError, DomainResult};

use crate::order::OrderStatus;

/// Facts about an order that the transition rules depend on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionContext {
    pub item_count: usize,
    pub has_contract: bool,
    pub payment_count: usize,
}

/// Outcome of a guarded transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The order is already in the requested status.
    Unchanged,
    /// The status change is allowed.
    Apply { from: OrderStatus, to: OrderStatus },
}

pub fn check_transition(
    current: OrderStatus,
    target: OrderStatus,
    ctx: &TransitionContext,
) -> DomainResult<Transition> {
    if current == target {
        return Ok(Transition::Unchanged);
    }

    if current.is_terminal() {
        return Err(DomainError::forbidden(format!(
            "order is {current} and can no longer change status"
        )));
    }

    if current == OrderStatus::Planning && target != OrderStatus::PaymentRequired {
        return Err(DomainError::forbidden(
            "a planned order must go through payment_required first",
        ));
    }

    if target == OrderStatus::PaymentRequired && current != OrderStatus::Planning {
        return Err(DomainError::forbidden(
            "payment_required can only be reached from planning",
        ));
    }

    if current == OrderStatus::Planning {
        if ctx.item_count < 1 {
            return Err(DomainError::forbidden(
                "order needs at least one item before requesting payment",
            ));
        }
        if !ctx.has_contract {
            return Err(DomainError::forbidden(
                "order needs a saved contract before requesting payment",
            ));
        }
    }

    if target == OrderStatus::Planning && current != OrderStatus::PaymentRequired {
        return Err(DomainError::forbidden(
            "planning can only be reached again from payment_required",
        ));
    }

    if current == OrderStatus::PaymentRequired {
        if target != OrderStatus::Planning {
            return Err(DomainError::forbidden("cannot skip the payment gate"));
        }
        if ctx.payment_count > 0 {
            return Err(DomainError::forbidden(
                "order already has recorded payments and cannot return to planning",
            ));
        }
    }

    Ok(Transition::Apply {
        from: current,
        to: target,
    })
}
