//! Order lifecycle: guarded and forced status transitions plus the edits
//! allowed while an order is planned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use atelier_core::{ItemId, Money, OrderId, Percentage};
use atelier_orders::{
    Contract, Discount, ItemUpdate, NewDiscount, NewItem, NewOrder, Order, OrderItem, OrderStatus,
    OrderUpdate, Transition, TransitionContext, check_transition,
};

use crate::error::{BillingError, BillingResult};
use crate::store::BillingStore;

/// Read view of an order with its pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order: Order,
    pub subtotal: Money,
    pub discount: Option<Discount>,
    pub total: Money,
    pub contract: Option<Contract>,
}

#[derive(Clone)]
pub struct OrderStateMachine {
    store: Arc<dyn BillingStore>,
}

impl OrderStateMachine {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub fn create_order(&self, input: NewOrder, now: DateTime<Utc>) -> BillingResult<Order> {
        if self.store.owner(input.owner_id)?.is_none() {
            return Err(BillingError::not_found(format!("owner {}", input.owner_id)));
        }
        let order = Order::create(OrderId::new(), input, now)?;
        self.store.insert_order(order.clone())?;
        info!(order_id = %order.id, "order created");
        Ok(order)
    }

    pub fn update_order(&self, id: OrderId, update: OrderUpdate) -> BillingResult<Order> {
        let mut order = self.order(id)?;
        order.update(update)?;
        self.store.update_order(&order)?;
        Ok(order)
    }

    pub fn order(&self, id: OrderId) -> BillingResult<Order> {
        self.store
            .order(id)?
            .ok_or_else(|| BillingError::not_found(format!("order {id}")))
    }

    /// Admin-initiated status change, subject to the transition rules.
    pub fn request_transition(&self, id: OrderId, target: OrderStatus) -> BillingResult<Transition> {
        let order = self.order(id)?;
        let ctx = TransitionContext {
            item_count: self.store.items(id)?.len(),
            has_contract: self.store.contract(id)?.is_some(),
            payment_count: self.store.payments_for_order(id)?.len(),
        };

        let transition = check_transition(order.status, target, &ctx)?;
        if let Transition::Apply { from, to } = transition {
            self.store.set_order_status(id, to)?;
            info!(order_id = %id, from = %from, to = %to, "order transition applied");
        }
        Ok(transition)
    }

    /// Set the status directly, bypassing the transition rules.
    ///
    /// Only settlement and overdue detection use this; it is the sole way out
    /// of `PaymentRequired` into the active statuses.
    pub(crate) fn force_transition(&self, id: OrderId, target: OrderStatus) -> BillingResult<()> {
        match self.store.order(id)? {
            Some(order) if order.status == target => Ok(()),
            Some(order) => {
                self.store.set_order_status(id, target)?;
                info!(order_id = %id, from = %order.status, to = %target, "order status forced");
                Ok(())
            }
            None => Err(BillingError::service(
                "reconciliation",
                format!("order {id} vanished during a forced transition"),
            )),
        }
    }

    fn modifiable_order(&self, id: OrderId) -> BillingResult<Order> {
        let order = self.order(id)?;
        order.ensure_modifiable()?;
        Ok(order)
    }

    pub fn add_item(&self, order_id: OrderId, input: NewItem) -> BillingResult<OrderItem> {
        self.modifiable_order(order_id)?;
        let item = OrderItem::create(ItemId::new(), order_id, input)?;
        self.store.insert_item(item.clone())?;
        Ok(item)
    }

    pub fn update_item(&self, item_id: ItemId, update: ItemUpdate) -> BillingResult<OrderItem> {
        let mut item = self.item(item_id)?;
        self.modifiable_order(item.order_id)?;
        item.apply(update)?;
        self.store.update_item(&item)?;
        Ok(item)
    }

    pub fn remove_item(&self, item_id: ItemId) -> BillingResult<()> {
        let item = self.item(item_id)?;
        self.modifiable_order(item.order_id)?;
        self.store.delete_item(item_id)?;
        Ok(())
    }

    fn item(&self, id: ItemId) -> BillingResult<OrderItem> {
        self.store
            .item(id)?
            .ok_or_else(|| BillingError::not_found(format!("item {id}")))
    }

    /// Attach a discount, replacing the current one in the same unit of work.
    pub fn set_discount(&self, order_id: OrderId, input: NewDiscount) -> BillingResult<Discount> {
        self.modifiable_order(order_id)?;
        let discount = Discount::create(order_id, input)?;
        self.store.replace_discount(discount.clone())?;
        info!(order_id = %order_id, percentage = %discount.percentage, "discount set");
        Ok(discount)
    }

    pub fn remove_discount(&self, order_id: OrderId) -> BillingResult<()> {
        self.modifiable_order(order_id)?;
        if !self.store.delete_discount(order_id)? {
            return Err(BillingError::forbidden("order has no active discount"));
        }
        Ok(())
    }

    pub fn save_contract(&self, order_id: OrderId, contract: Contract) -> BillingResult<()> {
        let order = self.modifiable_order(order_id)?;
        contract.validate(order.terms.is_recurring)?;
        self.store.replace_contract(order_id, contract)?;
        Ok(())
    }

    pub fn order_summary(&self, order_id: OrderId) -> BillingResult<OrderSummary> {
        let order = self.order(order_id)?;
        let subtotal: Money = self.store.items(order_id)?.iter().map(|i| i.cost).sum();
        let discount = self.store.discount(order_id)?;
        let percentage = discount.as_ref().map_or(Percentage::ZERO, |d| d.percentage);

        Ok(OrderSummary {
            subtotal,
            total: subtotal - percentage.of(subtotal),
            discount,
            contract: self.store.contract(order_id)?,
            order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, new_item, sample_contract};

    #[test]
    fn planning_order_without_items_cannot_request_payment() {
        let h = Harness::new();
        let order = h.planned_order(false);

        let err = h
            .engine
            .orders()
            .request_transition(order.id, OrderStatus::PaymentRequired)
            .unwrap_err();
        assert!(matches!(err, BillingError::Forbidden(_)));
    }

    #[test]
    fn planning_order_needs_a_contract() {
        let h = Harness::new();
        let order = h.planned_order(false);
        let orders = h.engine.orders();
        orders.add_item(order.id, new_item(100)).unwrap();

        assert!(orders.request_transition(order.id, OrderStatus::PaymentRequired).is_err());

        orders.save_contract(order.id, sample_contract(false)).unwrap();
        let applied = orders
            .request_transition(order.id, OrderStatus::PaymentRequired)
            .unwrap();
        assert_eq!(
            applied,
            Transition::Apply {
                from: OrderStatus::Planning,
                to: OrderStatus::PaymentRequired
            }
        );
        assert_eq!(orders.order(order.id).unwrap().status, OrderStatus::PaymentRequired);
    }

    #[test]
    fn same_status_is_a_no_op() {
        let h = Harness::new();
        let order = h.planned_order(false);
        assert_eq!(
            h.engine
                .orders()
                .request_transition(order.id, OrderStatus::Planning)
                .unwrap(),
            Transition::Unchanged
        );
    }

    #[test]
    fn return_to_planning_is_blocked_by_recorded_payments() {
        let h = Harness::new();
        let order = h.payable_order(&[100], false);
        h.record_payment(order.id, Money::from_units(100));

        let err = h
            .engine
            .orders()
            .request_transition(order.id, OrderStatus::Planning)
            .unwrap_err();
        assert!(matches!(err, BillingError::Forbidden(_)));
    }

    #[test]
    fn payment_gate_cannot_be_skipped() {
        let h = Harness::new();
        let order = h.payable_order(&[100], false);
        let err = h
            .engine
            .orders()
            .request_transition(order.id, OrderStatus::Development)
            .unwrap_err();
        assert_eq!(err, BillingError::forbidden("cannot skip the payment gate"));
    }

    #[test]
    fn forced_transition_bypasses_rules() {
        let h = Harness::new();
        let order = h.payable_order(&[100], false);
        let orders = h.engine.orders();

        orders.force_transition(order.id, OrderStatus::OnHold).unwrap();
        orders.request_transition(order.id, OrderStatus::Development).unwrap();
        orders.request_transition(order.id, OrderStatus::Completed).unwrap();

        assert!(orders.request_transition(order.id, OrderStatus::Development).is_err());
    }

    #[test]
    fn items_and_discounts_are_frozen_outside_planning() {
        let h = Harness::new();
        let order = h.payable_order(&[100], false);
        let orders = h.engine.orders();

        assert!(matches!(
            orders.add_item(order.id, new_item(50)),
            Err(BillingError::Forbidden(_))
        ));
        assert!(matches!(
            orders.set_discount(order.id, h.discount(10, false)),
            Err(BillingError::Forbidden(_))
        ));
    }

    #[test]
    fn setting_a_discount_replaces_the_previous_one() {
        let h = Harness::new();
        let order = h.planned_order(false);
        let orders = h.engine.orders();
        orders.add_item(order.id, new_item(200)).unwrap();

        orders.set_discount(order.id, h.discount(10, false)).unwrap();
        orders.set_discount(order.id, h.discount(25, true)).unwrap();

        let summary = orders.order_summary(order.id).unwrap();
        assert_eq!(summary.discount.map(|d| d.percentage.value()), Some(25));
        assert_eq!(summary.subtotal, Money::from_units(200));
        assert_eq!(summary.total, Money::from_units(150));
    }

    #[test]
    fn removing_a_missing_discount_is_forbidden() {
        let h = Harness::new();
        let order = h.planned_order(false);
        assert!(matches!(
            h.engine.orders().remove_discount(order.id),
            Err(BillingError::Forbidden(_))
        ));
    }

    #[test]
    fn recurring_contract_requires_usage_limits() {
        let h = Harness::new();
        let order = h.planned_order(true);
        let orders = h.engine.orders();

        assert!(matches!(
            orders.save_contract(order.id, sample_contract(false)),
            Err(BillingError::Forbidden(_))
        ));
        orders.save_contract(order.id, sample_contract(true)).unwrap();
    }

    #[test]
    fn unknown_owner_cannot_create_orders() {
        let h = Harness::new();
        let mut input = h.new_order(false);
        input.owner_id = atelier_core::OwnerId::new();
        assert!(matches!(
            h.engine.orders().create_order(input, Utc::now()),
            Err(BillingError::NotFound(_))
        ));
    }
}
