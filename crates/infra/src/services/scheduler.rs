//! Timer-driven billing sweeps: overdue installments, subscription renewals
//! and the bounded-retry pending-charge cycle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{Instrument, error, info, warn};

use atelier_core::{OrderId, Percentage};
use atelier_observability::sweep_span;
use atelier_orders::{
    Order, OrderStatus, PricedLine, allocate_discount, next_installment_due,
    next_subscription_charge,
};
use atelier_payments::{IntentOrigin, PaymentIntentRecord, PendingCharge, TaxSummary};

use crate::config::BillingConfig;
use crate::error::{BillingError, BillingResult, bounded};
use crate::gateway::{OffSessionCharge, PaymentGateway};
use crate::notify::{Notification, Notifier, Recipient, deliver};
use crate::services::orders::OrderStateMachine;
use crate::store::{BillingStore, Owner};
use crate::sweep::{SweepBudget, SweepReport};

/// Result of processing one pending charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChargeOutcome {
    /// Order not eligible for automatic charging right now.
    Skipped,
    Charged,
    /// Gateway rejected the charge; the attempt was counted.
    Declined,
    /// Retry cycle given up; the order is back at the payment gate.
    Abandoned,
}

#[derive(Clone)]
pub struct RecurringBillingScheduler {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    orders: OrderStateMachine,
    config: Arc<BillingConfig>,
}

impl RecurringBillingScheduler {
    pub fn new(
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        orders: OrderStateMachine,
        config: Arc<BillingConfig>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            orders,
            config,
        }
    }

    /// Move non-recurring orders whose next installment has fallen due back
    /// to the payment gate.
    pub async fn sweep_due_installments(
        &self,
        now: DateTime<Utc>,
        budget: Duration,
    ) -> BillingResult<SweepReport> {
        self.run_due_installments(now, SweepBudget::start(budget))
            .instrument(sweep_span("due_installments"))
            .await
    }

    async fn run_due_installments(
        &self,
        now: DateTime<Utc>,
        budget: SweepBudget,
    ) -> BillingResult<SweepReport> {
        let mut report = SweepReport::default();
        let candidates = self.store.orders_with_status(&OrderStatus::PAYMENT_ELIGIBLE)?;

        for order in candidates.into_iter().filter(|o| !o.terms.is_recurring) {
            if budget.exceeded() {
                warn!("time budget exceeded; remaining orders left for next run");
                report.exhausted = true;
                break;
            }
            report.visited += 1;

            match self.installment_due(&order, now) {
                Ok(true) => {}
                Ok(false) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "could not evaluate installment");
                    report.failed += 1;
                    continue;
                }
            }

            match self.orders.force_transition(order.id, OrderStatus::PaymentRequired) {
                Ok(()) => {
                    info!(order_id = %order.id, "installment due; payment required");
                    self.notify_payment_due(&order).await;
                    report.succeeded += 1;
                }
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "failed to flag due installment");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    fn installment_due(&self, order: &Order, now: DateTime<Utc>) -> BillingResult<bool> {
        let payments = self.store.payments_for_order(order.id)?;
        let Some(first) = payments.first() else {
            return Ok(false);
        };
        let made = u32::try_from(payments.len()).unwrap_or(u32::MAX);
        Ok(next_installment_due(first.created_at, made, &order.terms).is_some_and(|due| now >= due))
    }

    /// Queue a pending charge for every recurring order whose month has run out.
    pub fn sweep_due_subscriptions(
        &self,
        now: DateTime<Utc>,
        budget: Duration,
    ) -> BillingResult<SweepReport> {
        let span = sweep_span("due_subscriptions");
        let _guard = span.enter();
        let budget = SweepBudget::start(budget);
        let mut report = SweepReport::default();

        let queued: HashSet<OrderId> = self
            .store
            .pending_charges()?
            .into_iter()
            .map(|c| c.order_id)
            .collect();
        let candidates = self.store.orders_with_status(&OrderStatus::PAYMENT_ELIGIBLE)?;

        for order in candidates
            .into_iter()
            .filter(|o| o.terms.is_recurring && !queued.contains(&o.id))
        {
            if budget.exceeded() {
                warn!("time budget exceeded; remaining orders left for next run");
                report.exhausted = true;
                break;
            }
            report.visited += 1;

            let last_payment = match self.store.payments_for_order(order.id) {
                Ok(payments) => payments.last().map(|p| p.created_at),
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "could not load payments");
                    report.failed += 1;
                    continue;
                }
            };
            let due = last_payment.is_some_and(|last| now >= next_subscription_charge(last));
            if !due {
                report.skipped += 1;
                continue;
            }

            // An off-session charge is already out and its settlement has not landed yet.
            match self.store.intent(order.id) {
                Ok(Some(intent)) if intent.origin == IntentOrigin::Recurring => {
                    info!(order_id = %order.id, intent = %intent.gateway_id, "renewal charge awaiting settlement");
                    report.skipped += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "could not load payment intent");
                    report.failed += 1;
                    continue;
                }
            }

            match self.store.insert_pending_charge(PendingCharge::new(order.id, now)) {
                Ok(true) => {
                    info!(order_id = %order.id, "subscription due; pending charge queued");
                    report.succeeded += 1;
                }
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "failed to queue pending charge");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Attempt the off-session charge of every pending charge.
    pub async fn sweep_pending_charges(
        &self,
        now: DateTime<Utc>,
        budget: Duration,
    ) -> BillingResult<SweepReport> {
        self.run_pending_charges(now, SweepBudget::start(budget))
            .instrument(sweep_span("pending_charges"))
            .await
    }

    async fn run_pending_charges(
        &self,
        now: DateTime<Utc>,
        budget: SweepBudget,
    ) -> BillingResult<SweepReport> {
        let mut report = SweepReport::default();

        for charge in self.store.pending_charges()? {
            if budget.exceeded() {
                warn!("time budget exceeded; remaining charges left for next run");
                report.exhausted = true;
                break;
            }
            report.visited += 1;

            let order_id = charge.order_id;
            match self.process_charge(charge, now).await {
                Ok(ChargeOutcome::Skipped) => report.skipped += 1,
                Ok(ChargeOutcome::Charged | ChargeOutcome::Abandoned) => report.succeeded += 1,
                Ok(ChargeOutcome::Declined) => report.failed += 1,
                Err(e) => {
                    error!(order_id = %order_id, error = %e, "pending charge failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn process_charge(
        &self,
        mut charge: PendingCharge,
        now: DateTime<Utc>,
    ) -> BillingResult<ChargeOutcome> {
        let order = self.store.order(charge.order_id)?.ok_or_else(|| {
            BillingError::service("scheduler", format!("order {} not found", charge.order_id))
        })?;
        if !order.status.is_payment_eligible() || !order.terms.is_recurring {
            return Ok(ChargeOutcome::Skipped);
        }
        let owner = self.store.owner(order.owner_id)?.ok_or_else(|| {
            BillingError::service("scheduler", format!("owner {} not found", order.owner_id))
        })?;

        if charge.is_exhausted() {
            self.abandon(&order, &owner).await?;
            return Ok(ChargeOutcome::Abandoned);
        }

        let Some(payment_method_id) = self.store.payment_method(order.id)? else {
            warn!(order_id = %order.id, "no stored payment method for recurring charge");
            self.abandon(&order, &owner).await?;
            return Ok(ChargeOutcome::Abandoned);
        };
        let customer_id = owner.gateway_customer_id.clone().ok_or_else(|| {
            BillingError::service("payment-gateway", format!("no customer profile for owner {}", owner.id))
        })?;

        let items = self.store.items(order.id)?;
        let discount = self.store.discount(order.id)?;
        let percentage = discount.as_ref().map_or(Percentage::ZERO, |d| d.percentage);
        let lines: Vec<PricedLine> = items.iter().map(PricedLine::from_item).collect();
        let amount = allocate_discount(&lines, percentage)?.per_installment(order.terms.installments);

        self.store.delete_intent(order.id)?;
        let charged = bounded(
            "payment-gateway",
            self.config.collaborator_timeout,
            self.gateway.charge_off_session(OffSessionCharge {
                order_id: order.id,
                amount,
                payment_method_id,
                customer_id,
            }),
        )
        .await;

        match charged {
            Ok(intent_id) => {
                let consume_discount = discount.as_ref().is_some_and(|d| d.disposable);
                self.store.complete_recurring_charge(
                    PaymentIntentRecord {
                        order_id: order.id,
                        gateway_id: intent_id.clone(),
                        applied_discount: percentage,
                        origin: IntentOrigin::Recurring,
                        created_at: now,
                    },
                    consume_discount,
                )?;
                info!(order_id = %order.id, intent = %intent_id, amount = %amount, "recurring charge submitted");
                Ok(ChargeOutcome::Charged)
            }
            Err(e) => {
                charge.record_failure();
                self.store.update_pending_charge(&charge)?;
                warn!(
                    order_id = %order.id,
                    attempt = charge.attempt_count,
                    error = %e,
                    "recurring charge rejected"
                );
                Ok(ChargeOutcome::Declined)
            }
        }
    }

    /// Drop the retry cycle and send the order back to the payment gate.
    async fn abandon(&self, order: &Order, owner: &Owner) -> BillingResult<()> {
        self.store.delete_pending_charge(order.id)?;
        self.orders.force_transition(order.id, OrderStatus::PaymentRequired)?;
        info!(order_id = %order.id, "recurring charge abandoned; payment required");

        let owner_notice = Notification::link(
            recipient(owner),
            "We could not process the payment of one of your services. Please add a different payment method.",
            "Review service",
            self.config.owner_order_url(order.id),
        );
        deliver(self.notifier.as_ref(), owner_notice, self.config.collaborator_timeout).await;

        let operator_notice = Notification::link(
            self.config.operator(),
            "A recurring charge failed; the service is waiting for payment.",
            "Review service",
            self.config.operator_order_url(order.id),
        );
        deliver(self.notifier.as_ref(), operator_notice, self.config.collaborator_timeout).await;
        Ok(())
    }

    async fn notify_payment_due(&self, order: &Order) {
        match self.store.owner(order.owner_id) {
            Ok(Some(owner)) => {
                let notice = Notification::link(
                    recipient(&owner),
                    "One of your services requires its next payment.",
                    "Review service",
                    self.config.owner_order_url(order.id),
                );
                deliver(self.notifier.as_ref(), notice, self.config.collaborator_timeout).await;
            }
            Ok(None) => warn!(order_id = %order.id, "owner missing; skipping owner notice"),
            Err(e) => warn!(order_id = %order.id, error = %e, "could not load owner"),
        }

        let notice = Notification::link(
            self.config.operator(),
            "A service is waiting for the client's next payment.",
            "Review service",
            self.config.operator_order_url(order.id),
        );
        deliver(self.notifier.as_ref(), notice, self.config.collaborator_timeout).await;
    }

    /// Remind the operator to review the accumulated tax.
    pub async fn send_tax_reminder(&self) -> BillingResult<()> {
        let summary = TaxSummary::from_entries(&self.store.tax_entries()?);
        let notice = Notification::link(
            self.config.operator(),
            format!("Review the accumulated tax ({}) in the dashboard.", summary.amount),
            "Open dashboard",
            format!("{}/su", self.config.client_url),
        );
        deliver(self.notifier.as_ref(), notice, self.config.collaborator_timeout).await;
        Ok(())
    }
}

fn recipient(owner: &Owner) -> Recipient {
    Recipient {
        email: owner.email.clone(),
        name: owner.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, OWNER_EMAIL};
    use atelier_core::Money;

    const BUDGET: Duration = Duration::from_secs(10);

    /// A paid order already in development.
    fn active_order(h: &Harness, units: &[i64], recurring: bool) -> Order {
        let order = h.payable_order(units, recurring);
        h.engine
            .orders()
            .force_transition(order.id, OrderStatus::Development)
            .unwrap();
        order
    }

    #[tokio::test]
    async fn overdue_installment_returns_order_to_the_payment_gate() {
        let h = Harness::new();
        let now = Utc::now();
        let order = active_order(&h, &[100], false);
        h.record_payment_at(order.id, Money::from_units(50), now - chrono::Duration::days(29));

        let report = h
            .engine
            .scheduler()
            .sweep_due_installments(now, BUDGET)
            .await
            .unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(h.status(order.id), OrderStatus::PaymentRequired);
        assert_eq!(h.notifier.sent_to(OWNER_EMAIL).len(), 1);
        assert_eq!(h.notifier.sent_to(&h.operator_email()).len(), 1);
    }

    #[tokio::test]
    async fn installment_not_yet_due_is_left_alone() {
        let h = Harness::new();
        let now = Utc::now();
        let order = active_order(&h, &[100], false);
        h.record_payment_at(order.id, Money::from_units(50), now - chrono::Duration::days(10));

        let report = h
            .engine
            .scheduler()
            .sweep_due_installments(now, BUDGET)
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(h.status(order.id), OrderStatus::Development);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn fully_paid_orders_have_no_next_installment() {
        let h = Harness::new();
        let now = Utc::now();
        let order = active_order(&h, &[100], false);
        h.record_payment_at(order.id, Money::from_units(50), now - chrono::Duration::days(60));
        h.record_payment_at(order.id, Money::from_units(50), now - chrono::Duration::days(30));

        h.engine
            .scheduler()
            .sweep_due_installments(now, BUDGET)
            .await
            .unwrap();
        assert_eq!(h.status(order.id), OrderStatus::Development);
    }

    #[tokio::test]
    async fn installment_sweep_ignores_recurring_orders() {
        let h = Harness::new();
        let now = Utc::now();
        let order = active_order(&h, &[100], true);
        h.record_payment_at(order.id, Money::from_units(100), now - chrono::Duration::days(40));

        let report = h
            .engine
            .scheduler()
            .sweep_due_installments(now, BUDGET)
            .await
            .unwrap();
        assert_eq!(report.visited, 0);
    }

    #[test]
    fn due_subscription_queues_one_pending_charge() {
        let h = Harness::new();
        let now = Utc::now();
        let order = active_order(&h, &[100], true);
        h.record_payment_at(order.id, Money::from_units(100), now - chrono::Duration::days(32));
        let scheduler = h.engine.scheduler();

        let report = scheduler.sweep_due_subscriptions(now, BUDGET).unwrap();
        assert_eq!(report.succeeded, 1);
        let report = scheduler.sweep_due_subscriptions(now, BUDGET).unwrap();
        assert_eq!(report.visited, 0);

        let charges = h.store.pending_charges().unwrap();
        assert_eq!(charges.len(), 1);
        assert_eq!(charges[0].order_id, order.id);
        assert_eq!(charges[0].attempt_count, 0);
    }

    #[test]
    fn subscription_within_its_month_is_not_due() {
        let h = Harness::new();
        let now = Utc::now();
        let order = active_order(&h, &[100], true);
        h.record_payment_at(order.id, Money::from_units(100), now - chrono::Duration::days(5));

        let report = h
            .engine
            .scheduler()
            .sweep_due_subscriptions(now, BUDGET)
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert!(h.store.pending_charges().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_charge_is_charged_off_session() {
        let h = Harness::new();
        let now = Utc::now();
        let order = h.discounted_order(&[100], true, h.discount(10, true));
        h.engine
            .orders()
            .force_transition(order.id, OrderStatus::Development)
            .unwrap();
        h.store.set_payment_method(order.id, "pm_saved".to_string()).unwrap();
        h.store.insert_pending_charge(PendingCharge::new(order.id, now)).unwrap();

        let report = h
            .engine
            .scheduler()
            .sweep_pending_charges(now, BUDGET)
            .await
            .unwrap();
        assert_eq!(report.succeeded, 1);

        let charges = h.gateway.charges();
        assert_eq!(charges.len(), 1);
        assert_eq!(charges[0].amount, Money::from_units(90));
        assert_eq!(charges[0].payment_method_id, "pm_saved");

        let intent = h.store.intent(order.id).unwrap().unwrap();
        assert_eq!(intent.origin, IntentOrigin::Recurring);
        assert_eq!(intent.applied_discount.value(), 10);
        assert!(h.store.discount(order.id).unwrap().is_none());
        assert!(h.store.pending_charges().unwrap().is_empty());
    }

    #[tokio::test]
    async fn renewal_awaiting_settlement_is_not_queued_again() {
        let h = Harness::new();
        let now = Utc::now();
        let order = active_order(&h, &[100], true);
        h.record_payment_at(order.id, Money::from_units(100), now - chrono::Duration::days(32));
        h.store.set_payment_method(order.id, "pm_saved".to_string()).unwrap();
        let scheduler = h.engine.scheduler();

        scheduler.sweep_due_subscriptions(now, BUDGET).unwrap();
        let report = scheduler.sweep_pending_charges(now, BUDGET).await.unwrap();
        assert_eq!(report.succeeded, 1);

        // The charge is out but its settlement has not been registered yet.
        let later = now + chrono::Duration::hours(1);
        let report = scheduler.sweep_due_subscriptions(later, BUDGET).unwrap();
        assert_eq!(report.visited, 1);
        assert_eq!(report.skipped, 1);
        assert!(h.store.pending_charges().unwrap().is_empty());

        scheduler.sweep_pending_charges(later, BUDGET).await.unwrap();
        assert_eq!(h.gateway.charges().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_gateway_counts_as_a_failed_attempt() {
        let h = Harness::new();
        let now = Utc::now();
        let order = active_order(&h, &[100], true);
        h.store.set_payment_method(order.id, "pm_saved".to_string()).unwrap();
        h.store.insert_pending_charge(PendingCharge::new(order.id, now)).unwrap();
        h.gateway.set_hanging(true);

        let report = h
            .engine
            .scheduler()
            .sweep_pending_charges(now, BUDGET)
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(h.store.pending_charges().unwrap()[0].attempt_count, 1);
        assert!(h.store.intent(order.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn declined_charges_are_retried_then_abandoned() {
        let h = Harness::new();
        let now = Utc::now();
        let order = active_order(&h, &[100], true);
        h.store.set_payment_method(order.id, "pm_saved".to_string()).unwrap();
        h.store.insert_pending_charge(PendingCharge::new(order.id, now)).unwrap();
        h.gateway.decline_charges(true);
        let scheduler = h.engine.scheduler();

        for attempt in 1..=PendingCharge::MAX_ATTEMPTS {
            let report = scheduler.sweep_pending_charges(now, BUDGET).await.unwrap();
            assert_eq!(report.failed, 1);
            assert_eq!(h.store.pending_charges().unwrap()[0].attempt_count, attempt);
            assert_eq!(h.status(order.id), OrderStatus::Development);
        }

        let report = scheduler.sweep_pending_charges(now, BUDGET).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(h.store.pending_charges().unwrap().is_empty());
        assert_eq!(h.status(order.id), OrderStatus::PaymentRequired);
        assert_eq!(h.notifier.sent_to(OWNER_EMAIL).len(), 1);
        assert_eq!(h.notifier.sent_to(&h.operator_email()).len(), 1);
    }

    #[tokio::test]
    async fn missing_payment_method_abandons_immediately() {
        let h = Harness::new();
        let now = Utc::now();
        let order = active_order(&h, &[100], true);
        h.store.insert_pending_charge(PendingCharge::new(order.id, now)).unwrap();

        h.engine
            .scheduler()
            .sweep_pending_charges(now, BUDGET)
            .await
            .unwrap();
        assert!(h.gateway.charges().is_empty());
        assert_eq!(h.status(order.id), OrderStatus::PaymentRequired);
    }

    #[tokio::test]
    async fn ineligible_orders_keep_their_pending_charge() {
        let h = Harness::new();
        let now = Utc::now();
        let order = active_order(&h, &[100], true);
        h.engine
            .orders()
            .force_transition(order.id, OrderStatus::OnHold)
            .unwrap();
        h.store.set_payment_method(order.id, "pm_saved".to_string()).unwrap();
        h.store.insert_pending_charge(PendingCharge::new(order.id, now)).unwrap();

        let report = h
            .engine
            .scheduler()
            .sweep_pending_charges(now, BUDGET)
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert!(h.gateway.charges().is_empty());
        assert_eq!(h.store.pending_charges().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tax_reminder_reports_the_accumulated_amount() {
        let h = Harness::new();
        let order = h.payable_order(&[116], false);
        h.record_payment(order.id, Money::from_units(116));

        h.engine.scheduler().send_tax_reminder().await.unwrap();

        let sent = h.notifier.sent_to(&h.operator_email());
        assert_eq!(sent.len(), 1);
        assert!(sent[0].message.contains("16.00"));
    }
}
