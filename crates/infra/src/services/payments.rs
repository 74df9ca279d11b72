//! Payment intents, settlement registration and the tax ledger.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use atelier_core::{Money, OrderId, PaymentId, Percentage};
use atelier_invoicing::InvoiceTask;
use atelier_orders::{OrderStatus, PricedLine, allocate_discount};
use atelier_payments::{
    IntentOrigin, Payment, PaymentIntentRecord, PaymentMeans, TaxSummary, embedded_tax,
};

use crate::config::BillingConfig;
use crate::error::{BillingError, BillingResult, bounded};
use crate::gateway::{GatewayError, IntentRequest, PaymentGateway};
use crate::notify::{Notification, Notifier, deliver};
use crate::services::orders::OrderStateMachine;
use crate::store::BillingStore;
use crate::sweep::{SweepBudget, SweepReport};

/// What the client needs to complete a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkout {
    pub client_secret: String,
    pub intent_id: String,
    pub has_billing_profile: bool,
    /// Amount of this installment.
    pub amount: Money,
    pub installments: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentInitialization {
    /// A gateway intent is ready (new or reused).
    Pending(Checkout),
    /// A 100% discount settled the installment without the gateway.
    AlreadySettled { payment_id: PaymentId },
}

#[derive(Clone)]
pub struct PaymentIntentManager {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    orders: OrderStateMachine,
    config: Arc<BillingConfig>,
}

impl PaymentIntentManager {
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

    async fn call<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> BillingResult<T> {
        bounded("payment-gateway", self.config.collaborator_timeout, call).await
    }

    /// Start (or resume) payment of the order's next installment.
    pub async fn initialize(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> BillingResult<PaymentInitialization> {
        let order = self.orders.order(order_id)?;
        if order.status != OrderStatus::PaymentRequired {
            return Err(BillingError::forbidden(
                "the order status does not allow starting a payment",
            ));
        }

        let owner = self
            .store
            .owner(order.owner_id)?
            .ok_or_else(|| BillingError::not_found(format!("owner {}", order.owner_id)))?;
        let has_billing_profile = owner.billing_profile.is_some();

        if let Some(previous) = self.store.intent(order_id)? {
            if previous.is_stale(now) {
                self.store.delete_intent(order_id)?;
                info!(order_id = %order_id, intent = %previous.gateway_id, "discarded stale intent");
            } else {
                let intent = self
                    .call(self.gateway.retrieve_intent(&previous.gateway_id))
                    .await?;
                return Ok(PaymentInitialization::Pending(Checkout {
                    client_secret: intent.client_secret,
                    intent_id: previous.gateway_id,
                    has_billing_profile,
                    amount: intent.amount,
                    installments: order.terms.installments,
                }));
            }
        }

        let items = self.store.items(order_id)?;
        if items.is_empty() {
            return Err(BillingError::forbidden("order has no items"));
        }

        let discount = self.store.discount(order_id)?;
        let percentage = discount.as_ref().map_or(Percentage::ZERO, |d| d.percentage);
        let lines: Vec<PricedLine> = items.iter().map(PricedLine::from_item).collect();
        let distribution = allocate_discount(&lines, percentage)?;

        if percentage.is_full() {
            let payment = Payment::fully_discounted(PaymentId::new(), order_id, now);
            let payment_id = payment.id;
            let task = InvoiceTask::new(payment_id, has_billing_profile, now);
            self.store.record_payment(payment, task, None)?;
            self.orders.force_transition(order_id, OrderStatus::OnHold)?;
            info!(order_id = %order_id, payment_id = %payment_id, "fully discounted payment registered");
            self.notify_operator_of_payment(order_id).await;
            return Ok(PaymentInitialization::AlreadySettled { payment_id });
        }

        let customer_id = owner
            .gateway_customer_id
            .ok_or_else(|| BillingError::not_found("payment gateway customer"))?;

        let amount = distribution.per_installment(order.terms.installments);
        let intent = self
            .call(self.gateway.create_intent(IntentRequest {
                order_id,
                amount,
                customer_id,
            }))
            .await?;

        let consume_discount = discount.as_ref().is_some_and(|d| d.disposable);
        self.store.save_intent(
            PaymentIntentRecord {
                order_id,
                gateway_id: intent.id.clone(),
                applied_discount: percentage,
                origin: IntentOrigin::Checkout,
                created_at: now,
            },
            consume_discount,
        )?;
        info!(order_id = %order_id, intent = %intent.id, amount = %amount, "payment intent created");

        Ok(PaymentInitialization::Pending(Checkout {
            client_secret: intent.client_secret,
            intent_id: intent.id,
            has_billing_profile,
            amount,
            installments: order.terms.installments,
        }))
    }

    /// Record a settlement confirmed by the gateway's notification.
    pub async fn register(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> BillingResult<PaymentId> {
        let signature = signature.ok_or(BillingError::Auth)?;
        let event = self
            .call(self.gateway.decode_settlement(payload, signature))
            .await?;

        let method_id = event.payment_method_id.ok_or_else(|| {
            warn!(intent = %event.intent_id, "settlement without payment method");
            BillingError::validation("settlement carries no payment method")
        })?;
        let kind = self.call(self.gateway.method_kind(&method_id)).await?;
        let means = PaymentMeans::classify(&kind)?;

        let intent = self
            .store
            .take_intent_by_gateway_id(&event.intent_id)?
            .ok_or_else(|| {
                BillingError::service(
                    "settlement",
                    format!("payment intent not found ({})", event.intent_id),
                )
            })?;

        let order = self.store.order(intent.order_id)?.ok_or_else(|| {
            BillingError::service(
                "settlement",
                format!("order {} not found while registering a payment", intent.order_id),
            )
        })?;
        let has_billing_profile = self
            .store
            .owner(order.owner_id)?
            .is_some_and(|o| o.billing_profile.is_some());

        let payment = Payment {
            id: PaymentId::new(),
            order_id: order.id,
            amount: event.amount,
            means,
            applied_discount: intent.applied_discount,
            gateway_intent_id: Some(intent.gateway_id),
            created_at: now,
        };
        let payment_id = payment.id;
        let task = InvoiceTask::new(payment_id, has_billing_profile, now);
        self.store
            .record_payment(payment, task, Some(embedded_tax(event.amount)))?;

        if order.terms.is_recurring {
            self.store.set_payment_method(order.id, method_id)?;
        }
        self.orders.force_transition(order.id, OrderStatus::OnHold)?;

        info!(
            order_id = %order.id,
            payment_id = %payment_id,
            amount = %event.amount,
            means = %means,
            "payment registered"
        );
        self.notify_operator_of_payment(order.id).await;
        Ok(payment_id)
    }

    async fn notify_operator_of_payment(&self, order_id: OrderId) {
        let notification = Notification::link(
            self.config.operator(),
            "A payment has been registered.",
            "View payment",
            format!("{}/payments", self.config.operator_order_url(order_id)),
        );
        deliver(self.notifier.as_ref(), notification, self.config.collaborator_timeout).await;
    }

    pub fn payment_for_intent(&self, gateway_intent_id: &str) -> BillingResult<Payment> {
        self.store
            .payment_by_intent(gateway_intent_id)?
            .ok_or_else(|| BillingError::not_found("payment"))
    }

    pub fn payments_total_for_month(&self, now: DateTime<Utc>) -> BillingResult<Money> {
        Ok(self
            .store
            .payments()?
            .iter()
            .filter(|p| p.in_month_of(now))
            .map(|p| p.amount)
            .sum())
    }

    pub fn tax_summary(&self) -> BillingResult<TaxSummary> {
        Ok(TaxSummary::from_entries(&self.store.tax_entries()?))
    }

    /// Remove reviewed ledger entries (`id <= up_to`).
    pub fn clear_taxes(&self, up_to: u64) -> BillingResult<usize> {
        let removed = self.store.clear_taxes(up_to)?;
        info!(up_to, removed, "tax entries cleared");
        Ok(removed)
    }

    /// Discard intents that went stale without settling.
    pub fn sweep_stale_intents(
        &self,
        now: DateTime<Utc>,
        budget: Duration,
    ) -> BillingResult<SweepReport> {
        let span = atelier_observability::sweep_span("stale_intents");
        let _guard = span.enter();
        let budget = SweepBudget::start(budget);
        let mut report = SweepReport::default();

        for intent in self.store.intents()? {
            if budget.exceeded() {
                warn!("time budget exceeded; remaining intents left for next run");
                report.exhausted = true;
                break;
            }
            report.visited += 1;

            if !intent.is_stale(now) {
                report.skipped += 1;
                continue;
            }
            match self.store.take_intent_by_gateway_id(&intent.gateway_id) {
                Ok(_) => {
                    info!(order_id = %intent.order_id, intent = %intent.gateway_id, "stale intent discarded");
                    report.succeeded += 1;
                }
                Err(e) => {
                    warn!(order_id = %intent.order_id, error = %e, "failed to discard stale intent");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}
