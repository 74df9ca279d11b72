//! `BillingEngine`: wires the services to their collaborators and exposes the
//! caller-facing operations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use atelier_core::{OrderId, PaymentId};
use atelier_orders::{Discount, NewDiscount, OrderStatus, Transition};

use crate::catalog::CatalogCache;
use crate::config::BillingConfig;
use crate::error::{BillingError, BillingResult, bounded};
use crate::gateway::PaymentGateway;
use crate::notify::{Notification, Notifier, deliver};
use crate::provider::{CatalogEntry, InvoicingProvider};
use crate::services::{
    InvoiceTaskQueue, OrderStateMachine, PaymentInitialization, PaymentIntentManager,
    RecurringBillingScheduler,
};
use crate::store::{BillingStore, Owner};
use crate::sweep::{SweepBudget, SweepKind, SweepReport};

pub struct BillingEngine {
    orders: OrderStateMachine,
    payments: PaymentIntentManager,
    invoices: InvoiceTaskQueue,
    scheduler: RecurringBillingScheduler,
    store: Arc<dyn BillingStore>,
    provider: Arc<dyn InvoicingProvider>,
    notifier: Arc<dyn Notifier>,
    catalog: Arc<CatalogCache>,
    config: Arc<BillingConfig>,
}

impl BillingEngine {
    pub fn new(
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn PaymentGateway>,
        provider: Arc<dyn InvoicingProvider>,
        notifier: Arc<dyn Notifier>,
        catalog: Arc<CatalogCache>,
        config: BillingConfig,
    ) -> Self {
        let config = Arc::new(config);
        let orders = OrderStateMachine::new(store.clone());
        let payments = PaymentIntentManager::new(
            store.clone(),
            gateway.clone(),
            notifier.clone(),
            orders.clone(),
            config.clone(),
        );
        let invoices = InvoiceTaskQueue::new(store.clone(), provider.clone(), config.clone());
        let scheduler = RecurringBillingScheduler::new(
            store.clone(),
            gateway,
            notifier.clone(),
            orders.clone(),
            config.clone(),
        );

        Self {
            orders,
            payments,
            invoices,
            scheduler,
            store,
            provider,
            notifier,
            catalog,
            config,
        }
    }

    pub fn orders(&self) -> &OrderStateMachine {
        &self.orders
    }

    pub fn payments(&self) -> &PaymentIntentManager {
        &self.payments
    }

    pub fn invoices(&self) -> &InvoiceTaskQueue {
        &self.invoices
    }

    pub fn scheduler(&self) -> &RecurringBillingScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    pub fn register_owner(&self, owner: Owner) -> BillingResult<()> {
        Ok(self.store.insert_owner(owner)?)
    }

    /// Log a failure centrally. Collaborator failures also alert the operator.
    pub async fn report(&self, err: &BillingError) {
        if !err.is_service() {
            debug!(error = %err, "request rejected");
            return;
        }
        error!(error = %err, "service failure");
        let notice = Notification::plain(self.config.operator(), format!("Service failure: {err}"));
        deliver(self.notifier.as_ref(), notice, self.config.collaborator_timeout).await;
    }

    async fn reported<T>(&self, result: BillingResult<T>) -> BillingResult<T> {
        if let Err(e) = &result {
            self.report(e).await;
        }
        result
    }

    pub async fn initialize_payment(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> BillingResult<PaymentInitialization> {
        let result = self.payments.initialize(order_id, now).await;
        self.reported(result).await
    }

    pub async fn register_settlement(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> BillingResult<PaymentId> {
        let result = self.payments.register(payload, signature, now).await;
        self.reported(result).await
    }

    pub async fn generate_invoice(
        &self,
        payment_id: PaymentId,
        now: DateTime<Utc>,
    ) -> BillingResult<String> {
        let result = self.invoices.generate_invoice(payment_id, now).await;
        self.reported(result).await
    }

    pub async fn generate_global_invoice(
        &self,
        payment_ids: &[PaymentId],
        now: DateTime<Utc>,
    ) -> BillingResult<String> {
        let result = self.invoices.generate_global_invoice(payment_ids, now).await;
        self.reported(result).await
    }

    pub async fn regenerate_invoice(
        &self,
        payment_id: PaymentId,
        now: DateTime<Utc>,
    ) -> BillingResult<String> {
        let result = self.invoices.regenerate_invoice(payment_id, now).await;
        self.reported(result).await
    }

    pub fn request_transition(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> BillingResult<Transition> {
        self.orders.request_transition(order_id, status)
    }

    pub fn set_discount(&self, order_id: OrderId, input: NewDiscount) -> BillingResult<Discount> {
        self.orders.set_discount(order_id, input)
    }

    pub fn remove_discount(&self, order_id: OrderId) -> BillingResult<()> {
        self.orders.remove_discount(order_id)
    }

    pub async fn fiscal_regimes(&self, now: DateTime<Utc>) -> BillingResult<Vec<CatalogEntry>> {
        let result = bounded(
            "invoicing-provider",
            self.config.collaborator_timeout,
            self.catalog.fiscal_regimes(self.provider.as_ref(), now),
        )
        .await;
        self.reported(result).await
    }

    /// Installment and subscription due-detection in one pass.
    pub async fn sweep_due_payments(
        &self,
        now: DateTime<Utc>,
        budget: Duration,
    ) -> BillingResult<SweepReport> {
        let shared = SweepBudget::start(budget);
        let installments = self.scheduler.sweep_due_installments(now, budget).await?;
        let subscriptions = self
            .scheduler
            .sweep_due_subscriptions(now, shared.remaining())?;
        Ok(installments.merge(subscriptions))
    }

    pub async fn sweep_pending_charges(
        &self,
        now: DateTime<Utc>,
        budget: Duration,
    ) -> BillingResult<SweepReport> {
        self.scheduler.sweep_pending_charges(now, budget).await
    }

    /// Run one sweep with its configured budget.
    pub async fn run_sweep(&self, kind: SweepKind, now: DateTime<Utc>) -> BillingResult<SweepReport> {
        let budget = kind.settings(&self.config.sweeps).budget;
        match kind {
            SweepKind::InvoiceTasks => self.invoices.sweep_invoice_tasks(now, budget).await,
            SweepKind::GlobalInvoices => self.invoices.sweep_global_invoices(now, budget).await,
            SweepKind::DueInstallments => self.scheduler.sweep_due_installments(now, budget).await,
            SweepKind::DueSubscriptions => self.scheduler.sweep_due_subscriptions(now, budget),
            SweepKind::PendingCharges => self.scheduler.sweep_pending_charges(now, budget).await,
            SweepKind::StaleIntents => self.payments.sweep_stale_intents(now, budget),
            SweepKind::TaxReminder => {
                self.scheduler.send_tax_reminder().await?;
                Ok(SweepReport {
                    visited: 1,
                    succeeded: 1,
                    ..SweepReport::default()
                })
            }
        }
    }
}
