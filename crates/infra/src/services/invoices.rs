//! Invoice generation: the per-payment and global task queues, regeneration
//! within the replacement window, and document download.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{Instrument, info, warn};

use atelier_core::{OwnerId, PaymentId};
use atelier_invoicing::{
    CancellationReason, GlobalPeriod, InvoiceConcept, InvoiceRecord, InvoiceRequest, InvoiceScope,
    InvoiceTaskKind, concepts_for,
};
use atelier_observability::sweep_span;
use atelier_orders::{Order, PricedLine, allocate_discount};
use atelier_payments::Payment;

use crate::config::BillingConfig;
use crate::error::{BillingError, BillingResult, bounded};
use crate::provider::{InvoicingProvider, ProviderError};
use crate::store::BillingStore;
use crate::sweep::{SweepBudget, SweepReport};

/// Who is asking for an invoice document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requester {
    Operator,
    Owner(OwnerId),
}

#[derive(Clone)]
pub struct InvoiceTaskQueue {
    store: Arc<dyn BillingStore>,
    provider: Arc<dyn InvoicingProvider>,
    config: Arc<BillingConfig>,
}

impl InvoiceTaskQueue {
    pub fn new(
        store: Arc<dyn BillingStore>,
        provider: Arc<dyn InvoicingProvider>,
        config: Arc<BillingConfig>,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    async fn call<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> BillingResult<T> {
        bounded("invoicing-provider", self.config.collaborator_timeout, call).await
    }

    fn payment(&self, id: PaymentId) -> BillingResult<Payment> {
        self.store
            .payment(id)?
            .ok_or_else(|| BillingError::not_found(format!("payment {id}")))
    }

    /// Line items of one installment, priced with the discount stored on the
    /// payment rather than the order's live discount.
    fn concepts_for_payment(&self, payment: &Payment) -> BillingResult<(Order, Vec<InvoiceConcept>)> {
        let order = self
            .store
            .order(payment.order_id)?
            .ok_or_else(|| BillingError::not_found(format!("order {}", payment.order_id)))?;
        let items = self.store.items(order.id)?;
        if items.is_empty() {
            return Err(BillingError::not_found(format!("items of order {}", order.id)));
        }

        let lines: Vec<PricedLine> = items
            .iter()
            .map(|item| PricedLine::per_installment(item, order.terms.installments))
            .collect();
        let distribution = allocate_discount(&lines, payment.applied_discount)?;
        Ok((order, concepts_for(&distribution)))
    }

    /// Issue the individual invoice of a payment and dequeue its task.
    pub async fn generate_invoice(
        &self,
        payment_id: PaymentId,
        now: DateTime<Utc>,
    ) -> BillingResult<String> {
        let payment = self.payment(payment_id)?;
        if self.store.invoice(payment_id)?.is_some() {
            return Err(BillingError::forbidden("the invoice was already issued"));
        }

        let (order, concepts) = self.concepts_for_payment(&payment)?;
        let profile = self
            .store
            .owner(order.owner_id)?
            .and_then(|o| o.billing_profile)
            .ok_or_else(|| BillingError::forbidden("owner has no billing profile"))?;

        let request = InvoiceRequest {
            receiver_id: profile.provider_client_id,
            cfdi_use: profile
                .cfdi_use
                .unwrap_or_else(|| self.config.default_cfdi_use.clone()),
            means: payment.means,
            scope: InvoiceScope::Individual,
            concepts,
        };
        let provider_id = self.call(self.provider.create_invoice(&request)).await?;

        self.store.complete_invoice(InvoiceRecord {
            payment_id,
            provider_id: provider_id.clone(),
            issued_at: now,
        })?;
        info!(payment_id = %payment_id, invoice = %provider_id, "invoice issued");
        Ok(provider_id)
    }

    /// Issue one invoice covering every given payment, addressed to the
    /// generic receiver. Nothing is persisted unless the provider succeeds.
    pub async fn generate_global_invoice(
        &self,
        payment_ids: &[PaymentId],
        now: DateTime<Utc>,
    ) -> BillingResult<String> {
        if payment_ids.is_empty() {
            return Err(BillingError::validation("no payments to invoice"));
        }

        let mut concepts = Vec::new();
        for &payment_id in payment_ids {
            let payment = self.payment(payment_id)?;
            if self.store.invoice(payment_id)?.is_some() {
                return Err(BillingError::forbidden(format!(
                    "payment {payment_id} is already invoiced"
                )));
            }
            concepts.extend(self.concepts_for_payment(&payment)?.1);
        }

        let request = InvoiceRequest {
            receiver_id: self.config.generic_receiver_id.clone(),
            cfdi_use: self.config.default_cfdi_use.clone(),
            means: self.config.global_invoice_means,
            scope: InvoiceScope::Global {
                period: GlobalPeriod::containing(now),
            },
            concepts,
        };
        let provider_id = self.call(self.provider.create_invoice(&request)).await?;

        let records = payment_ids
            .iter()
            .map(|&payment_id| InvoiceRecord {
                payment_id,
                provider_id: provider_id.clone(),
                issued_at: now,
            })
            .collect();
        self.store.complete_global_invoice(records)?;
        info!(invoice = %provider_id, payments = payment_ids.len(), "global invoice issued");
        Ok(provider_id)
    }

    /// Replace a payment's invoice: issue the new one, cancel the old one as a
    /// correction pointing at it, then swap the mapping.
    pub async fn regenerate_invoice(
        &self,
        payment_id: PaymentId,
        now: DateTime<Utc>,
    ) -> BillingResult<String> {
        let payment = self.payment(payment_id)?;
        let existing = self
            .store
            .invoice(payment_id)?
            .ok_or_else(|| BillingError::forbidden("no invoice has been issued for this payment"))?;
        InvoiceRecord::ensure_replaceable(payment.created_at, now)?;

        let (order, concepts) = self.concepts_for_payment(&payment)?;
        let profile = self
            .store
            .owner(order.owner_id)?
            .and_then(|o| o.billing_profile);
        let (receiver_id, cfdi_use) = match profile {
            Some(p) => (
                p.provider_client_id,
                p.cfdi_use
                    .unwrap_or_else(|| self.config.default_cfdi_use.clone()),
            ),
            None => (
                self.config.generic_receiver_id.clone(),
                self.config.default_cfdi_use.clone(),
            ),
        };

        let request = InvoiceRequest {
            receiver_id,
            cfdi_use,
            means: payment.means,
            scope: InvoiceScope::Individual,
            concepts,
        };
        let replacement = self.call(self.provider.create_invoice(&request)).await?;
        self.call(self.provider.cancel_invoice(
            &existing.provider_id,
            &replacement,
            CancellationReason::Correction,
        ))
        .await?;

        self.store.replace_invoice(InvoiceRecord {
            payment_id,
            provider_id: replacement.clone(),
            issued_at: now,
        })?;
        info!(
            payment_id = %payment_id,
            cancelled = %existing.provider_id,
            invoice = %replacement,
            "invoice regenerated"
        );
        Ok(replacement)
    }

    pub async fn download_invoice(
        &self,
        payment_id: PaymentId,
        requester: Requester,
    ) -> BillingResult<Vec<u8>> {
        let payment = self.payment(payment_id)?;
        if let Requester::Owner(owner_id) = requester {
            let order = self
                .store
                .order(payment.order_id)?
                .ok_or_else(|| BillingError::not_found(format!("order {}", payment.order_id)))?;
            if order.owner_id != owner_id {
                return Err(BillingError::forbidden("no access to this invoice"));
            }
        }

        let invoice = self
            .store
            .invoice(payment_id)?
            .ok_or_else(|| BillingError::not_found("invoice"))?;
        self.call(self.provider.download_invoice(&invoice.provider_id))
            .await
    }

    /// Work through queued individual tasks until the budget runs out.
    pub async fn sweep_invoice_tasks(
        &self,
        now: DateTime<Utc>,
        budget: Duration,
    ) -> BillingResult<SweepReport> {
        self.run_invoice_tasks(now, SweepBudget::start(budget))
            .instrument(sweep_span("invoice_tasks"))
            .await
    }

    async fn run_invoice_tasks(
        &self,
        now: DateTime<Utc>,
        budget: SweepBudget,
    ) -> BillingResult<SweepReport> {
        let mut report = SweepReport::default();

        for task in self.store.invoice_tasks(InvoiceTaskKind::Individual)? {
            if budget.exceeded() {
                warn!("time budget exceeded; remaining tasks left for next run");
                report.exhausted = true;
                break;
            }
            report.visited += 1;

            match self.generate_invoice(task.payment_id, now).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    warn!(payment_id = %task.payment_id, error = %e, "invoice task failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Consolidate every queued global task into one invoice.
    pub async fn sweep_global_invoices(
        &self,
        now: DateTime<Utc>,
        budget: Duration,
    ) -> BillingResult<SweepReport> {
        self.run_global_invoices(now, SweepBudget::start(budget))
            .instrument(sweep_span("global_invoices"))
            .await
    }

    async fn run_global_invoices(
        &self,
        now: DateTime<Utc>,
        budget: SweepBudget,
    ) -> BillingResult<SweepReport> {
        let mut report = SweepReport::default();
        let payment_ids: Vec<PaymentId> = self
            .store
            .invoice_tasks(InvoiceTaskKind::Global)?
            .into_iter()
            .map(|t| t.payment_id)
            .collect();

        if payment_ids.is_empty() {
            return Ok(report);
        }
        if budget.exceeded() {
            report.exhausted = true;
            return Ok(report);
        }

        report.visited = payment_ids.len();
        match self.generate_global_invoice(&payment_ids, now).await {
            Ok(_) => report.succeeded = payment_ids.len(),
            Err(e) => {
                warn!(payments = payment_ids.len(), error = %e, "global invoice failed");
                report.failed = payment_ids.len();
            }
        }
        Ok(report)
    }
}
