//! In-memory collaborators and fixtures shared by the crate's tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use atelier_core::{Money, OrderId, OwnerId, PaymentId, Percentage};
use atelier_invoicing::{BillingProfile, CancellationReason, InvoiceRequest, InvoiceTask};
use atelier_orders::{
    Contract, Deliverable, Goal, GoalKind, ItemKind, NewDiscount, NewItem, NewOrder, Order,
    OrderStatus, UsageLimit,
};
use atelier_payments::{CardFunding, MethodKind, Payment, PaymentMeans, embedded_tax};

use crate::catalog::CatalogCache;
use crate::config::BillingConfig;
use crate::engine::BillingEngine;
use crate::gateway::{
    GatewayError, GatewayIntent, IntentRequest, OffSessionCharge, PaymentGateway, SettlementEvent,
};
use crate::notify::{Notification, Notifier, NotifyError};
use crate::provider::{CatalogEntry, InvoicingProvider, ProviderError};
use crate::store::{BillingStore, InMemoryBillingStore, Owner};

pub const VALID_SIGNATURE: &str = "valid";

#[derive(Default)]
struct GatewayState {
    next_id: u32,
    intents: HashMap<String, GatewayIntent>,
    created: Vec<IntentRequest>,
    charges: Vec<OffSessionCharge>,
    method_kinds: HashMap<String, MethodKind>,
    decline: bool,
    hanging: bool,
}

/// Payment gateway double. Settlement payloads are JSON documents built by
/// [`settlement_payload`]; only [`VALID_SIGNATURE`] verifies.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
}

#[derive(Deserialize)]
struct SettlementPayload {
    intent_id: String,
    amount_cents: i64,
    payment_method_id: Option<String>,
    customer_id: Option<String>,
}

/// Never resolves while `hanging` is set, like a peer that stopped answering.
async fn stall(hanging: bool) {
    if hanging {
        std::future::pending::<()>().await;
    }
}

pub fn settlement_payload(intent_id: &str, amount: Money, method: Option<&str>) -> Vec<u8> {
    serde_json::json!({
        "intent_id": intent_id,
        "amount_cents": amount.cents(),
        "payment_method_id": method,
        "customer_id": "cus_test",
    })
    .to_string()
    .into_bytes()
}

impl FakeGateway {
    pub fn decline_charges(&self, decline: bool) {
        self.state.lock().unwrap().decline = decline;
    }

    pub fn set_hanging(&self, hanging: bool) {
        self.state.lock().unwrap().hanging = hanging;
    }

    async fn respond(&self) {
        let hanging = self.state.lock().unwrap().hanging;
        stall(hanging).await;
    }

    pub fn set_method_kind(&self, method_id: &str, kind: MethodKind) {
        self.state
            .lock()
            .unwrap()
            .method_kinds
            .insert(method_id.to_string(), kind);
    }

    pub fn created_intents(&self) -> Vec<IntentRequest> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn charges(&self) -> Vec<OffSessionCharge> {
        self.state.lock().unwrap().charges.clone()
    }

    fn next_id(state: &mut GatewayState) -> String {
        state.next_id += 1;
        format!("pi_{}", state.next_id)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, request: IntentRequest) -> Result<GatewayIntent, GatewayError> {
        self.respond().await;
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        let intent = GatewayIntent {
            client_secret: format!("{id}_secret"),
            id: id.clone(),
            amount: request.amount,
        };
        state.intents.insert(id, intent.clone());
        state.created.push(request);
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<GatewayIntent, GatewayError> {
        self.respond().await;
        self.state
            .lock()
            .unwrap()
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| GatewayError::Unavailable(format!("no such intent {intent_id}")))
    }

    async fn charge_off_session(&self, charge: OffSessionCharge) -> Result<String, GatewayError> {
        self.respond().await;
        let mut state = self.state.lock().unwrap();
        if state.decline {
            return Err(GatewayError::Declined("card_declined".to_string()));
        }
        let id = Self::next_id(&mut state);
        state.charges.push(charge);
        Ok(id)
    }

    async fn decode_settlement(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<SettlementEvent, GatewayError> {
        self.respond().await;
        if signature != VALID_SIGNATURE {
            return Err(GatewayError::InvalidSignature);
        }
        let payload: SettlementPayload = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::Unavailable(format!("malformed payload: {e}")))?;
        Ok(SettlementEvent {
            intent_id: payload.intent_id,
            amount: Money::from_cents(payload.amount_cents),
            payment_method_id: payload.payment_method_id,
            customer_id: payload.customer_id,
        })
    }

    async fn method_kind(&self, payment_method_id: &str) -> Result<MethodKind, GatewayError> {
        self.respond().await;
        Ok(self
            .state
            .lock()
            .unwrap()
            .method_kinds
            .get(payment_method_id)
            .cloned()
            .unwrap_or(MethodKind::Card {
                funding: CardFunding::Credit,
            }))
    }
}

#[derive(Default)]
struct ProviderState {
    next_id: u32,
    issued: Vec<InvoiceRequest>,
    cancelled: Vec<(String, String, CancellationReason)>,
    catalog_fetches: usize,
    unavailable: bool,
    hanging: bool,
}

#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<ProviderState>,
}

impl FakeProvider {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn set_hanging(&self, hanging: bool) {
        self.state.lock().unwrap().hanging = hanging;
    }

    async fn respond(&self) {
        let hanging = self.state.lock().unwrap().hanging;
        stall(hanging).await;
    }

    pub fn issued(&self) -> Vec<InvoiceRequest> {
        self.state.lock().unwrap().issued.clone()
    }

    pub fn cancelled(&self) -> Vec<(String, String, CancellationReason)> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub fn catalog_fetches(&self) -> usize {
        self.state.lock().unwrap().catalog_fetches
    }
}

#[async_trait]
impl InvoicingProvider for FakeProvider {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<String, ProviderError> {
        self.respond().await;
        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(ProviderError::Unavailable("connection refused".to_string()));
        }
        state.next_id += 1;
        state.issued.push(request.clone());
        Ok(format!("inv_{}", state.next_id))
    }

    async fn cancel_invoice(
        &self,
        invoice_id: &str,
        replacement_id: &str,
        reason: CancellationReason,
    ) -> Result<(), ProviderError> {
        self.respond().await;
        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(ProviderError::Unavailable("connection refused".to_string()));
        }
        state
            .cancelled
            .push((invoice_id.to_string(), replacement_id.to_string(), reason));
        Ok(())
    }

    async fn download_invoice(&self, invoice_id: &str) -> Result<Vec<u8>, ProviderError> {
        self.respond().await;
        Ok(format!("%PDF {invoice_id}").into_bytes())
    }

    async fn fiscal_regimes(&self) -> Result<Vec<CatalogEntry>, ProviderError> {
        self.respond().await;
        let mut state = self.state.lock().unwrap();
        state.catalog_fetches += 1;
        Ok(vec![
            CatalogEntry {
                key: "601".to_string(),
                name: "General de Ley Personas Morales".to_string(),
            },
            CatalogEntry {
                key: "612".to_string(),
                name: "Personas Fisicas con Actividades Empresariales".to_string(),
            },
        ])
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    hanging: AtomicBool,
}

impl RecordingNotifier {
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, email: &str) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.recipient.email == email)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        stall(self.hanging.load(Ordering::SeqCst)).await;
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

pub const OWNER_EMAIL: &str = "owner@example.com";

pub fn new_item(units: i64) -> NewItem {
    NewItem {
        name: "Landing page".to_string(),
        description: "Responsive marketing site".to_string(),
        kind: ItemKind::new(1).unwrap(),
        cost: Money::from_units(units),
    }
}

pub fn sample_contract(with_limits: bool) -> Contract {
    let usage_limits = if with_limits {
        vec![UsageLimit {
            label: "Change requests".to_string(),
            unit: "requests".to_string(),
            amount: 5,
        }]
    } else {
        Vec::new()
    };
    Contract {
        goals: vec![Goal {
            description: "Publish the product catalog".to_string(),
            kind: GoalKind::Feature,
        }],
        deliverables: vec![Deliverable {
            label: "Website".to_string(),
            description: "Production deployment".to_string(),
            method: "Shared URL".to_string(),
            acceptance: "Client sign-off".to_string(),
        }],
        usage_limits,
    }
}

/// An engine wired to in-memory collaborators, with one registered owner.
pub struct Harness {
    pub engine: BillingEngine,
    pub store: Arc<InMemoryBillingStore>,
    pub gateway: Arc<FakeGateway>,
    pub provider: Arc<FakeProvider>,
    pub notifier: Arc<RecordingNotifier>,
    pub owner: Owner,
}

impl Harness {
    /// Owner with a billing profile and a gateway customer.
    pub fn new() -> Self {
        Self::with_owner(Some(BillingProfile {
            provider_client_id: "client_123".to_string(),
            cfdi_use: Some("G03".to_string()),
        }))
    }

    pub fn without_billing_profile() -> Self {
        Self::with_owner(None)
    }

    fn with_owner(billing_profile: Option<BillingProfile>) -> Self {
        let store = InMemoryBillingStore::arc();
        let gateway = Arc::new(FakeGateway::default());
        let provider = Arc::new(FakeProvider::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let config = BillingConfig::default();
        let catalog = Arc::new(CatalogCache::new(config.catalog_ttl));

        let engine = BillingEngine::new(
            store.clone(),
            gateway.clone(),
            provider.clone(),
            notifier.clone(),
            catalog,
            config,
        );

        let owner = Owner {
            id: OwnerId::new(),
            name: "Ada".to_string(),
            email: OWNER_EMAIL.to_string(),
            gateway_customer_id: Some("cus_test".to_string()),
            billing_profile,
        };
        engine.register_owner(owner.clone()).unwrap();

        Self {
            engine,
            store,
            gateway,
            provider,
            notifier,
            owner,
        }
    }

    pub fn operator_email(&self) -> String {
        self.engine.config().operator_email.clone()
    }

    /// Recurring orders run 4 weeks in one installment; others 8 weeks in two.
    pub fn new_order(&self, recurring: bool) -> NewOrder {
        let (weeks, installments) = if recurring { (4, 1) } else { (8, 2) };
        self.order_input(weeks, installments, recurring)
    }

    pub fn order_input(&self, weeks: u32, installments: u32, recurring: bool) -> NewOrder {
        NewOrder {
            owner_id: self.owner.id,
            name: "Storefront".to_string(),
            description: "Online store for the bakery".to_string(),
            tag: "web".to_string(),
            duration_weeks: weeks,
            installments,
            is_recurring: recurring,
            portfolio_consent: true,
        }
    }

    pub fn planned_order(&self, recurring: bool) -> Order {
        self.engine
            .orders()
            .create_order(self.new_order(recurring), Utc::now())
            .unwrap()
    }

    /// A `PaymentRequired` order with one item per entry of `units`.
    pub fn payable_order(&self, units: &[i64], recurring: bool) -> Order {
        self.payable_order_from(self.new_order(recurring), units)
    }

    pub fn payable_order_from(&self, input: NewOrder, units: &[i64]) -> Order {
        self.prepare_order(input, units, None)
    }

    /// A `PaymentRequired` order that carries a discount.
    pub fn discounted_order(&self, units: &[i64], recurring: bool, discount: NewDiscount) -> Order {
        self.prepare_order(self.new_order(recurring), units, Some(discount))
    }

    fn prepare_order(&self, input: NewOrder, units: &[i64], discount: Option<NewDiscount>) -> Order {
        let orders = self.engine.orders();
        let recurring = input.is_recurring;
        let order = orders.create_order(input, Utc::now()).unwrap();
        for &u in units {
            orders.add_item(order.id, new_item(u)).unwrap();
        }
        if let Some(discount) = discount {
            orders.set_discount(order.id, discount).unwrap();
        }
        orders.save_contract(order.id, sample_contract(recurring)).unwrap();
        orders
            .request_transition(order.id, OrderStatus::PaymentRequired)
            .unwrap();
        orders.order(order.id).unwrap()
    }

    pub fn discount(&self, percentage: u8, disposable: bool) -> NewDiscount {
        NewDiscount {
            percentage: Percentage::new(percentage).unwrap(),
            description: "Launch promotion".to_string(),
            disposable,
        }
    }

    pub fn record_payment(&self, order_id: OrderId, amount: Money) -> PaymentId {
        self.record_payment_at(order_id, amount, Utc::now())
    }

    /// Store a settled card payment directly, bypassing the gateway.
    pub fn record_payment_at(&self, order_id: OrderId, amount: Money, at: DateTime<Utc>) -> PaymentId {
        let payment = Payment {
            id: PaymentId::new(),
            order_id,
            amount,
            means: PaymentMeans::CreditCard,
            applied_discount: Percentage::ZERO,
            gateway_intent_id: None,
            created_at: at,
        };
        let id = payment.id;
        let has_profile = self.owner.billing_profile.is_some();
        self.store
            .record_payment(payment, InvoiceTask::new(id, has_profile, at), Some(embedded_tax(amount)))
            .unwrap();
        id
    }

    pub fn status(&self, order_id: OrderId) -> OrderStatus {
        self.engine.orders().order(order_id).unwrap().status
    }
}
