//! Storage for orders, payments and billing state.
//!
//! The trait is synchronous. Methods that touch more than one collection
//! (`replace_discount`, `record_payment`, `complete_global_invoice`, ...) are
//! single units of work: an implementation must apply all of their writes or
//! none of them.

mod memory;

pub use memory::InMemoryBillingStore;

use serde::{Deserialize, Serialize};

use atelier_core::{ItemId, Money, OrderId, OwnerId, PaymentId};
use atelier_invoicing::{BillingProfile, InvoiceRecord, InvoiceTask, InvoiceTaskKind};
use atelier_orders::{Contract, Discount, Order, OrderItem, OrderStatus};
use atelier_payments::{Payment, PaymentIntentRecord, PendingCharge, TaxEntry};

/// The customer who owns orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    pub name: String,
    pub email: String,
    /// Customer profile on the payment gateway.
    pub gateway_customer_id: Option<String>,
    pub billing_profile: Option<BillingProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    #[error("storage error: {0}")]
    Storage(String),
}

pub trait BillingStore: Send + Sync {
    // Owners

    fn insert_owner(&self, owner: Owner) -> Result<(), StoreError>;
    fn owner(&self, id: OwnerId) -> Result<Option<Owner>, StoreError>;

    // Orders

    fn insert_order(&self, order: Order) -> Result<(), StoreError>;
    fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;
    /// Replace a stored order with `order`.
    fn update_order(&self, order: &Order) -> Result<(), StoreError>;
    fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<(), StoreError>;
    fn orders_with_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>, StoreError>;

    // Items, contract, discount

    fn insert_item(&self, item: OrderItem) -> Result<(), StoreError>;
    fn update_item(&self, item: &OrderItem) -> Result<(), StoreError>;
    fn item(&self, id: ItemId) -> Result<Option<OrderItem>, StoreError>;
    /// Returns whether an item was removed.
    fn delete_item(&self, id: ItemId) -> Result<bool, StoreError>;
    /// Items of an order in insertion order.
    fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError>;

    fn replace_contract(&self, order_id: OrderId, contract: Contract) -> Result<(), StoreError>;
    fn contract(&self, order_id: OrderId) -> Result<Option<Contract>, StoreError>;

    /// Drop the order's current discount (if any) and insert `discount`.
    fn replace_discount(&self, discount: Discount) -> Result<(), StoreError>;
    fn delete_discount(&self, order_id: OrderId) -> Result<bool, StoreError>;
    fn discount(&self, order_id: OrderId) -> Result<Option<Discount>, StoreError>;

    /// Default gateway payment method used for recurring charges.
    fn set_payment_method(&self, order_id: OrderId, method_id: String) -> Result<(), StoreError>;
    fn payment_method(&self, order_id: OrderId) -> Result<Option<String>, StoreError>;

    // Payment intents

    fn intent(&self, order_id: OrderId) -> Result<Option<PaymentIntentRecord>, StoreError>;
    fn intents(&self) -> Result<Vec<PaymentIntentRecord>, StoreError>;
    fn delete_intent(&self, order_id: OrderId) -> Result<bool, StoreError>;
    /// Remove and return the intent with the given gateway id.
    fn take_intent_by_gateway_id(
        &self,
        gateway_id: &str,
    ) -> Result<Option<PaymentIntentRecord>, StoreError>;
    /// Store the order's live intent (replacing any other) and, when
    /// `consume_discount` is set, delete the order's discount.
    fn save_intent(
        &self,
        intent: PaymentIntentRecord,
        consume_discount: bool,
    ) -> Result<(), StoreError>;
    /// `save_intent` plus removal of the order's pending charge.
    fn complete_recurring_charge(
        &self,
        intent: PaymentIntentRecord,
        consume_discount: bool,
    ) -> Result<(), StoreError>;

    // Payments and tax

    /// Insert the payment, queue its invoice task and append `tax` (if any)
    /// to the tax ledger.
    fn record_payment(
        &self,
        payment: Payment,
        task: InvoiceTask,
        tax: Option<Money>,
    ) -> Result<(), StoreError>;
    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError>;
    fn payments(&self) -> Result<Vec<Payment>, StoreError>;
    /// Payments of an order, oldest first.
    fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>, StoreError>;
    fn payment_by_intent(&self, gateway_id: &str) -> Result<Option<Payment>, StoreError>;

    fn tax_entries(&self) -> Result<Vec<TaxEntry>, StoreError>;
    /// Delete ledger entries with `id <= up_to`; returns how many were removed.
    fn clear_taxes(&self, up_to: u64) -> Result<usize, StoreError>;

    // Invoicing

    /// Queued tasks of a kind, oldest first.
    fn invoice_tasks(&self, kind: InvoiceTaskKind) -> Result<Vec<InvoiceTask>, StoreError>;
    fn invoice(&self, payment_id: PaymentId) -> Result<Option<InvoiceRecord>, StoreError>;
    /// Persist the invoice of one payment and remove its task.
    fn complete_invoice(&self, record: InvoiceRecord) -> Result<(), StoreError>;
    /// Persist the shared invoice of every included payment and remove their
    /// global tasks.
    fn complete_global_invoice(&self, records: Vec<InvoiceRecord>) -> Result<(), StoreError>;
    /// Swap the payment's invoice mapping for `record`.
    fn replace_invoice(&self, record: InvoiceRecord) -> Result<(), StoreError>;

    // Pending charges

    /// Returns `false` (and changes nothing) if the order already has one.
    fn insert_pending_charge(&self, charge: PendingCharge) -> Result<bool, StoreError>;
    fn pending_charges(&self) -> Result<Vec<PendingCharge>, StoreError>;
    fn update_pending_charge(&self, charge: &PendingCharge) -> Result<(), StoreError>;
    fn delete_pending_charge(&self, order_id: OrderId) -> Result<bool, StoreError>;
}
