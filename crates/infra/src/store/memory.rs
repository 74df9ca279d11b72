//! In-memory store for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use atelier_core::{Entity, ItemId, Money, OrderId, OwnerId, PaymentId};
use atelier_invoicing::{InvoiceRecord, InvoiceTask, InvoiceTaskKind};
use atelier_orders::{Contract, Discount, Order, OrderItem, OrderStatus};
use atelier_payments::{Payment, PaymentIntentRecord, PendingCharge, TaxEntry};

use super::{BillingStore, Owner, StoreError};

#[derive(Debug, Default)]
struct State {
    owners: HashMap<OwnerId, Owner>,
    orders: HashMap<OrderId, Order>,
    items: Vec<OrderItem>,
    contracts: HashMap<OrderId, Contract>,
    discounts: HashMap<OrderId, Discount>,
    payment_methods: HashMap<OrderId, String>,
    intents: HashMap<OrderId, PaymentIntentRecord>,
    payments: Vec<Payment>,
    invoice_tasks: Vec<InvoiceTask>,
    invoices: HashMap<PaymentId, InvoiceRecord>,
    pending_charges: HashMap<OrderId, PendingCharge>,
    tax_entries: Vec<TaxEntry>,
    next_tax_id: u64,
}

impl State {
    fn order_mut(&mut self, id: OrderId) -> Result<&mut Order, StoreError> {
        self.orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))
    }

    fn put_intent(&mut self, intent: PaymentIntentRecord, consume_discount: bool) {
        if consume_discount {
            self.discounts.remove(&intent.order_id);
        }
        self.intents.insert(intent.order_id, intent);
    }
}

fn by_id<'a, E: Entity>(records: &'a [E], id: &E::Id) -> Option<&'a E> {
    records.iter().find(|r| r.id() == id)
}

fn by_id_mut<'a, E: Entity>(records: &'a mut [E], id: &E::Id) -> Option<&'a mut E> {
    records.iter_mut().find(|r| r.id() == id)
}

/// Every collection lives behind one lock, so each trait method is atomic.
#[derive(Debug, Default)]
pub struct InMemoryBillingStore {
    state: RwLock<State>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Storage("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Storage("store lock poisoned".to_string()))
    }
}

impl BillingStore for InMemoryBillingStore {
    fn insert_owner(&self, owner: Owner) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.owners.contains_key(&owner.id) {
            return Err(StoreError::AlreadyExists(format!("owner {}", owner.id)));
        }
        state.owners.insert(owner.id, owner);
        Ok(())
    }

    fn owner(&self, id: OwnerId) -> Result<Option<Owner>, StoreError> {
        Ok(self.read()?.owners.get(&id).cloned())
    }

    fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::AlreadyExists(format!("order {}", order.id)));
        }
        state.orders.insert(order.id, order);
        Ok(())
    }

    fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.read()?.orders.get(&id).cloned())
    }

    fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut state = self.write()?;
        *state.order_mut(order.id)? = order.clone();
        Ok(())
    }

    fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.order_mut(id)?.status = status;
        Ok(())
    }

    fn orders_with_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>, StoreError> {
        let state = self.read()?;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| statuses.contains(&o.status))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    fn insert_item(&self, item: OrderItem) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.orders.contains_key(&item.order_id) {
            return Err(StoreError::NotFound(format!("order {}", item.order_id)));
        }
        state.items.push(item);
        Ok(())
    }

    fn update_item(&self, item: &OrderItem) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let slot = by_id_mut(&mut state.items, &item.id)
            .ok_or_else(|| StoreError::NotFound(format!("item {}", item.id)))?;
        *slot = item.clone();
        Ok(())
    }

    fn item(&self, id: ItemId) -> Result<Option<OrderItem>, StoreError> {
        Ok(by_id(&self.read()?.items, &id).cloned())
    }

    fn delete_item(&self, id: ItemId) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let before = state.items.len();
        state.items.retain(|i| i.id != id);
        Ok(state.items.len() != before)
    }

    fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self
            .read()?
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    fn replace_contract(&self, order_id: OrderId, contract: Contract) -> Result<(), StoreError> {
        self.write()?.contracts.insert(order_id, contract);
        Ok(())
    }

    fn contract(&self, order_id: OrderId) -> Result<Option<Contract>, StoreError> {
        Ok(self.read()?.contracts.get(&order_id).cloned())
    }

    fn replace_discount(&self, discount: Discount) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.discounts.remove(&discount.order_id);
        state.discounts.insert(discount.order_id, discount);
        Ok(())
    }

    fn delete_discount(&self, order_id: OrderId) -> Result<bool, StoreError> {
        Ok(self.write()?.discounts.remove(&order_id).is_some())
    }

    fn discount(&self, order_id: OrderId) -> Result<Option<Discount>, StoreError> {
        Ok(self.read()?.discounts.get(&order_id).cloned())
    }

    fn set_payment_method(&self, order_id: OrderId, method_id: String) -> Result<(), StoreError> {
        self.write()?.payment_methods.insert(order_id, method_id);
        Ok(())
    }

    fn payment_method(&self, order_id: OrderId) -> Result<Option<String>, StoreError> {
        Ok(self.read()?.payment_methods.get(&order_id).cloned())
    }

    fn intent(&self, order_id: OrderId) -> Result<Option<PaymentIntentRecord>, StoreError> {
        Ok(self.read()?.intents.get(&order_id).cloned())
    }

    fn intents(&self) -> Result<Vec<PaymentIntentRecord>, StoreError> {
        let mut intents: Vec<_> = self.read()?.intents.values().cloned().collect();
        intents.sort_by_key(|i| i.created_at);
        Ok(intents)
    }

    fn delete_intent(&self, order_id: OrderId) -> Result<bool, StoreError> {
        Ok(self.write()?.intents.remove(&order_id).is_some())
    }

    fn take_intent_by_gateway_id(
        &self,
        gateway_id: &str,
    ) -> Result<Option<PaymentIntentRecord>, StoreError> {
        let mut state = self.write()?;
        let order_id = state
            .intents
            .values()
            .find(|i| i.gateway_id == gateway_id)
            .map(|i| i.order_id);
        Ok(order_id.and_then(|id| state.intents.remove(&id)))
    }

    fn save_intent(
        &self,
        intent: PaymentIntentRecord,
        consume_discount: bool,
    ) -> Result<(), StoreError> {
        self.write()?.put_intent(intent, consume_discount);
        Ok(())
    }

    fn complete_recurring_charge(
        &self,
        intent: PaymentIntentRecord,
        consume_discount: bool,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.pending_charges.remove(&intent.order_id);
        state.put_intent(intent, consume_discount);
        Ok(())
    }

    fn record_payment(
        &self,
        payment: Payment,
        task: InvoiceTask,
        tax: Option<Money>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if by_id(&state.payments, &payment.id).is_some() {
            return Err(StoreError::AlreadyExists(format!("payment {}", payment.id)));
        }
        if let Some(amount) = tax {
            state.next_tax_id += 1;
            let entry = TaxEntry {
                id: state.next_tax_id,
                amount,
                recorded_at: payment.created_at,
            };
            state.tax_entries.push(entry);
        }
        state.invoice_tasks.push(task);
        state.payments.push(payment);
        Ok(())
    }

    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        Ok(by_id(&self.read()?.payments, &id).cloned())
    }

    fn payments(&self) -> Result<Vec<Payment>, StoreError> {
        Ok(self.read()?.payments.clone())
    }

    fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>, StoreError> {
        let mut payments: Vec<_> = self
            .read()?
            .payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    fn payment_by_intent(&self, gateway_id: &str) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .read()?
            .payments
            .iter()
            .find(|p| p.gateway_intent_id.as_deref() == Some(gateway_id))
            .cloned())
    }

    fn tax_entries(&self) -> Result<Vec<TaxEntry>, StoreError> {
        Ok(self.read()?.tax_entries.clone())
    }

    fn clear_taxes(&self, up_to: u64) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        let before = state.tax_entries.len();
        state.tax_entries.retain(|e| e.id > up_to);
        Ok(before - state.tax_entries.len())
    }

    fn invoice_tasks(&self, kind: InvoiceTaskKind) -> Result<Vec<InvoiceTask>, StoreError> {
        Ok(self
            .read()?
            .invoice_tasks
            .iter()
            .filter(|t| t.kind == kind)
            .cloned()
            .collect())
    }

    fn invoice(&self, payment_id: PaymentId) -> Result<Option<InvoiceRecord>, StoreError> {
        Ok(self.read()?.invoices.get(&payment_id).cloned())
    }

    fn complete_invoice(&self, record: InvoiceRecord) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.invoices.contains_key(&record.payment_id) {
            return Err(StoreError::AlreadyExists(format!(
                "invoice for payment {}",
                record.payment_id
            )));
        }
        state.invoice_tasks.retain(|t| t.payment_id != record.payment_id);
        state.invoices.insert(record.payment_id, record);
        Ok(())
    }

    fn complete_global_invoice(&self, records: Vec<InvoiceRecord>) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if let Some(existing) = records.iter().find(|r| state.invoices.contains_key(&r.payment_id)) {
            return Err(StoreError::AlreadyExists(format!(
                "invoice for payment {}",
                existing.payment_id
            )));
        }
        state.invoice_tasks.retain(|t| {
            t.kind != InvoiceTaskKind::Global || !records.iter().any(|r| r.payment_id == t.payment_id)
        });
        for record in records {
            state.invoices.insert(record.payment_id, record);
        }
        Ok(())
    }

    fn replace_invoice(&self, record: InvoiceRecord) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.invoices.contains_key(&record.payment_id) {
            return Err(StoreError::NotFound(format!(
                "invoice for payment {}",
                record.payment_id
            )));
        }
        state.invoices.insert(record.payment_id, record);
        Ok(())
    }

    fn insert_pending_charge(&self, charge: PendingCharge) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        if state.pending_charges.contains_key(&charge.order_id) {
            return Ok(false);
        }
        state.pending_charges.insert(charge.order_id, charge);
        Ok(true)
    }

    fn pending_charges(&self) -> Result<Vec<PendingCharge>, StoreError> {
        let mut charges: Vec<_> = self.read()?.pending_charges.values().cloned().collect();
        charges.sort_by_key(|c| c.created_at);
        Ok(charges)
    }

    fn update_pending_charge(&self, charge: &PendingCharge) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let slot = state
            .pending_charges
            .get_mut(&charge.order_id)
            .ok_or_else(|| StoreError::NotFound(format!("pending charge {}", charge.order_id)))?;
        *slot = charge.clone();
        Ok(())
    }

    fn delete_pending_charge(&self, order_id: OrderId) -> Result<bool, StoreError> {
        Ok(self.write()?.pending_charges.remove(&order_id).is_some())
    }
}
