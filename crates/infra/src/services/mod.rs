//! The four billing services. Each holds shared handles to the store and the
//! collaborators it needs; all of them are cheap to clone.

pub mod invoices;
pub mod orders;
pub mod payments;
pub mod scheduler;

pub use invoices::{InvoiceTaskQueue, Requester};
pub use orders::{OrderStateMachine, OrderSummary};
pub use payments::{Checkout, PaymentInitialization, PaymentIntentManager};
pub use scheduler::RecurringBillingScheduler;
