//! Invoicing domain module.
//!
//! Provider line items with VAT extraction, the invoice task queue entries,
//! issued-invoice records with their replacement window, and the request
//! shapes handed to the invoicing provider. No IO.

pub mod concept;
pub mod record;
pub mod request;
pub mod task;

pub use concept::{InvoiceConcept, VAT_RATE_PERCENT, VatTransfer, concepts_for, net_of_vat};
pub use record::{CancellationReason, InvoiceRecord};
pub use request::{BillingProfile, GlobalPeriod, InvoiceRequest, InvoiceScope};
pub use task::{InvoiceTask, InvoiceTaskKind};
