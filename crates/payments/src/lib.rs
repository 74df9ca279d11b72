//! Payments domain module.
//!
//! Settled payments, the normalized payment-means codes, live payment intents,
//! recurring-charge retry state and the embedded-tax ledger. Deterministic
//! domain logic only; gateway calls live in `atelier-infra`.

pub mod charge;
pub mod intent;
pub mod means;
pub mod payment;
pub mod tax;

pub use charge::PendingCharge;
pub use intent::{IntentOrigin, PaymentIntentRecord};
pub use means::{CardFunding, MethodKind, PaymentMeans};
pub use payment::Payment;
pub use tax::{TaxEntry, TaxSummary, embedded_tax};
