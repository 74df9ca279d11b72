//! Infrastructure layer: storage, collaborator seams, configuration, the
//! billing services and the sweep runner that drives them.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod provider;
pub mod runner;
pub mod services;
pub mod store;
pub mod sweep;

pub use config::BillingConfig;
pub use engine::BillingEngine;
pub use error::{BillingError, BillingResult};
pub use runner::{SweepRunner, SweepRunnerHandle};
pub use store::{BillingStore, InMemoryBillingStore, Owner};
pub use sweep::{SweepKind, SweepReport};

#[cfg(test)]
pub(crate) mod testing;
