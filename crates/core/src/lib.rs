//! `atelier-core`: shared building blocks for the billing engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, integer-cent money, percentages and the domain error model.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ItemId, OrderId, OwnerId, PaymentId};
pub use money::{Money, Percentage};
