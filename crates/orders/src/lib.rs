//! Orders domain module.
//!
//! Business rules for service orders: terms, the status lifecycle and its
//! guarded transitions, items, discounts, contracts, the proportional discount
//! allocator and the installment schedule. Pure domain logic only (no IO, no
//! storage, no clock).

pub mod contract;
pub mod discount;
pub mod item;
pub mod order;
pub mod schedule;
pub mod transition;

pub use contract::{Contract, Deliverable, Goal, GoalKind, UsageLimit};
pub use discount::{AllocatedLine, Discount, Distribution, NewDiscount, PricedLine, allocate_discount};
pub use item::{ItemKind, ItemUpdate, NewItem, OrderItem};
pub use order::{NewOrder, Order, OrderStatus, OrderTerms, OrderUpdate};
pub use schedule::{installment_interval, next_installment_due, next_subscription_charge};
pub use transition::{Transition, TransitionContext, check_transition};
