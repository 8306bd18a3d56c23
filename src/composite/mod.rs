//! # Composite Aggregates
//!
//! Asynchronous propagation of constituent resource changes to the composite
//! aggregates that reference them.
//!
//! - [`notification`]: which aggregates to notify for a completed operation,
//!   and the chain delivering those notifications off the caller's path
//! - [`reconciler`]: the aggregate side, keeping component membership and
//!   merged tenant scoping eventually consistent

pub mod notification;
pub mod reconciler;

pub use notification::{
    aggregate_links, plan_notifications, AggregateNotifier, ChangeContext, CompositeNotification,
    CompositeNotificationChain,
};
pub use reconciler::{CompositeComponent, CompositeComponentReconciler};
