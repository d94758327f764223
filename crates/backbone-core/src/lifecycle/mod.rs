//! # Lifecycle State Machine
//!
//! Per-component status, guarded transitions, child cascades and error capture.
//!
//! - [`LifecycleStatus`] / [`LifecycleOperation`] - the states and the transition table
//! - [`LifecycleComponent`] - the tree node (identity, status, error stack, children)
//! - [`Lifecycle`] - the capability implemented by channels, caches, tenant engines
//!   and microservices

pub mod component;
pub(crate) mod engine;
pub mod status;

pub use component::{
    ComponentId, ComponentType, Lifecycle, LifecycleComponent, DEFAULT_ERROR_STACK_LIMIT,
};
pub use status::{LifecycleOperation, LifecycleStatus};
