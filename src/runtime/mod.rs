//! Runtime orchestration of a microservice instance.
//!
//! This module contains the infrastructure for running the instance:
//!
//! - **Instance lifecycle**: wiring channels and caches under one microservice,
//!   starting them and shutting them down
//! - **Tenant engines**: per-tenant workers built and managed as tenants come
//!   and go
//! - **Demo services**: in-process platform functions to run against
//!
//! # Main Components
//!
//! - [`DeviceInstance`] - The orchestrator owning all clients and tenant engines
//! - [`TenantEngineBuilder`] - Builds the engine run for each tenant
//! - [`DemoServices`] - In-memory device-state, batch, asset and tenant services

pub mod instance;
pub mod services;
pub mod tenant_engine;

pub use instance::*;
pub use services::DemoServices;
pub use tenant_engine::*;
