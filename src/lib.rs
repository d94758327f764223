//! # Device Backbone
//!
//! > **One microservice instance of a multitenant IoT device-management platform,
//! > wired on [`backbone_core`].**
//!
//! This crate puts the backbone to work: it talks to the platform functions it
//! depends on (device state, batch operations, asset management, instance
//! management) through typed clients, runs one tenant engine per tenant, and
//! reports a single aggregated state for the whole instance.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Why a channel per function?
//! - **One connection, many tenants**: every function gets one
//!   [`MultitenantApiChannel`](backbone_core::MultitenantApiChannel); tenants
//!   are a tag on each call, never a connection of their own.
//! - **Uniform lifecycle**: channels, caches and tenant workers are all
//!   [`Lifecycle`](backbone_core::Lifecycle) components under one microservice,
//!   so starting, stopping and health reporting work the same for all of them.
//! - **Isolation**: a tenant whose engine fails is visible in the instance
//!   state and nothing else; the other tenants keep running.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Wire Types ([`domain`])
//! Requests, responses and [`ApiMethod`](backbone_core::ApiMethod) descriptors
//! for each platform function, plus [`ApiEndpoint`](domain::ApiEndpoint)
//! naming where each one lives.
//!
//! ### 2. The Interface ([`clients`])
//! We don't expose raw channels to the rest of the app.
//! - **Role**: Wraps the backbone channels in function-specific clients to
//!   provide type safety and one error type, [`ClientError`](clients::ClientError).
//! - **Key items**: [`TenantApiClient`](clients::TenantApiClient),
//!   [`DeviceStateClient`](clients::DeviceStateClient),
//!   [`AssetClient`](clients::AssetClient).
//!
//! ### 3. The Orchestrator ([`runtime`])
//! - **Role**: Builds the instance, brings it up, adds tenants and shuts it
//!   down.
//! - **Key items**: [`DeviceInstance`](runtime::DeviceInstance),
//!   [`TenantEngineBuilder`](runtime::TenantEngineBuilder),
//!   [`DemoServices`](runtime::DemoServices).
//!
//! ## 🚀 Quick Start
//!
//! ### Running the Demo
//!
//! ```bash
//! # Run with info logs
//! RUST_LOG=info cargo run
//!
//! # Load settings from a file
//! BACKBONE_SETTINGS=config/instance.toml cargo run
//! ```
//!
//! ### Running Tests
//!
//! ```bash
//! cargo test --workspace
//! ```

pub mod clients;
pub mod domain;
pub mod runtime;
