//! # Observability & Tracing
//!
//! Structured logging for everything built on the backbone.
//!
//! ## What Gets Traced
//!
//! - **Lifecycle**: every transition start, completion and failure, with the
//!   component name, operation and resulting status as fields
//! - **Discovery**: locator cache hits, registry round trips and pushed changes
//! - **Calls**: one span per typed call (`channel`, `method`), timeouts and
//!   transport failures as warnings
//!
//! ## Usage
//!
//! ```bash
//! # Transitions and connections
//! RUST_LOG=info cargo run
//!
//! # Per-call spans, progress reports, cache hits
//! RUST_LOG=debug cargo run
//!
//! # Only the core
//! RUST_LOG=backbone_core=debug cargo run
//! ```
//!
//! A started instance logs like:
//!
//! ```text
//! INFO connect: Resolved target=sitewhere-device-state.iot.svc.cluster.local:9000 channel="device-state:DeviceStateApi"
//! INFO connect: Connected target=sitewhere-device-state.iot.svc.cluster.local:9000 channel="device-state:DeviceStateApi"
//! INFO Transition complete component="device-state:DeviceStateApi" status=Started
//! ```

/// Installs the global subscriber: `RUST_LOG` filtering, compact output, no
/// module targets. Calling it again is a no-op, so tests may call it freely.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
