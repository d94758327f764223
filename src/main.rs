//! # Device Backbone Demo
//!
//! Runs one instance against in-process platform functions:
//! 1. Binding the [`DemoServices`] and registering two tenants.
//! 2. Starting the [`DeviceInstance`] and its tenant engines.
//! 3. Recording measurements, looking up assets and running a batch for each tenant.
//! 4. Printing the aggregated instance state and shutting down.

use backbone_core::tracing::setup_tracing;
use backbone_core::transport::memory::MemoryConnector;
use backbone_core::InstanceSettings;
use device_backbone::clients::ClientError;
use device_backbone::domain::{Asset, Tenant};
use device_backbone::runtime::{DemoServices, DeviceInstance, InstanceError};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

const SETTINGS_ENV: &str = "BACKBONE_SETTINGS";

const DEFAULT_SETTINGS: &str = r#"
instance_id = "sitewhere"
namespace = "iot"
call_timeout_ms = 2000

[caches.asset-lookup]
ttl_seconds = 30
"#;

fn load_settings() -> Result<InstanceSettings, InstanceError> {
    let settings = match std::env::var(SETTINGS_ENV) {
        Ok(path) => InstanceSettings::load(path),
        Err(_) => InstanceSettings::from_toml_str(DEFAULT_SETTINGS),
    }
    .map_err(backbone_core::BackboneError::from)?;
    Ok(settings.with_env_overrides())
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), InstanceError> {
    setup_tracing();

    let settings = load_settings()?;
    info!(instance = %settings.instance_id, namespace = %settings.namespace, "Starting demo");

    let connector = MemoryConnector::new();
    let services = DemoServices::bind(&connector, &settings);
    let tenants = [Tenant::new("acme", "Acme Corp"), Tenant::new("globex", "Globex")];
    for tenant in &tenants {
        services.instance_management.add_tenant(tenant.clone());
        services
            .assets
            .insert(&tenant.id(), Asset::new("pump-7", format!("{} pump", tenant.name), "pump"));
    }

    let instance = DeviceInstance::new(settings, Arc::new(connector));
    instance.start().await?;
    let started = instance.bootstrap_tenants().await?;
    info!(started, "Tenant engines running");

    for tenant in &tenants {
        let id = tenant.id();
        let span = tracing::info_span!("tenant_work", tenant = %id);
        async {
            let state = instance
                .device_state
                .record_measurement(&id, "device-1", "temperature", 21.5, now_ms())
                .await?;
            info!(device = %state.device_token, presence = ?state.presence, "Measurement recorded");

            let asset = instance.assets.get_asset(&id, "pump-7").await?;
            let cached = instance.assets.get_asset(&id, "pump-7").await?;
            let same = asset == cached;
            info!(asset = %asset.name, same, "Asset looked up");

            let batch = instance
                .batch_operations
                .create_batch_operation(&id, "firmware-update", vec!["device-1".into(), "device-2".into()])
                .await?;
            let elements = instance
                .batch_operations
                .collect_batch_elements(&id, &batch.token)
                .await?;
            info!(batch = %batch.token, elements = elements.len(), "Batch finished");

            if let Err(e) = instance.device_state.get_device_state(&id, "missing-device").await {
                warn!(error = %e, "Expected lookup failure");
            }
            Ok::<_, ClientError>(())
        }
        .instrument(span)
        .await?;
    }

    let state = instance.state();
    match serde_json::to_string_pretty(&state) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "Could not render instance state"),
    }

    instance.shutdown().await?;
    info!("Demo complete");
    Ok(())
}
