use crate::clients::api_client::TenantApiClient;
use crate::clients::ClientError;
use crate::domain::{
    DeviceState, GetDeviceState, GetDeviceStateMethod, RecordMeasurement, RecordMeasurementMethod,
    WatchDeviceStates, WatchDeviceStatesMethod,
};
use backbone_core::{MultitenantApiChannel, StreamHandle, StreamHandler, TenantId};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Client for the device-state function.
#[derive(Clone)]
pub struct DeviceStateClient {
    inner: Arc<MultitenantApiChannel>,
}

impl DeviceStateClient {
    pub fn new(inner: Arc<MultitenantApiChannel>) -> Self {
        Self { inner }
    }

    #[instrument(skip(self))]
    pub async fn get_device_state(&self, tenant: &TenantId, device_token: &str) -> Result<DeviceState, ClientError> {
        debug!("Sending request");
        let request = GetDeviceState {
            device_token: device_token.to_string(),
        };
        self.call::<GetDeviceStateMethod>(tenant, &request).await
    }

    #[instrument(skip(self))]
    pub async fn record_measurement(
        &self,
        tenant: &TenantId,
        device_token: &str,
        name: &str,
        value: f64,
        timestamp_ms: u64,
    ) -> Result<DeviceState, ClientError> {
        debug!("Sending request");
        if name.is_empty() {
            return Err(ClientError::InvalidRequest("measurement name is empty".into()));
        }
        let request = RecordMeasurement {
            device_token: device_token.to_string(),
            name: name.to_string(),
            value,
            timestamp_ms,
        };
        self.call::<RecordMeasurementMethod>(tenant, &request).await
    }

    /// Streams the current state of `device_tokens` (all devices when empty).
    pub async fn watch_device_states<H>(
        &self,
        tenant: &TenantId,
        device_tokens: Vec<String>,
        handler: H,
    ) -> Result<StreamHandle, ClientError>
    where
        H: StreamHandler<DeviceState>,
    {
        let request = WatchDeviceStates { device_tokens };
        self.stream::<WatchDeviceStatesMethod, H>(tenant, &request, handler).await
    }
}

impl TenantApiClient for DeviceStateClient {
    fn inner(&self) -> &Arc<MultitenantApiChannel> {
        &self.inner
    }
}
