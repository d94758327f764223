//! In-process stand-ins for the platform functions the instance calls.
//!
//! Each service is a [`ServiceHandler`] bound on a [`MemoryConnector`] at the
//! address cluster DNS would give its function, so the instance resolves and
//! connects to them exactly as it would to real deployments.
//!
//! All services answer with the status codes the clients classify:
//! `NOT_FOUND`, `INVALID_ARGUMENT`, `UNAUTHENTICATED` and `UNIMPLEMENTED`.

use crate::domain::{
    ApiEndpoint, Asset, BatchElement, BatchOperation, BatchStatus, CreateBatchOperation, DeviceState,
    ElementStatus, GetAsset, GetDeviceState, GetTenant, ListBatchElements, Presence, RecordMeasurement, Tenant,
    WatchDeviceStates,
};
use async_trait::async_trait;
use backbone_core::locator::DnsRegistry;
use backbone_core::transport::memory::{MemoryConnector, ServiceHandler};
use backbone_core::transport::{RpcRequest, TransportError};
use backbone_core::{InstanceSettings, JsonCodec, PayloadCodec, ServiceTarget, TenantId};
use bytes::Bytes;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

fn decode<T: Serialize + DeserializeOwned>(request: &RpcRequest) -> Result<T, TransportError> {
    JsonCodec::<T>::new()
        .decode(&request.payload)
        .map_err(|e| TransportError::status("INVALID_ARGUMENT", e.to_string()))
}

fn encode<T: Serialize + DeserializeOwned>(value: &T) -> Result<Bytes, TransportError> {
    JsonCodec::<T>::new()
        .encode(value)
        .map_err(|e| TransportError::status("INTERNAL", e.to_string()))
}

/// Tenant the call is made for. Calls without a tenant or a credential are
/// refused.
fn authenticate(request: &RpcRequest) -> Result<TenantId, TransportError> {
    let tenant = request
        .metadata
        .tenant()
        .ok_or_else(|| TransportError::status("UNAUTHENTICATED", "call carries no tenant"))?;
    match request.metadata.authorization() {
        Some(token) if !token.is_empty() => Ok(tenant),
        _ => Err(TransportError::status(
            "UNAUTHENTICATED",
            format!("no credential for tenant '{tenant}'"),
        )),
    }
}

fn unimplemented(request: &RpcRequest) -> TransportError {
    TransportError::status(
        "UNIMPLEMENTED",
        format!("{} has no method {}", request.service, request.method),
    )
}

/// Device-state function: last known state per (tenant, device).
#[derive(Default)]
pub struct DeviceStateService {
    states: DashMap<(TenantId, String), DeviceState>,
}

impl DeviceStateService {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, tenant: TenantId, request: GetDeviceState) -> Result<DeviceState, TransportError> {
        self.states
            .get(&(tenant, request.device_token.clone()))
            .map(|state| state.value().clone())
            .ok_or_else(|| {
                TransportError::status("NOT_FOUND", format!("device '{}'", request.device_token))
            })
    }

    fn record(&self, tenant: TenantId, request: RecordMeasurement) -> DeviceState {
        let mut state = self
            .states
            .entry((tenant, request.device_token.clone()))
            .or_insert_with(|| DeviceState::unknown(request.device_token.as_str()));
        state.presence = Presence::Present;
        state.last_interaction_ms = Some(request.timestamp_ms);
        state.measurements.insert(request.name, request.value);
        state.value().clone()
    }

    fn snapshot(&self, tenant: &TenantId, filter: &[String]) -> Vec<DeviceState> {
        let mut states: Vec<DeviceState> = self
            .states
            .iter()
            .filter(|entry| &entry.key().0 == tenant)
            .filter(|entry| filter.is_empty() || filter.contains(&entry.key().1))
            .map(|entry| entry.value().clone())
            .collect();
        states.sort_by(|a, b| a.device_token.cmp(&b.device_token));
        states
    }
}

#[async_trait]
impl ServiceHandler for DeviceStateService {
    async fn handle(&self, request: RpcRequest) -> Result<Bytes, TransportError> {
        let tenant = authenticate(&request)?;
        match request.method.as_str() {
            "getDeviceState" => encode(&self.get(tenant, decode(&request)?)?),
            "recordMeasurement" => encode(&self.record(tenant, decode(&request)?)),
            _ => Err(unimplemented(&request)),
        }
    }

    async fn handle_stream(
        &self,
        request: RpcRequest,
        frames: mpsc::Sender<Result<Bytes, TransportError>>,
    ) -> Result<(), TransportError> {
        let tenant = authenticate(&request)?;
        if request.method != "watchDeviceStates" {
            return Err(unimplemented(&request));
        }
        let watch: WatchDeviceStates = decode(&request)?;
        for state in self.snapshot(&tenant, &watch.device_tokens) {
            if frames.send(Ok(encode(&state)?)).await.is_err() {
                debug!(%tenant, "Watcher went away");
                break;
            }
        }
        Ok(())
    }
}

/// Batch-operations function. Batches are processed as soon as they are
/// created.
#[derive(Default)]
pub struct BatchOperationsService {
    batches: DashMap<(TenantId, String), Vec<BatchElement>>,
    next_batch: AtomicU64,
}

impl BatchOperationsService {
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&self, tenant: TenantId, request: CreateBatchOperation) -> Result<BatchOperation, TransportError> {
        if request.device_tokens.is_empty() {
            return Err(TransportError::status("INVALID_ARGUMENT", "batch operation has no devices"));
        }
        let token = format!("batch-{}", self.next_batch.fetch_add(1, Ordering::SeqCst) + 1);
        let elements: Vec<BatchElement> = request
            .device_tokens
            .into_iter()
            .enumerate()
            .map(|(index, device_token)| BatchElement {
                batch_token: token.clone(),
                index,
                device_token,
                status: ElementStatus::Succeeded,
            })
            .collect();
        let operation = BatchOperation {
            token: token.clone(),
            operation_type: request.operation_type,
            status: BatchStatus::Finished,
            element_count: elements.len(),
        };
        self.batches.insert((tenant, token), elements);
        Ok(operation)
    }
}

#[async_trait]
impl ServiceHandler for BatchOperationsService {
    async fn handle(&self, request: RpcRequest) -> Result<Bytes, TransportError> {
        let tenant = authenticate(&request)?;
        match request.method.as_str() {
            "createBatchOperation" => encode(&self.create(tenant, decode(&request)?)?),
            _ => Err(unimplemented(&request)),
        }
    }

    async fn handle_stream(
        &self,
        request: RpcRequest,
        frames: mpsc::Sender<Result<Bytes, TransportError>>,
    ) -> Result<(), TransportError> {
        let tenant = authenticate(&request)?;
        if request.method != "listBatchElements" {
            return Err(unimplemented(&request));
        }
        let list: ListBatchElements = decode(&request)?;
        let elements = self
            .batches
            .get(&(tenant, list.batch_token.clone()))
            .map(|elements| elements.value().clone())
            .ok_or_else(|| TransportError::status("NOT_FOUND", format!("batch '{}'", list.batch_token)))?;
        for element in elements {
            if frames.send(Ok(encode(&element)?)).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Asset-management function. Counts lookups so cache behavior is observable.
#[derive(Default)]
pub struct AssetService {
    assets: DashMap<(TenantId, String), Asset>,
    lookups: AtomicUsize,
}

impl AssetService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant: &TenantId, asset: Asset) {
        self.assets.insert((tenant.clone(), asset.token.clone()), asset);
    }

    /// Number of `getAsset` calls served.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceHandler for AssetService {
    async fn handle(&self, request: RpcRequest) -> Result<Bytes, TransportError> {
        let tenant = authenticate(&request)?;
        match request.method.as_str() {
            "getAsset" => {
                self.lookups.fetch_add(1, Ordering::SeqCst);
                let get: GetAsset = decode(&request)?;
                let asset = self
                    .assets
                    .get(&(tenant, get.token.clone()))
                    .map(|asset| asset.value().clone())
                    .ok_or_else(|| TransportError::status("NOT_FOUND", format!("asset '{}'", get.token)))?;
                encode(&asset)
            }
            _ => Err(unimplemented(&request)),
        }
    }
}

/// Instance-management function: the tenant registry. Global, so calls carry
/// no tenant.
#[derive(Default)]
pub struct InstanceManagementService {
    tenants: DashMap<String, Tenant>,
}

impl InstanceManagementService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tenant(&self, tenant: Tenant) {
        self.tenants.insert(tenant.token.clone(), tenant);
    }

    pub fn remove_tenant(&self, token: &str) -> Option<Tenant> {
        self.tenants.remove(token).map(|(_, tenant)| tenant)
    }

    fn list(&self) -> Vec<Tenant> {
        let mut tenants: Vec<Tenant> = self.tenants.iter().map(|t| t.value().clone()).collect();
        tenants.sort_by(|a, b| a.token.cmp(&b.token));
        tenants
    }
}

#[async_trait]
impl ServiceHandler for InstanceManagementService {
    async fn handle(&self, request: RpcRequest) -> Result<Bytes, TransportError> {
        match request.method.as_str() {
            "getTenant" => {
                let get: GetTenant = decode(&request)?;
                let tenant = self
                    .tenants
                    .get(&get.token)
                    .map(|t| t.value().clone())
                    .ok_or_else(|| TransportError::status("NOT_FOUND", format!("tenant '{}'", get.token)))?;
                encode(&tenant)
            }
            "listTenants" => encode(&self.list()),
            _ => Err(unimplemented(&request)),
        }
    }
}

/// The full set of demo services, bound and ready to be called.
#[derive(Clone)]
pub struct DemoServices {
    pub device_state: Arc<DeviceStateService>,
    pub batch_operations: Arc<BatchOperationsService>,
    pub assets: Arc<AssetService>,
    pub instance_management: Arc<InstanceManagementService>,
    connector: MemoryConnector,
    dns: DnsRegistry,
    port: u16,
}

impl DemoServices {
    /// Binds every service on `connector` at its DNS address for `settings`.
    pub fn bind(connector: &MemoryConnector, settings: &InstanceSettings) -> Self {
        let services = Self {
            device_state: Arc::new(DeviceStateService::new()),
            batch_operations: Arc::new(BatchOperationsService::new()),
            assets: Arc::new(AssetService::new()),
            instance_management: Arc::new(InstanceManagementService::new()),
            connector: connector.clone(),
            dns: DnsRegistry::new(settings),
            port: settings.grpc_port,
        };
        connector.bind(
            services.target_for(&ApiEndpoint::device_state()),
            services.device_state.clone(),
        );
        connector.bind(
            services.target_for(&ApiEndpoint::batch_operations()),
            services.batch_operations.clone(),
        );
        connector.bind(
            services.target_for(&ApiEndpoint::asset_management()),
            services.assets.clone(),
        );
        connector.bind(
            services.target_for(&ApiEndpoint::instance_management()),
            services.instance_management.clone(),
        );
        services
    }

    /// Address the instance resolves `endpoint` to.
    pub fn target_for(&self, endpoint: &ApiEndpoint) -> ServiceTarget {
        ServiceTarget::new(self.dns.host_for(&endpoint.function), self.port)
    }

    /// Takes the function behind `endpoint` offline, severing live connections.
    pub fn take_down(&self, endpoint: &ApiEndpoint) {
        self.connector.unbind(&self.target_for(endpoint));
    }
}
