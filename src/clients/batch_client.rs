use crate::clients::api_client::TenantApiClient;
use crate::clients::{ClientError, StreamCollector};
use crate::domain::{
    BatchElement, BatchOperation, CreateBatchOperation, CreateBatchOperationMethod, ListBatchElements,
    ListBatchElementsMethod,
};
use backbone_core::{MultitenantApiChannel, StreamHandle, StreamHandler, TenantId};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Client for the batch-operations function.
#[derive(Clone)]
pub struct BatchOperationsClient {
    inner: Arc<MultitenantApiChannel>,
}

impl BatchOperationsClient {
    pub fn new(inner: Arc<MultitenantApiChannel>) -> Self {
        Self { inner }
    }

    #[instrument(skip(self, device_tokens), fields(devices = device_tokens.len()))]
    pub async fn create_batch_operation(
        &self,
        tenant: &TenantId,
        operation_type: &str,
        device_tokens: Vec<String>,
    ) -> Result<BatchOperation, ClientError> {
        if device_tokens.is_empty() {
            return Err(ClientError::InvalidRequest("batch operation has no devices".into()));
        }
        info!("Sending create_batch_operation");
        let request = CreateBatchOperation {
            operation_type: operation_type.to_string(),
            device_tokens,
        };
        self.call::<CreateBatchOperationMethod>(tenant, &request).await
    }

    /// Streams the elements of a batch, in index order.
    pub async fn list_batch_elements<H>(
        &self,
        tenant: &TenantId,
        batch_token: &str,
        handler: H,
    ) -> Result<StreamHandle, ClientError>
    where
        H: StreamHandler<BatchElement>,
    {
        let request = ListBatchElements {
            batch_token: batch_token.to_string(),
        };
        self.stream::<ListBatchElementsMethod, H>(tenant, &request, handler).await
    }

    /// Reads the whole element stream of a batch into memory.
    #[instrument(skip(self))]
    pub async fn collect_batch_elements(
        &self,
        tenant: &TenantId,
        batch_token: &str,
    ) -> Result<Vec<BatchElement>, ClientError> {
        debug!("Collecting batch elements");
        let (collector, outcome) = StreamCollector::new();
        let handle = self.list_batch_elements(tenant, batch_token, collector).await?;
        let elements = outcome
            .await
            .map_err(|_| ClientError::Communication("batch element stream ended early".into()))?;
        handle.join().await;
        elements
    }
}

impl TenantApiClient for BatchOperationsClient {
    fn inner(&self) -> &Arc<MultitenantApiChannel> {
        &self.inner
    }
}
