use backbone_core::ApiMethod;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Unprocessed,
    Processing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementStatus {
    Pending,
    Succeeded,
    Failed,
}

/// One operation fanned out to a set of devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    pub token: String,
    pub operation_type: String,
    pub status: BatchStatus,
    pub element_count: usize,
}

/// Per-device progress of a batch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchElement {
    pub batch_token: String,
    pub index: usize,
    pub device_token: String,
    pub status: ElementStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBatchOperation {
    pub operation_type: String,
    pub device_tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListBatchElements {
    pub batch_token: String,
}

pub struct CreateBatchOperationMethod;

impl ApiMethod for CreateBatchOperationMethod {
    const NAME: &'static str = "createBatchOperation";
    type Request = CreateBatchOperation;
    type Response = BatchOperation;
}

pub struct ListBatchElementsMethod;

impl ApiMethod for ListBatchElementsMethod {
    const NAME: &'static str = "listBatchElements";
    type Request = ListBatchElements;
    type Response = BatchElement;
}
