//! Wire types (DTOs) and RPC method descriptors of the platform functions this
//! crate talks to.
//!
//! Every type here is shared by the calling side ([`crate::clients`]) and the
//! in-memory services ([`crate::runtime::services`]), so requests and responses
//! are `Serialize + Deserialize` in both directions.

pub mod asset;
pub mod batch;
pub mod device_state;
pub mod tenant;

pub use asset::*;
pub use batch::*;
pub use device_state::*;
pub use tenant::*;

use backbone_core::{FunctionIdentifier, ServiceIdentifier};

/// Where a platform API lives: the function that serves it and the RPC
/// service name within that function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub function: FunctionIdentifier,
    pub service: ServiceIdentifier,
}

impl ApiEndpoint {
    pub fn new(function: FunctionIdentifier, service: &str) -> Self {
        Self {
            function,
            service: ServiceIdentifier::new(service),
        }
    }

    pub fn device_state() -> Self {
        Self::new(FunctionIdentifier::multitenant("device-state"), "DeviceStateApi")
    }

    pub fn batch_operations() -> Self {
        Self::new(FunctionIdentifier::multitenant("batch-operations"), "BatchOperationsApi")
    }

    pub fn asset_management() -> Self {
        Self::new(FunctionIdentifier::multitenant("asset-management"), "AssetManagementApi")
    }

    pub fn instance_management() -> Self {
        Self::new(FunctionIdentifier::global("instance-management"), "InstanceManagementApi")
    }

    /// Every endpoint the instance wires a channel for.
    pub fn all() -> Vec<Self> {
        vec![
            Self::device_state(),
            Self::batch_operations(),
            Self::asset_management(),
            Self::instance_management(),
        ]
    }
}
