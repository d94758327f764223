use backbone_core::ApiMethod;
use serde::{Deserialize, Serialize};

/// Physical or logical thing a device is associated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub token: String,
    pub name: String,
    pub asset_type: String,
}

impl Asset {
    pub fn new(token: impl Into<String>, name: impl Into<String>, asset_type: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            name: name.into(),
            asset_type: asset_type.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetAsset {
    pub token: String,
}

pub struct GetAssetMethod;

impl ApiMethod for GetAssetMethod {
    const NAME: &'static str = "getAsset";
    type Request = GetAsset;
    type Response = Asset;
}
