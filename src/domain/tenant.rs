use backbone_core::{ApiMethod, TenantId};
use serde::{Deserialize, Serialize};

/// A tenant registered with the instance.
///
/// Only instance management knows the tenant list; every other function learns
/// tenants from it and runs one tenant engine per entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub token: String,
    pub name: String,
    /// Opaque credential attached to calls made on the tenant's behalf.
    pub authentication_token: String,
}

impl Tenant {
    pub fn new(token: impl Into<String>, name: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            authentication_token: format!("tenant-{token}-secret"),
            name: name.into(),
            token,
        }
    }

    pub fn id(&self) -> TenantId {
        TenantId::new(self.token.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTenant {
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTenants {}

pub struct GetTenantMethod;

impl ApiMethod for GetTenantMethod {
    const NAME: &'static str = "getTenant";
    type Request = GetTenant;
    type Response = Tenant;
}

pub struct ListTenantsMethod;

impl ApiMethod for ListTenantsMethod {
    const NAME: &'static str = "listTenants";
    type Request = ListTenants;
    type Response = Vec<Tenant>;
}
