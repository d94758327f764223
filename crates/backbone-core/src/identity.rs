//! # Identifiers
//!
//! Immutable, cheap-to-clone names used as discovery and scoping keys.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;

/// Whether a function runs one shared instance serving every tenant (tenant is
/// carried per call) or a single deployment-wide instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionScope {
    Multitenant,
    Global,
}

/// Stable name of a microservice capability, e.g. `batch-operations`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionIdentifier {
    name: Arc<str>,
    scope: FunctionScope,
}

impl FunctionIdentifier {
    pub fn new(name: impl Into<Arc<str>>, scope: FunctionScope) -> Self {
        Self {
            name: name.into(),
            scope,
        }
    }

    pub fn multitenant(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, FunctionScope::Multitenant)
    }

    pub fn global(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, FunctionScope::Global)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> FunctionScope {
        self.scope
    }
}

impl Display for FunctionIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// One RPC service exposed by a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceIdentifier(Arc<str>);

impl ServiceIdentifier {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ServiceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant token used to scope calls, caches and tenant engines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(Arc<str>);

impl TenantId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}
