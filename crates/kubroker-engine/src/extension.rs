//! Per-service-type customisation hooks.
//!
//! A [`ServiceExtension`] is registered under a service name. The render
//! pipeline calls the `apply_*` hooks; the orchestrator calls the lifecycle
//! hooks. Every hook has a no-op default.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kubroker_cluster::ServiceMap;
use kubroker_core::{InstanceRecord, Parameters, Plan};

use crate::error::{BrokerError, Result};
use crate::types::{BindRequest, Credentials, OperationState, UnbindRequest};

/// Failure reported by an extension hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ExtensionError(pub String);

impl ExtensionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type HookResult<T> = std::result::Result<T, ExtensionError>;

#[async_trait]
pub trait ServiceExtension: Send + Sync {
    /// Service name this extension handles; matches the catalog offering name.
    fn name(&self) -> &str;

    /// Maps caller parameters onto manifest fields.
    fn apply_parameters(&self, manifest: &str, _params: &Parameters) -> HookResult<String> {
        Ok(manifest.to_string())
    }

    /// Injects the plan's quota into resource fields.
    fn apply_plan(&self, manifest: &str, _plan: &Plan) -> HookResult<String> {
        Ok(manifest.to_string())
    }

    /// Runs after the Service documents are applied, with their namespace -> name map.
    fn apply_special(&self, manifest: &str, _services: &ServiceMap) -> HookResult<String> {
        Ok(manifest.to_string())
    }

    fn dashboard_url(
        &self,
        _params: &Parameters,
        _services: &ServiceMap,
    ) -> HookResult<Option<String>> {
        Ok(None)
    }

    async fn before_delete(&self, _instance: &InstanceRecord) -> HookResult<()> {
        Ok(())
    }

    async fn after_delete(&self, _instance: &InstanceRecord) -> HookResult<()> {
        Ok(())
    }

    /// Service-level judgement, consulted only once every pod is ready.
    async fn last_state_check(&self, _instance: &InstanceRecord) -> HookResult<OperationState> {
        Ok(OperationState::Succeeded)
    }

    async fn bind(
        &self,
        _request: &BindRequest,
        _instance: Option<&InstanceRecord>,
    ) -> HookResult<Credentials> {
        Ok(Credentials::new())
    }

    async fn unbind(&self, _request: &UnbindRequest) -> HookResult<()> {
        Ok(())
    }
}

pub type DynExtension = Arc<dyn ServiceExtension>;

/// Service name -> extension. Immutable once handed to the broker.
#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    extensions: HashMap<String, DynExtension>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.extensions.keys().collect();
        names.sort();
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &names)
            .finish()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an extension, replacing any previous one with the same name.
    #[must_use]
    pub fn with(mut self, extension: impl ServiceExtension + 'static) -> Self {
        self.register(Arc::new(extension));
        self
    }

    pub fn register(&mut self, extension: DynExtension) {
        self.extensions
            .insert(extension.name().to_string(), extension);
    }

    /// # Errors
    ///
    /// `BrokerError::ExtensionNotFound` for an unregistered service name.
    pub fn get(&self, service_name: &str) -> Result<&DynExtension> {
        self.extensions
            .get(service_name)
            .ok_or_else(|| BrokerError::ExtensionNotFound(service_name.to_string()))
    }

    pub fn contains(&self, service_name: &str) -> bool {
        self.extensions.contains_key(service_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }
}
