//! The provisioning state machine behind the broker operations.

use std::fmt;
use std::sync::Arc;

use kubroker_cluster::{ApplyMode, KindFilter, Readiness, Reconciler, ServiceMap};
use kubroker_core::{
    Catalog, INSTANCE_NAME_PARAM, InstanceRecord, NAMESPACE_PARAM, Parameters, Plan,
    ServiceOffering, merge_params, string_param,
};
use kubroker_storage::DynInstanceStore;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::error::{BrokerError, Result};
use crate::extension::{ExtensionRegistry, ServiceExtension};
use crate::lock::InstanceLocks;
use crate::render::{IdentityContext, RenderPipeline, TemplateRenderer};
use crate::types::{
    Acknowledgement, BindRequest, BindResponse, DeprovisionRequest, LastOperationRequest,
    LastOperationResponse, Operation, OperationState, ProvisionRequest, UnbindRequest,
    UpdateRequest,
};

/// Drives provision, update, deprovision, status polls and bindings.
///
/// Mutating operations on one instance ID are serialized through
/// [`InstanceLocks`]. Cluster application is best-effort: a failure midway
/// leaves already-applied documents in place and persists no record.
#[derive(Clone)]
pub struct Broker {
    catalog: Arc<Catalog>,
    extensions: Arc<ExtensionRegistry>,
    store: DynInstanceStore,
    reconciler: Reconciler,
    renderer: Arc<TemplateRenderer>,
    locks: InstanceLocks,
    async_mode: bool,
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("services", &self.catalog.services().len())
            .field("extensions", &self.extensions)
            .field("store", &self.store.backend_name())
            .field("async_mode", &self.async_mode)
            .finish_non_exhaustive()
    }
}

/// How the two apply passes run for an operation.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Provision,
    Update,
}

impl Phase {
    fn mode(self) -> ApplyMode {
        match self {
            Self::Provision => ApplyMode::Create,
            Self::Update => ApplyMode::CreateOrUpdate,
        }
    }

    fn remainder(self) -> KindFilter {
        match self {
            Self::Provision => KindFilter::PROVISION_REMAINDER,
            Self::Update => KindFilter::UPDATE_REMAINDER,
        }
    }
}

/// What one render-and-apply run produced.
struct Deployment {
    manifest: String,
    services: ServiceMap,
}

fn required_param(params: &Parameters, key: &'static str) -> Result<String> {
    string_param(params, key).ok_or(BrokerError::MissingParameter(key))
}

fn serialize_params(params: &Parameters) -> String {
    Value::Object(params.clone()).to_string()
}

impl Broker {
    pub fn new(
        catalog: Arc<Catalog>,
        extensions: Arc<ExtensionRegistry>,
        store: DynInstanceStore,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            catalog,
            extensions,
            store,
            reconciler,
            renderer: Arc::new(TemplateRenderer::new()),
            locks: InstanceLocks::new(),
            async_mode: true,
        }
    }

    /// Whether provision, update and deprovision are acknowledged as asynchronous.
    #[must_use]
    pub fn with_async_mode(mut self, async_mode: bool) -> Self {
        self.async_mode = async_mode;
        self
    }

    pub fn async_mode(&self) -> bool {
        self.async_mode
    }

    pub fn catalog(&self) -> &[ServiceOffering] {
        self.catalog.services()
    }

    /// Checks that the persistence backend answers.
    pub async fn health(&self) -> Result<()> {
        self.store.ping().await?;
        Ok(())
    }

    fn acknowledge(
        &self,
        operation: Operation,
        instance_id: &str,
        dashboard_url: Option<String>,
    ) -> Acknowledgement {
        Acknowledgement {
            is_async: self.async_mode,
            operation: operation.token(instance_id),
            dashboard_url,
        }
    }

    /// Renders the template and applies it in two passes around the post-deploy stage.
    async fn deploy(
        &self,
        extension: &dyn ServiceExtension,
        template: &str,
        identity: &IdentityContext<'_>,
        params: &Parameters,
        plan: &Plan,
        phase: Phase,
    ) -> Result<Deployment> {
        let pipeline = RenderPipeline::new(&self.renderer, extension);
        let rendered = pipeline.render(template, identity, params, plan)?;

        let services = self
            .reconciler
            .apply_filtered(&rendered, KindFilter::SERVICES, phase.mode())
            .await?;
        debug!(services = ?services, "Applied service documents");

        let manifest = pipeline.finish(&rendered, &services)?;
        self.reconciler
            .apply_filtered(&manifest, phase.remainder(), phase.mode())
            .await?;

        Ok(Deployment { manifest, services })
    }

    #[instrument(skip_all, fields(instance_id = %request.instance_id, service_id = %request.service_id, plan_id = %request.plan_id))]
    pub async fn provision(&self, request: ProvisionRequest) -> Result<Acknowledgement> {
        let _guard = self.locks.acquire(&request.instance_id).await;

        if self.store.get(&request.instance_id).await?.is_some() {
            warn!("Instance already exists");
            return Err(BrokerError::InstanceExists(request.instance_id));
        }

        let service_name = self.catalog.service_name(&request.service_id)?;
        let plan = self.catalog.plan(&request.service_id, &request.plan_id)?;
        let template = self.catalog.template(service_name)?;
        let extension = self.extensions.get(service_name)?;

        let namespace = required_param(&request.parameters, NAMESPACE_PARAM)?;
        let instance_name = required_param(&request.parameters, INSTANCE_NAME_PARAM)?;
        let identity = IdentityContext {
            instance_id: &request.instance_id,
            namespace: &namespace,
            instance_name: &instance_name,
        };

        let deployment = self
            .deploy(
                extension.as_ref(),
                template,
                &identity,
                &request.parameters,
                plan,
                Phase::Provision,
            )
            .await?;

        let dashboard_url = extension
            .dashboard_url(&request.parameters, &deployment.services)
            .map_err(|e| BrokerError::hook("dashboard_url", e))?;

        let now = OffsetDateTime::now_utc();
        let record = InstanceRecord {
            instance_id: request.instance_id.clone(),
            service_id: request.service_id,
            service_name: service_name.to_string(),
            plan_id: request.plan_id,
            instance_name,
            namespace,
            organization_guid: request.organization_guid,
            space_guid: request.space_guid,
            parameters: serialize_params(&request.parameters),
            manifest: deployment.manifest,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&record).await?;

        info!(service = %record.service_name, namespace = %record.namespace, "Provisioned instance");
        Ok(self.acknowledge(Operation::Provision, &record.instance_id, dashboard_url))
    }

    /// Re-renders an existing instance with a new plan and/or parameters.
    ///
    /// The stored namespace and instance name are kept. Request parameters
    /// are overlaid on the stored ones; an absent plan keeps the stored plan.
    #[instrument(skip_all, fields(instance_id = %request.instance_id))]
    pub async fn update(&self, request: UpdateRequest) -> Result<Acknowledgement> {
        let _guard = self.locks.acquire(&request.instance_id).await;

        let Some(mut record) = self.store.get(&request.instance_id).await? else {
            return Err(BrokerError::InstanceGone(request.instance_id));
        };

        let service_id = if request.service_id.is_empty() {
            record.service_id.clone()
        } else {
            request.service_id
        };
        let plan_id = request.plan_id.unwrap_or_else(|| record.plan_id.clone());

        let service_name = self.catalog.service_name(&service_id)?;
        let plan = self.catalog.plan(&service_id, &plan_id)?;
        let template = self.catalog.template(service_name)?;
        let extension = self.extensions.get(service_name)?;

        let params = merge_params(&record.parsed_parameters(), &request.parameters);
        let identity = IdentityContext {
            instance_id: &record.instance_id,
            namespace: &record.namespace,
            instance_name: &record.instance_name,
        };

        let deployment = self
            .deploy(
                extension.as_ref(),
                template,
                &identity,
                &params,
                plan,
                Phase::Update,
            )
            .await?;

        let dashboard_url = extension
            .dashboard_url(&params, &deployment.services)
            .map_err(|e| BrokerError::hook("dashboard_url", e))?;

        record.plan_id = plan_id;
        record.parameters = serialize_params(&params);
        record.manifest = deployment.manifest;
        record.touch();
        self.store.update(&record).await?;

        info!(plan_id = %record.plan_id, "Updated instance");
        Ok(self.acknowledge(Operation::Update, &record.instance_id, dashboard_url))
    }

    /// Deletes the stored manifest and then the record.
    ///
    /// Any failure leaves the record in place so the caller can retry.
    #[instrument(skip_all, fields(instance_id = %request.instance_id))]
    pub async fn deprovision(&self, request: DeprovisionRequest) -> Result<Acknowledgement> {
        let _guard = self.locks.acquire(&request.instance_id).await;

        let Some(record) = self.store.get(&request.instance_id).await? else {
            return Err(BrokerError::InstanceGone(request.instance_id));
        };
        let extension = self.extensions.get(&record.service_name)?;

        extension
            .before_delete(&record)
            .await
            .map_err(|e| BrokerError::hook("before_delete", e))?;
        self.reconciler.delete(&record.manifest).await?;
        extension
            .after_delete(&record)
            .await
            .map_err(|e| BrokerError::hook("after_delete", e))?;

        if !self.store.delete(&record.instance_id).await? {
            warn!("Instance record vanished during deprovision");
        }

        info!(namespace = %record.namespace, "Deprovisioned instance");
        Ok(self.acknowledge(Operation::Deprovision, &record.instance_id, None))
    }

    /// Pod readiness first; the extension only judges instances whose pods are ready.
    ///
    /// Readiness is read from existing pods only. Until the workload
    /// controller creates them, an instance with no pods passes straight to
    /// the extension's check, which is the place to hold it in `Processing`.
    #[instrument(skip_all, fields(instance_id = %request.instance_id))]
    pub async fn last_operation(
        &self,
        request: LastOperationRequest,
    ) -> Result<LastOperationResponse> {
        let _guard = self.locks.acquire(&request.instance_id).await;

        let Some(record) = self.store.get(&request.instance_id).await? else {
            return Err(BrokerError::InstanceGone(request.instance_id));
        };
        if let Some(operation) = &request.operation {
            debug!(%operation, "Polling operation");
        }

        let response = match self
            .reconciler
            .check_readiness(&record.instance_id, &record.namespace)
            .await?
        {
            Readiness::Failed => LastOperationResponse {
                state: OperationState::Failed,
                description: Some("instance pods failed to start".to_string()),
            },
            Readiness::Creating => LastOperationResponse {
                state: OperationState::Processing,
                description: Some("instance pods are being created".to_string()),
            },
            Readiness::Ready => {
                let extension = self.extensions.get(&record.service_name)?;
                let state = extension
                    .last_state_check(&record)
                    .await
                    .map_err(|e| BrokerError::hook("last_state_check", e))?;
                LastOperationResponse {
                    state,
                    description: None,
                }
            }
        };

        debug!(state = %response.state, "Evaluated last operation");
        Ok(response)
    }

    /// Always synchronous.
    #[instrument(skip_all, fields(instance_id = %request.instance_id, binding_id = %request.binding_id))]
    pub async fn bind(&self, request: BindRequest) -> Result<BindResponse> {
        let service_name = self.catalog.service_name(&request.service_id)?;
        let extension = self.extensions.get(service_name)?;
        let instance = self.store.get(&request.instance_id).await?;

        let credentials = extension
            .bind(&request, instance.as_ref())
            .await
            .map_err(|e| BrokerError::hook("bind", e))?;

        info!("Bound instance");
        Ok(BindResponse {
            is_async: false,
            operation: Operation::Bind.token(&request.instance_id),
            credentials,
        })
    }

    /// Always synchronous.
    #[instrument(skip_all, fields(instance_id = %request.instance_id, binding_id = %request.binding_id))]
    pub async fn unbind(&self, request: UnbindRequest) -> Result<Acknowledgement> {
        let service_name = self.catalog.service_name(&request.service_id)?;
        let extension = self.extensions.get(service_name)?;

        extension
            .unbind(&request)
            .await
            .map_err(|e| BrokerError::hook("unbind", e))?;

        info!("Unbound instance");
        Ok(Acknowledgement {
            is_async: false,
            operation: Operation::Unbind.token(&request.instance_id),
            dashboard_url: None,
        })
    }
}
