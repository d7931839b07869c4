use kubroker_core::{Parameters, ServiceOffering};
use kubroker_engine::{
    Acknowledgement, BindRequest, BindResponse, Credentials, DeprovisionRequest,
    LastOperationRequest, LastOperationResponse, OperationState, ProvisionRequest, UnbindRequest,
    UpdateRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const API_VERSION_HEADER: &str = "X-Broker-API-Version";
/// Oldest protocol revision served: 2.11.
pub const MIN_API_VERSION: (u32, u32) = (2, 11);

/// Parses `major.minor` and checks it against [`MIN_API_VERSION`].
pub fn is_supported_api_version(value: &str) -> bool {
    let Some((major, minor)) = value.trim().split_once('.') else {
        return false;
    };
    match (major.parse::<u32>(), minor.parse::<u32>()) {
        (Ok(major), Ok(minor)) => major == MIN_API_VERSION.0 && minor >= MIN_API_VERSION.1,
        _ => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub services: Vec<ServiceOffering>,
}

/// `accepts_incomplete` query flag.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AsyncQuery {
    #[serde(default)]
    pub accepts_incomplete: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionBody {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub organization_guid: String,
    #[serde(default)]
    pub space_guid: String,
    #[serde(default)]
    pub parameters: Option<Parameters>,
    #[serde(default)]
    pub context: Option<Value>,
}

impl ProvisionBody {
    pub fn into_request(self, instance_id: String) -> ProvisionRequest {
        ProvisionRequest {
            instance_id,
            service_id: self.service_id,
            plan_id: self.plan_id,
            organization_guid: self.organization_guid,
            space_guid: self.space_guid,
            parameters: self.parameters.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateBody {
    pub service_id: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub parameters: Option<Parameters>,
    #[serde(default)]
    pub previous_values: Option<Value>,
}

impl UpdateBody {
    pub fn into_request(self, instance_id: String) -> UpdateRequest {
        UpdateRequest {
            instance_id,
            service_id: self.service_id,
            plan_id: self.plan_id,
            parameters: self.parameters.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeprovisionQuery {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub accepts_incomplete: bool,
}

impl DeprovisionQuery {
    pub fn into_request(self, instance_id: String) -> DeprovisionRequest {
        DeprovisionRequest {
            instance_id,
            service_id: self.service_id,
            plan_id: self.plan_id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LastOperationQuery {
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
}

impl LastOperationQuery {
    pub fn into_request(self, instance_id: String) -> LastOperationRequest {
        LastOperationRequest {
            instance_id,
            operation: self.operation,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BindBody {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub app_guid: Option<String>,
    #[serde(default)]
    pub bind_resource: Option<Value>,
    #[serde(default)]
    pub parameters: Option<Parameters>,
}

impl BindBody {
    pub fn into_request(self, instance_id: String, binding_id: String) -> BindRequest {
        BindRequest {
            instance_id,
            binding_id,
            service_id: self.service_id,
            plan_id: self.plan_id,
            parameters: self.parameters.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnbindQuery {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
}

impl UnbindQuery {
    pub fn into_request(self, instance_id: String, binding_id: String) -> UnbindRequest {
        UnbindRequest {
            instance_id,
            binding_id,
            service_id: self.service_id,
            plan_id: self.plan_id,
        }
    }
}

/// Body of provision, update and deprovision responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl From<Acknowledgement> for OperationResponse {
    fn from(ack: Acknowledgement) -> Self {
        Self {
            dashboard_url: ack.dashboard_url,
            operation: ack.is_async.then_some(ack.operation),
        }
    }
}

/// Last-operation state as spelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireState {
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl From<OperationState> for WireState {
    fn from(state: OperationState) -> Self {
        match state {
            OperationState::Processing => Self::InProgress,
            OperationState::Succeeded => Self::Succeeded,
            OperationState::Failed => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastOperationBody {
    pub state: WireState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<LastOperationResponse> for LastOperationBody {
    fn from(resp: LastOperationResponse) -> Self {
        Self {
            state: resp.state.into(),
            description: resp.description,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingBody {
    #[serde(default, skip_serializing_if = "Credentials::is_empty")]
    pub credentials: Credentials,
}

impl From<BindResponse> for BindingBody {
    fn from(resp: BindResponse) -> Self {
        Self {
            credentials: resp.credentials,
        }
    }
}

/// `{}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyBody {}
