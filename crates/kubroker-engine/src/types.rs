//! Requests and responses of the broker operations.

use std::fmt;

use kubroker_core::Parameters;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Credentials returned by a bind.
pub type Credentials = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvisionRequest {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub organization_guid: String,
    pub space_guid: String,
    pub parameters: Parameters,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateRequest {
    pub instance_id: String,
    pub service_id: String,
    /// Falls back to the stored plan when absent.
    pub plan_id: Option<String>,
    /// Overlaid on the stored parameters.
    pub parameters: Parameters,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeprovisionRequest {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastOperationRequest {
    pub instance_id: String,
    pub operation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindRequest {
    pub instance_id: String,
    pub binding_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub parameters: Parameters,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnbindRequest {
    pub instance_id: String,
    pub binding_id: String,
    pub service_id: String,
    pub plan_id: String,
}

/// Operation an opaque operation token refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Provision,
    Update,
    Deprovision,
    Bind,
    Unbind,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Update => "update",
            Self::Deprovision => "deprovision",
            Self::Bind => "bind",
            Self::Unbind => "unbind",
        }
    }

    /// Opaque token handed back to the caller: `<operation>:<instance id>`.
    pub fn token(&self, instance_id: &str) -> String {
        format!("{}:{instance_id}", self.as_str())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immediate answer to a mutating operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledgement {
    pub is_async: bool,
    pub operation: String,
    pub dashboard_url: Option<String>,
}

/// State reported by a status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    Processing,
    Succeeded,
    Failed,
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LastOperationResponse {
    pub state: OperationState,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindResponse {
    pub is_async: bool,
    pub operation: String,
    pub credentials: Credentials,
}
