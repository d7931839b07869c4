use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::quota::Quota;
use crate::error::Result;

/// Plan metadata key holding the quota tuple.
pub const BULLETS_KEY: &str = "bullets";
/// Plan metadata flag marking plans that carry a quota.
pub const NEED_QUOTA_KEY: &str = "need_quota";

/// A provisionable service as advertised in the broker catalog.
///
/// Field names follow the Open Service Broker catalog schema so that the
/// pre-generated descriptors can be served back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub bindable: bool,
    #[serde(default)]
    pub bindings_retrievable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_updateable: Option<bool>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub plans: Vec<Plan>,
}

impl ServiceOffering {
    pub fn plan(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == plan_id)
    }
}

/// A purchasable tier of an offering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindable: Option<bool>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemas: Option<Schemas>,
}

impl Plan {
    /// Returns the quota tuple stored in the plan metadata.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::InvalidQuota` when the metadata carries no
    /// `bullets` list or the list is not a 3- or 4-tuple of strings.
    pub fn quota(&self) -> Result<Quota> {
        let bullets = self
            .metadata
            .get(BULLETS_KEY)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                crate::CatalogError::invalid_quota(format!("plan {} has no bullets", self.name))
            })?;

        let items = bullets
            .iter()
            .map(|b| {
                b.as_str().map(str::to_string).ok_or_else(|| {
                    crate::CatalogError::invalid_quota(format!(
                        "plan {} has a non-string bullet",
                        self.name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Quota::from_bullets(&items)
    }

    pub fn has_quota(&self) -> bool {
        self.metadata.contains_key(BULLETS_KEY)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Schemas {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_instance: Option<ServiceInstanceSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_binding: Option<ServiceBindingSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceInstanceSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<InputParametersSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<InputParametersSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceBindingSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<InputParametersSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InputParametersSchema {
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub parameters: Value,
}
