//! Offering descriptor generation.
//!
//! Expands an [`OfferingConfig`] into a [`ServiceOffering`] with one plan per
//! element of the cartesian product of its quota lists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::model::{
    BULLETS_KEY, InputParametersSchema, NEED_QUOTA_KEY, Plan, Schemas, ServiceBindingSchema,
    ServiceInstanceSchema, ServiceOffering,
};
use super::quota::Quota;
use crate::error::{CatalogError, Result};

/// Source description of an offering, as written by an operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferingConfig {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub plan_updateable: bool,
    pub bindable: bool,
    pub bindings_retrievable: bool,
    pub metadata: Map<String, Value>,
    pub cpu_quota: Vec<String>,
    pub memory_quota: Vec<String>,
    pub disk_quota: Vec<String>,
    pub gpu_quota: Vec<String>,
    pub properties: BTreeMap<String, ParameterProperty>,
}

/// One accepted request parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterProperty {
    pub description: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub default: Value,
    pub required: bool,
}

/// A fresh opaque identifier: 32 lowercase hex digits.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn parameter_schema(properties: &BTreeMap<String, ParameterProperty>) -> InputParametersSchema {
    let parameters = properties
        .iter()
        .map(|(name, prop)| {
            let value = serde_json::to_value(prop).unwrap_or_else(|_| json!({}));
            (name.clone(), value)
        })
        .collect::<Map<_, _>>();
    InputParametersSchema {
        parameters: Value::Object(parameters),
    }
}

fn quota_tuples(config: &OfferingConfig) -> Result<Vec<Quota>> {
    for (axis, values) in [
        ("cpu", &config.cpu_quota),
        ("memory", &config.memory_quota),
        ("disk", &config.disk_quota),
    ] {
        if values.is_empty() {
            return Err(CatalogError::invalid_quota(format!(
                "offering {} has no {axis} quota values",
                config.name
            )));
        }
    }

    let mut tuples = Vec::new();
    for cpu in &config.cpu_quota {
        for memory in &config.memory_quota {
            for disk in &config.disk_quota {
                let base = Quota::new(cpu, memory, disk);
                if config.gpu_quota.is_empty() {
                    tuples.push(base);
                } else {
                    tuples.extend(config.gpu_quota.iter().map(|gpu| base.clone().with_gpu(gpu)));
                }
            }
        }
    }
    Ok(tuples)
}

/// Generates the offering descriptor for `config` with fresh service and plan IDs.
///
/// # Errors
///
/// Fails when a required quota axis is empty or two tuples collapse onto the
/// same plan name.
pub fn generate_offering(config: &OfferingConfig) -> Result<ServiceOffering> {
    let schema = parameter_schema(&config.properties);
    let schemas = Schemas {
        service_instance: Some(ServiceInstanceSchema {
            create: Some(schema.clone()),
            update: Some(schema.clone()),
        }),
        service_binding: Some(ServiceBindingSchema {
            create: Some(schema),
        }),
    };

    let mut plans: Vec<Plan> = Vec::new();
    for quota in quota_tuples(config)? {
        let name = quota.plan_name();
        if plans.iter().any(|p| p.name == name) {
            return Err(CatalogError::DuplicatePlanName {
                service: config.name.clone(),
                plan: name,
            });
        }

        let mut metadata = Map::new();
        metadata.insert(NEED_QUOTA_KEY.into(), Value::Bool(true));
        metadata.insert(BULLETS_KEY.into(), json!(quota.bullets()));

        plans.push(Plan {
            id: generate_id(),
            description: format!("{} plan with {quota}", config.name),
            name,
            free: Some(true),
            bindable: Some(true),
            metadata,
            schemas: Some(schemas.clone()),
        });
    }

    Ok(ServiceOffering {
        id: generate_id(),
        name: config.name.clone(),
        description: config.description.clone(),
        tags: config.tags.clone(),
        bindable: config.bindable,
        bindings_retrievable: config.bindings_retrievable,
        plan_updateable: Some(config.plan_updateable),
        metadata: config.metadata.clone(),
        plans,
    })
}
