//! ZooKeeper ensemble extension.
//!
//! - `REPLICAS` sets the StatefulSet replica count.
//! - The plan quota becomes container resource limits and requests, and the
//!   disk size of every volume claim.
//! - Once the client Service exists its DNS name is exported to the
//!   workload containers as `ZK_CLIENT_SERVICE`.
//! - Bind hands out the client connect string.

use async_trait::async_trait;
use kubroker_cluster::manifest::decode_values;
use kubroker_cluster::{DEFAULT_NAMESPACE, ServiceMap};
use kubroker_core::{InstanceRecord, Parameters, Plan, Quota};
use serde_json::{Value, json};

use crate::editing::{edit_manifest, is_workload, kind_of, namespace_of, object_at, pod_containers};
use crate::extension::{ExtensionError, HookResult, ServiceExtension};
use crate::types::{BindRequest, Credentials};

pub const REPLICAS_PARAM: &str = "REPLICAS";
pub const CLIENT_SERVICE_ENV: &str = "ZK_CLIENT_SERVICE";
pub const CLIENT_PORT: u16 = 2181;
const GPU_RESOURCE: &str = "nvidia.com/gpu";

#[derive(Debug, Clone, Default)]
pub struct ZookeeperExtension;

impl ZookeeperExtension {
    pub fn new() -> Self {
        Self
    }
}

fn replicas(value: &Value) -> HookResult<u64> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .filter(|n| *n >= 1)
        .ok_or_else(|| ExtensionError::new(format!("{REPLICAS_PARAM} must be a positive integer, got {value}")))
}

fn service_host(name: &str, namespace: &str) -> String {
    format!("{name}.{namespace}.svc")
}

fn apply_quota(doc: &mut Value, quota: &Quota) -> HookResult<()> {
    if is_workload(doc) {
        for container in pod_containers(doc) {
            let resources = container
                .entry("resources")
                .or_insert_with(|| json!({}));
            for section in ["limits", "requests"] {
                let target = object_at(resources, &[section])?;
                target.insert("cpu".into(), json!(quota.cpu));
                target.insert("memory".into(), json!(quota.memory));
                if let Some(gpu) = &quota.gpu {
                    target.insert(GPU_RESOURCE.into(), json!(gpu));
                }
            }
        }
    }

    match kind_of(doc) {
        "StatefulSet" => {
            let claims = doc
                .pointer_mut("/spec/volumeClaimTemplates")
                .and_then(Value::as_array_mut);
            for claim in claims.into_iter().flatten() {
                object_at(claim, &["spec", "resources", "requests"])?
                    .insert("storage".into(), json!(quota.disk));
            }
        }
        "PersistentVolumeClaim" => {
            object_at(doc, &["spec", "resources", "requests"])?
                .insert("storage".into(), json!(quota.disk));
        }
        _ => {}
    }
    Ok(())
}

fn set_env(container: &mut serde_json::Map<String, Value>, name: &str, value: &str) {
    let entry = json!({"name": name, "value": value});
    let env = container
        .entry("env")
        .or_insert_with(|| Value::Array(Vec::new()));
    let Some(env) = env.as_array_mut() else {
        *env = Value::Array(vec![entry]);
        return;
    };
    match env
        .iter_mut()
        .find(|e| e.get("name").and_then(Value::as_str) == Some(name))
    {
        Some(existing) => *existing = entry,
        None => env.push(entry),
    }
}

impl ZookeeperExtension {
    /// Client Service declared by the stored manifest.
    fn client_service(record: &InstanceRecord) -> HookResult<(String, String)> {
        let docs = decode_values(&record.manifest).map_err(|e| ExtensionError::new(e.to_string()))?;
        docs.iter()
            .find(|d| kind_of(d) == "Service")
            .and_then(|d| {
                let name = d.pointer("/metadata/name")?.as_str()?;
                let ns = namespace_of(d).unwrap_or(&record.namespace);
                Some((name.to_string(), ns.to_string()))
            })
            .ok_or_else(|| {
                ExtensionError::new(format!(
                    "instance {} has no client service",
                    record.instance_id
                ))
            })
    }
}

#[async_trait]
impl ServiceExtension for ZookeeperExtension {
    fn name(&self) -> &str {
        "zookeeper"
    }

    fn apply_parameters(&self, manifest: &str, params: &Parameters) -> HookResult<String> {
        let Some(value) = params.get(REPLICAS_PARAM).filter(|v| !v.is_null()) else {
            return Ok(manifest.to_string());
        };
        let count = replicas(value)?;
        edit_manifest(manifest, |doc| {
            if kind_of(doc) == "StatefulSet" {
                object_at(doc, &["spec"])?.insert("replicas".into(), json!(count));
            }
            Ok(())
        })
    }

    fn apply_plan(&self, manifest: &str, plan: &Plan) -> HookResult<String> {
        if !plan.has_quota() {
            return Ok(manifest.to_string());
        }
        let quota = plan
            .quota()
            .map_err(|e| ExtensionError::new(e.to_string()))?;
        edit_manifest(manifest, |doc| apply_quota(doc, &quota))
    }

    fn apply_special(&self, manifest: &str, services: &ServiceMap) -> HookResult<String> {
        if services.is_empty() {
            return Ok(manifest.to_string());
        }
        edit_manifest(manifest, |doc| {
            if !is_workload(doc) {
                return Ok(());
            }
            let ns = namespace_of(doc).unwrap_or(DEFAULT_NAMESPACE).to_string();
            let Some(service) = services.get(&ns) else {
                return Ok(());
            };
            let host = service_host(service, &ns);
            for container in pod_containers(doc) {
                set_env(container, CLIENT_SERVICE_ENV, &host);
            }
            Ok(())
        })
    }

    async fn bind(
        &self,
        _request: &BindRequest,
        instance: Option<&InstanceRecord>,
    ) -> HookResult<Credentials> {
        let record = instance.ok_or_else(|| ExtensionError::new("instance does not exist"))?;
        let (service, ns) = Self::client_service(record)?;

        let mut credentials = Credentials::new();
        credentials.insert(
            "zk_connect".into(),
            json!(format!("{}:{CLIENT_PORT}", service_host(&service, &ns))),
        );
        credentials.insert("namespace".into(), json!(record.namespace));
        credentials.insert("instance_name".into(), json!(record.instance_name));
        Ok(credentials)
    }
}
