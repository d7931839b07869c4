//! Broker operations against the in-memory store and cluster.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kubroker_cluster::{
    ClusterCall, ContainerStatus, InMemoryCluster, Pod, Reconciler, ServiceMap,
};
use kubroker_core::{Catalog, InstanceRecord, Parameters};
use kubroker_db_memory::InMemoryInstanceStore;
use kubroker_engine::{
    BindRequest, Broker, DeprovisionRequest, ErrorKind, ExtensionError, ExtensionRegistry,
    HookResult, LastOperationRequest, OperationState, ProvisionRequest, ServiceExtension,
    UnbindRequest, UpdateRequest, ZookeeperExtension,
};
use kubroker_storage::InstanceStore;
use serde_json::{Value, json};

const LABEL: &str = "kubroker.io/instance";

const TEMPLATE: &str = r#"apiVersion: v1
kind: Service
metadata:
  name: {{InstanceName}}-client
  namespace: {{Namespace}}
  labels:
    kubroker.io/instance: "{{Id}}"
spec:
  ports:
    - port: 2181
---
apiVersion: apps/v1
kind: StatefulSet
metadata:
  name: {{InstanceName}}
  namespace: {{Namespace}}
spec:
  replicas: 1
  template:
    metadata:
      labels:
        kubroker.io/instance: "{{Id}}"
    spec:
      containers:
        - name: zookeeper
          image: zookeeper:3.9
  volumeClaimTemplates:
    - metadata:
        name: data
      spec:
        accessModes: ["ReadWriteOnce"]
---
apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: {{InstanceName}}
  namespace: {{Namespace}}
"#;

fn offering() -> Value {
    json!({
        "id": "s1",
        "name": "zookeeper",
        "description": "Apache ZooKeeper",
        "bindable": true,
        "plan_updateable": true,
        "plans": [
            {
                "id": "p1",
                "name": "p-1-1Gi-10Gi",
                "free": true,
                "metadata": {"need_quota": true, "bullets": ["1", "1Gi", "10Gi"]}
            },
            {
                "id": "p2",
                "name": "p-2-4Gi-20Gi",
                "free": true,
                "metadata": {"need_quota": true, "bullets": ["2", "4Gi", "20Gi"]}
            }
        ]
    })
}

fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::builder()
            .offering_json(&offering().to_string())
            .unwrap()
            .template("zookeeper", TEMPLATE)
            .build()
            .unwrap(),
    )
}

struct Harness {
    broker: Broker,
    store: Arc<InMemoryInstanceStore>,
    cluster: Arc<InMemoryCluster>,
}

fn harness_with(registry: ExtensionRegistry) -> Harness {
    let store = Arc::new(InMemoryInstanceStore::new());
    let cluster = Arc::new(InMemoryCluster::new());
    let broker = Broker::new(
        catalog(),
        Arc::new(registry),
        store.clone(),
        Reconciler::new(cluster.clone(), LABEL),
    );
    Harness {
        broker,
        store,
        cluster,
    }
}

fn harness() -> Harness {
    harness_with(ExtensionRegistry::new().with(ZookeeperExtension::new()))
}

fn params(v: Value) -> Parameters {
    v.as_object().cloned().unwrap()
}

fn provision_request(id: &str) -> ProvisionRequest {
    ProvisionRequest {
        instance_id: id.into(),
        service_id: "s1".into(),
        plan_id: "p1".into(),
        organization_guid: "org".into(),
        space_guid: "space".into(),
        parameters: params(json!({"NAMESPACE": "ns1", "INSTANCE_NAME": "app1"})),
    }
}

fn deprovision_request(id: &str) -> DeprovisionRequest {
    DeprovisionRequest {
        instance_id: id.into(),
        service_id: "s1".into(),
        plan_id: "p1".into(),
    }
}

fn poll(id: &str) -> LastOperationRequest {
    LastOperationRequest {
        instance_id: id.into(),
        operation: Some(format!("provision:{id}")),
    }
}

fn labelled_pod(name: &str, instance_id: &str, containers: Vec<ContainerStatus>) -> Pod {
    let mut pod = Pod::new(name, containers);
    pod.metadata.labels.insert(LABEL.into(), instance_id.into());
    pod
}

async fn stored(h: &Harness, id: &str) -> Option<InstanceRecord> {
    h.store.get(id).await.unwrap()
}

#[tokio::test]
async fn test_provision_end_to_end() {
    let h = harness();

    let ack = h.broker.provision(provision_request("i1")).await.unwrap();
    assert!(ack.is_async);
    assert_eq!(ack.operation, "provision:i1");
    assert_eq!(ack.dashboard_url, None);

    let calls = h.cluster.calls();
    let first_create = calls
        .iter()
        .find_map(|c| match c {
            ClusterCall::Create { kind, .. } => Some(kind.as_str()),
            _ => None,
        })
        .unwrap();
    assert_eq!(first_create, "Service");

    let service = h.cluster.object("v1", "Service", "ns1", "app1-client").unwrap();
    assert_eq!(service["metadata"]["labels"][LABEL], json!("i1"));

    let sts = h
        .cluster
        .object("apps/v1", "StatefulSet", "ns1", "app1")
        .unwrap();
    let container = &sts["spec"]["template"]["spec"]["containers"][0];
    assert_eq!(container["resources"]["limits"]["cpu"], json!("1"));
    assert_eq!(container["resources"]["limits"]["memory"], json!("1Gi"));
    assert_eq!(
        container["env"],
        json!([{"name": "ZK_CLIENT_SERVICE", "value": "app1-client.ns1.svc"}])
    );
    assert!(
        h.cluster
            .object("networking.k8s.io/v1", "Ingress", "ns1", "app1")
            .is_none()
    );

    let record = stored(&h, "i1").await.unwrap();
    assert_eq!(record.service_id, "s1");
    assert_eq!(record.service_name, "zookeeper");
    assert_eq!(record.plan_id, "p1");
    assert_eq!(record.namespace, "ns1");
    assert_eq!(record.instance_name, "app1");
    assert_eq!(record.organization_guid, "org");
    assert_eq!(
        record.parsed_parameters(),
        params(json!({"NAMESPACE": "ns1", "INSTANCE_NAME": "app1"}))
    );
    assert!(record.manifest.contains("ZK_CLIENT_SERVICE"));
    assert!(record.manifest.contains("app1-client"));
}

#[tokio::test]
async fn test_provision_twice_conflicts() {
    let h = harness();
    h.broker.provision(provision_request("i1")).await.unwrap();
    let before = stored(&h, "i1").await.unwrap();

    let err = h.broker.provision(provision_request("i1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(stored(&h, "i1").await.unwrap(), before);
}

#[tokio::test]
async fn test_provision_resolution_errors() {
    let h = harness();

    let mut unknown_plan = provision_request("i1");
    unknown_plan.plan_id = "p9".into();
    let mut unknown_service = provision_request("i1");
    unknown_service.service_id = "s9".into();
    let mut no_namespace = provision_request("i1");
    no_namespace.parameters.remove("NAMESPACE");
    let mut empty_name = provision_request("i1");
    empty_name
        .parameters
        .insert("INSTANCE_NAME".into(), json!(""));

    for request in [unknown_plan, unknown_service, no_namespace, empty_name] {
        let err = h.broker.provision(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound, "{err}");
    }
    assert!(h.cluster.calls().is_empty());
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_unregistered_extension_is_not_found() {
    let h = harness_with(ExtensionRegistry::new());
    let err = h.broker.provision(provision_request("i1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_invalid_parameter_is_validation_failure() {
    let h = harness();
    let mut request = provision_request("i1");
    request.parameters.insert("REPLICAS".into(), json!("many"));

    let err = h.broker.provision(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    assert!(h.cluster.calls().is_empty());
}

#[tokio::test]
async fn test_failed_provision_persists_nothing() {
    let h = harness();
    h.cluster.fail_kind("StatefulSet");

    let err = h.broker.provision(provision_request("i1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ClusterFailure);
    assert!(stored(&h, "i1").await.is_none());
    // No rollback: the Service applied in the first pass stays.
    assert!(h.cluster.object("v1", "Service", "ns1", "app1-client").is_some());
}

#[tokio::test]
async fn test_deprovision_unknown_is_gone() {
    let h = harness();
    let err = h
        .broker
        .deprovision(deprovision_request("nope"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Gone);
}

#[tokio::test]
async fn test_deprovision_deletes_stored_manifest() {
    let h = harness();
    h.broker.provision(provision_request("i1")).await.unwrap();
    h.cluster.clear_calls();

    let ack = h.broker.deprovision(deprovision_request("i1")).await.unwrap();
    assert_eq!(ack.operation, "deprovision:i1");
    assert!(stored(&h, "i1").await.is_none());
    assert_eq!(h.cluster.object_count(), 0);

    let deleted: Vec<(String, String)> = h
        .cluster
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            ClusterCall::Delete { kind, name, .. } => Some((kind, name)),
            _ => None,
        })
        .collect();
    assert_eq!(
        deleted,
        [
            ("Service".to_string(), "app1-client".to_string()),
            ("StatefulSet".to_string(), "app1".to_string()),
            ("Ingress".to_string(), "app1".to_string()),
        ]
    );

    let err = h
        .broker
        .deprovision(deprovision_request("i1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Gone);
}

#[tokio::test]
async fn test_deprovision_cluster_failure_keeps_record() {
    let h = harness();
    h.broker.provision(provision_request("i1")).await.unwrap();
    h.cluster.fail_kind("StatefulSet");

    let err = h
        .broker
        .deprovision(deprovision_request("i1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ClusterFailure);
    assert!(stored(&h, "i1").await.is_some());
    // The Service went first and stays deleted; the rest is left for a retry.
    assert!(h.cluster.object("v1", "Service", "ns1", "app1-client").is_none());
    assert!(h.cluster.object("apps/v1", "StatefulSet", "ns1", "app1").is_some());
}

/// Update a provisioned `i1` and return the error along with the record before and after.
async fn failed_update(
    h: &Harness,
    request: UpdateRequest,
) -> (ErrorKind, InstanceRecord, InstanceRecord) {
    let before = stored(h, "i1").await.unwrap();
    let err = h.broker.update(request).await.unwrap_err();
    let after = stored(h, "i1").await.unwrap();
    (err.kind(), before, after)
}

fn assert_record_unchanged(before: &InstanceRecord, after: &InstanceRecord) {
    assert_eq!(after.plan_id, before.plan_id);
    assert_eq!(after.parameters, before.parameters);
    assert_eq!(after.manifest, before.manifest);
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn test_update_cluster_failure_keeps_stored_record() {
    let h = harness();
    h.broker.provision(provision_request("i1")).await.unwrap();
    h.cluster.fail_kind("StatefulSet");

    let (kind, before, after) = failed_update(
        &h,
        UpdateRequest {
            instance_id: "i1".into(),
            service_id: "s1".into(),
            plan_id: Some("p2".into()),
            parameters: params(json!({"REPLICAS": 3})),
        },
    )
    .await;
    assert_eq!(kind, ErrorKind::ClusterFailure);
    assert_eq!(after.plan_id, "p1");
    assert_record_unchanged(&before, &after);
}

#[tokio::test]
async fn test_update_rejected_parameters_keep_stored_record() {
    let h = harness();
    h.broker.provision(provision_request("i1")).await.unwrap();
    h.cluster.clear_calls();

    let (kind, before, after) = failed_update(
        &h,
        UpdateRequest {
            instance_id: "i1".into(),
            service_id: "s1".into(),
            plan_id: Some("p2".into()),
            parameters: params(json!({"REPLICAS": "many"})),
        },
    )
    .await;
    assert_eq!(kind, ErrorKind::ValidationFailure);
    assert_record_unchanged(&before, &after);
    assert!(h.cluster.calls().is_empty());
}

#[tokio::test]
async fn test_update_reapplies_with_resource_versions() {
    let h = harness();
    h.broker.provision(provision_request("i1")).await.unwrap();
    h.cluster.clear_calls();

    let ack = h
        .broker
        .update(UpdateRequest {
            instance_id: "i1".into(),
            service_id: "s1".into(),
            plan_id: Some("p2".into()),
            parameters: params(json!({"REPLICAS": 3})),
        })
        .await
        .unwrap();
    assert_eq!(ack.operation, "update:i1");

    let calls = h.cluster.calls();
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::Create { .. })));
    let updated: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            ClusterCall::Update {
                kind,
                resource_version,
                ..
            } => Some((kind.as_str(), resource_version.is_some())),
            _ => None,
        })
        .collect();
    assert_eq!(updated, [("Service", true), ("StatefulSet", true)]);

    let sts = h
        .cluster
        .object("apps/v1", "StatefulSet", "ns1", "app1")
        .unwrap();
    assert_eq!(sts["spec"]["replicas"], json!(3));
    assert_eq!(
        sts["spec"]["template"]["spec"]["containers"][0]["resources"]["requests"]["memory"],
        json!("4Gi")
    );

    let record = stored(&h, "i1").await.unwrap();
    assert_eq!(record.plan_id, "p2");
    assert_eq!(
        record.parsed_parameters(),
        params(json!({"NAMESPACE": "ns1", "INSTANCE_NAME": "app1", "REPLICAS": 3}))
    );
    assert!(record.updated_at >= record.created_at);
}

#[tokio::test]
async fn test_update_without_plan_keeps_stored_plan() {
    let h = harness();
    h.broker.provision(provision_request("i1")).await.unwrap();

    h.broker
        .update(UpdateRequest {
            instance_id: "i1".into(),
            service_id: "s1".into(),
            plan_id: None,
            parameters: Parameters::new(),
        })
        .await
        .unwrap();
    assert_eq!(stored(&h, "i1").await.unwrap().plan_id, "p1");
}

#[tokio::test]
async fn test_update_unknown_is_gone() {
    let h = harness();
    let err = h
        .broker
        .update(UpdateRequest {
            instance_id: "i1".into(),
            service_id: "s1".into(),
            plan_id: None,
            parameters: Parameters::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Gone);
}

#[tokio::test]
async fn test_last_operation_states() {
    let h = harness();

    let err = h.broker.last_operation(poll("i1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Gone);

    h.broker.provision(provision_request("i1")).await.unwrap();
    let status = h.broker.last_operation(poll("i1")).await.unwrap();
    assert_eq!(status.state, OperationState::Succeeded);

    h.cluster.add_pods(
        "ns1",
        [labelled_pod(
            "app1-0",
            "i1",
            vec![
                ContainerStatus::ready("a"),
                ContainerStatus::ready("b"),
                ContainerStatus::waiting("c", "ContainerCreating"),
            ],
        )],
    );
    let status = h.broker.last_operation(poll("i1")).await.unwrap();
    assert_eq!(status.state, OperationState::Processing);

    h.cluster.add_pods(
        "ns1",
        [labelled_pod(
            "app1-1",
            "i1",
            vec![ContainerStatus::waiting("a", "CrashLoopBackOff")],
        )],
    );
    let status = h.broker.last_operation(poll("i1")).await.unwrap();
    assert_eq!(status.state, OperationState::Failed);

    // Pods of other instances are ignored.
    h.cluster.clear_pods("ns1");
    h.cluster.add_pods(
        "ns1",
        [labelled_pod(
            "other-0",
            "i2",
            vec![ContainerStatus::waiting("a", "ImagePullBackOff")],
        )],
    );
    let status = h.broker.last_operation(poll("i1")).await.unwrap();
    assert_eq!(status.state, OperationState::Succeeded);
}

#[tokio::test]
async fn test_bind_and_unbind_are_synchronous() {
    let h = harness();
    h.broker.provision(provision_request("i1")).await.unwrap();

    let bound = h
        .broker
        .bind(BindRequest {
            instance_id: "i1".into(),
            binding_id: "b1".into(),
            service_id: "s1".into(),
            plan_id: "p1".into(),
            parameters: Parameters::new(),
        })
        .await
        .unwrap();
    assert!(!bound.is_async);
    assert_eq!(bound.credentials["zk_connect"], json!("app1-client.ns1.svc:2181"));

    let unbound = h
        .broker
        .unbind(UnbindRequest {
            instance_id: "i1".into(),
            binding_id: "b1".into(),
            service_id: "s1".into(),
            plan_id: "p1".into(),
        })
        .await
        .unwrap();
    assert!(!unbound.is_async);
    assert_eq!(unbound.operation, "unbind:i1");

    let err = h
        .broker
        .bind(BindRequest {
            service_id: "s9".into(),
            ..BindRequest::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_sync_mode_acknowledgement() {
    let h = harness();
    let broker = h.broker.clone().with_async_mode(false);
    let ack = broker.provision(provision_request("i1")).await.unwrap();
    assert!(!ack.is_async);
}

/// Records what the broker hands to the hooks.
#[derive(Default)]
struct Recording {
    services: Mutex<Vec<ServiceMap>>,
    fail_before_delete: bool,
    fail_after_delete: bool,
    state: Option<OperationState>,
}

#[async_trait]
impl ServiceExtension for Recording {
    fn name(&self) -> &str {
        "zookeeper"
    }

    fn apply_special(&self, manifest: &str, services: &ServiceMap) -> HookResult<String> {
        self.services.lock().unwrap().push(services.clone());
        Ok(manifest.to_string())
    }

    fn dashboard_url(
        &self,
        params: &Parameters,
        services: &ServiceMap,
    ) -> HookResult<Option<String>> {
        let ns = params["NAMESPACE"].as_str().unwrap_or_default();
        Ok(services
            .get(ns)
            .map(|name| format!("http://{name}.{ns}.svc:8080")))
    }

    async fn before_delete(&self, _instance: &InstanceRecord) -> HookResult<()> {
        if self.fail_before_delete {
            return Err(ExtensionError::new("still in use"));
        }
        Ok(())
    }

    async fn after_delete(&self, _instance: &InstanceRecord) -> HookResult<()> {
        if self.fail_after_delete {
            return Err(ExtensionError::new("cleanup failed"));
        }
        Ok(())
    }

    async fn last_state_check(&self, _instance: &InstanceRecord) -> HookResult<OperationState> {
        Ok(self.state.unwrap_or(OperationState::Succeeded))
    }
}

#[tokio::test]
async fn test_post_deploy_receives_service_map() {
    let ext = Arc::new(Recording::default());
    let mut registry = ExtensionRegistry::new();
    registry.register(ext.clone());
    let h = harness_with(registry);

    let ack = h.broker.provision(provision_request("i1")).await.unwrap();
    assert_eq!(
        ack.dashboard_url.as_deref(),
        Some("http://app1-client.ns1.svc:8080")
    );
    assert_eq!(
        *ext.services.lock().unwrap(),
        [ServiceMap::from([("ns1".to_string(), "app1-client".to_string())])]
    );
}

#[tokio::test]
async fn test_hook_failure_keeps_record_for_retry() {
    let mut registry = ExtensionRegistry::new();
    registry.register(Arc::new(Recording {
        fail_before_delete: true,
        ..Recording::default()
    }));
    let h = harness_with(registry);
    h.broker.provision(provision_request("i1")).await.unwrap();
    h.cluster.clear_calls();

    let err = h
        .broker
        .deprovision(deprovision_request("i1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(stored(&h, "i1").await.is_some());
    assert!(h.cluster.calls().is_empty());
}

#[tokio::test]
async fn test_after_delete_failure_keeps_record_for_retry() {
    let mut registry = ExtensionRegistry::new();
    registry.register(Arc::new(Recording {
        fail_after_delete: true,
        ..Recording::default()
    }));
    let h = harness_with(registry);
    h.broker.provision(provision_request("i1")).await.unwrap();

    let err = h
        .broker
        .deprovision(deprovision_request("i1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(err.to_string().contains("after_delete"));
    assert!(stored(&h, "i1").await.is_some());
    assert_eq!(h.cluster.object_count(), 0);

    // Resources are already gone, so a retry only has to finish the cleanup.
    let err = h
        .broker
        .deprovision(deprovision_request("i1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn test_pod_failure_overrides_service_judgement() {
    let mut registry = ExtensionRegistry::new();
    registry.register(Arc::new(Recording {
        state: Some(OperationState::Processing),
        ..Recording::default()
    }));
    let h = harness_with(registry);
    h.broker.provision(provision_request("i1")).await.unwrap();

    let status = h.broker.last_operation(poll("i1")).await.unwrap();
    assert_eq!(status.state, OperationState::Processing);

    h.cluster.add_pods(
        "ns1",
        [labelled_pod(
            "app1-0",
            "i1",
            vec![ContainerStatus::waiting("a", "ErrImagePull")],
        )],
    );
    let status = h.broker.last_operation(poll("i1")).await.unwrap();
    assert_eq!(status.state, OperationState::Failed);
}

#[tokio::test]
async fn test_concurrent_provisions_of_one_id() {
    let h = harness();
    let (a, b) = tokio::join!(
        h.broker.provision(provision_request("i1")),
        h.broker.provision(provision_request("i1")),
    );
    let kinds: Vec<_> = [a, b]
        .into_iter()
        .map(|r| r.err().map(|e| e.kind()))
        .collect();
    assert!(kinds.contains(&None));
    assert!(kinds.contains(&Some(ErrorKind::Conflict)));
}
