//! Reconciler behaviour against the in-memory cluster.

use std::sync::Arc;

use kubroker_cluster::{
    ApplyMode, ClusterApi, ClusterCall, ClusterError, ContainerStatus, InMemoryCluster,
    KindFilter, Pod, Readiness, Reconciler, ResourceType,
};
use serde_json::json;

const LABEL: &str = "kubroker.io/instance";

const MANIFEST: &str = r#"
apiVersion: v1
kind: Service
metadata:
  name: app1-client
  namespace: ns1
---
apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: app1
  namespace: ns1
---
apiVersion: apps/v1
kind: StatefulSet
metadata:
  name: app1
  namespace: ns1
  resourceVersion: "42"
spec:
  replicas: 3
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: app1-config
"#;

fn setup() -> (Arc<InMemoryCluster>, Reconciler) {
    let cluster = Arc::new(InMemoryCluster::new());
    let reconciler = Reconciler::new(cluster.clone(), LABEL);
    (cluster, reconciler)
}

fn created_kinds(calls: &[ClusterCall]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|c| match c {
            ClusterCall::Create { kind, .. } => Some(kind.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_two_pass_provision_split() {
    let (cluster, reconciler) = setup();

    let services = reconciler
        .apply_filtered(MANIFEST, KindFilter::SERVICES, ApplyMode::Create)
        .await
        .unwrap();
    assert_eq!(services.get("ns1").map(String::as_str), Some("app1-client"));
    assert_eq!(created_kinds(&cluster.calls()), ["Service"]);

    cluster.clear_calls();
    let services = reconciler
        .apply_filtered(MANIFEST, KindFilter::PROVISION_REMAINDER, ApplyMode::Create)
        .await
        .unwrap();
    assert!(services.is_empty());
    assert_eq!(created_kinds(&cluster.calls()), ["StatefulSet", "ConfigMap"]);

    // stale resourceVersion cleared before create
    let sts = cluster.object("apps/v1", "StatefulSet", "ns1", "app1").unwrap();
    assert_eq!(sts["spec"]["replicas"], json!(3));
    assert_ne!(sts["metadata"]["resourceVersion"], json!("42"));

    // namespaced document without a namespace lands in default
    assert!(cluster.object("v1", "ConfigMap", "default", "app1-config").is_some());
    // ingress is never applied by the provision passes
    assert!(cluster.object("networking.k8s.io/v1", "Ingress", "ns1", "app1").is_none());
}

#[tokio::test]
async fn test_create_or_update_carries_existing_resource_version() {
    let (cluster, reconciler) = setup();
    let sts = ResourceType::new("apps/v1", "StatefulSet", "statefulsets", true);
    let existing = cluster
        .create(
            &sts,
            "ns1",
            &json!({"apiVersion": "apps/v1", "kind": "StatefulSet", "metadata": {"name": "app1"}}),
        )
        .await
        .unwrap();
    let existing_version = existing["metadata"]["resourceVersion"]
        .as_str()
        .unwrap()
        .to_string();
    cluster.clear_calls();

    reconciler
        .apply_filtered(MANIFEST, KindFilter::UPDATE_REMAINDER, ApplyMode::CreateOrUpdate)
        .await
        .unwrap();

    let calls = cluster.calls();
    assert!(calls.contains(&ClusterCall::Update {
        kind: "StatefulSet".into(),
        namespace: "ns1".into(),
        name: "app1".into(),
        resource_version: Some(existing_version),
    }));
    assert!(!calls.iter().any(|c| matches!(c, ClusterCall::Create { kind, .. } if kind == "StatefulSet")));
    // absent ConfigMap is created instead
    assert_eq!(created_kinds(&calls), ["ConfigMap"]);
}

#[tokio::test]
async fn test_update_pass_records_services() {
    let (_cluster, reconciler) = setup();
    let services = reconciler
        .apply_filtered(MANIFEST, KindFilter::SERVICES, ApplyMode::CreateOrUpdate)
        .await
        .unwrap();
    assert_eq!(services.get("ns1").map(String::as_str), Some("app1-client"));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (cluster, reconciler) = setup();
    reconciler
        .apply_filtered(MANIFEST, KindFilter::SERVICES, ApplyMode::Create)
        .await
        .unwrap();

    // only the Service exists; every other document is already absent
    reconciler.delete(MANIFEST).await.unwrap();
    assert_eq!(cluster.object_count(), 0);

    let deletes = cluster
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ClusterCall::Delete { .. }))
        .count();
    assert_eq!(deletes, 4);

    reconciler.delete(MANIFEST).await.unwrap();
}

#[tokio::test]
async fn test_failure_aborts_without_rollback() {
    let (cluster, reconciler) = setup();
    cluster.fail_kind("ConfigMap");

    let err = reconciler
        .apply_filtered(MANIFEST, KindFilter::All, ApplyMode::Create)
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::Api { status: 500, .. }));
    // earlier documents stay applied
    assert!(cluster.object("v1", "Service", "ns1", "app1-client").is_some());
    assert!(cluster.object("apps/v1", "StatefulSet", "ns1", "app1").is_some());
}

#[tokio::test]
async fn test_unknown_kind_and_bad_documents_abort() {
    let (_cluster, reconciler) = setup();
    let manifest = "apiVersion: example.com/v1\nkind: Widget\nmetadata:\n  name: w\n";
    let err = reconciler
        .apply_filtered(manifest, KindFilter::All, ApplyMode::Create)
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::Discovery { .. }));

    let manifest = "apiVersion: v1\nkind: Service\nmetadata: [broken\n";
    let err = reconciler.delete(manifest).await.unwrap_err();
    assert!(matches!(err, ClusterError::Decode(_)));
}

#[tokio::test]
async fn test_filtered_documents_skip_discovery() {
    let (cluster, reconciler) = setup();
    let manifest = "apiVersion: example.com/v1\nkind: Widget\nmetadata:\n  name: w\n";
    reconciler
        .apply_filtered(manifest, KindFilter::SERVICES, ApplyMode::Create)
        .await
        .unwrap();
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn test_check_readiness_uses_instance_label() {
    let (cluster, reconciler) = setup();
    let labelled = |name: &str, containers| {
        let mut pod = Pod::new(name, containers);
        pod.metadata.labels.insert(LABEL.into(), "i1".into());
        pod
    };

    assert_eq!(reconciler.check_readiness("i1", "ns1").await.unwrap(), Readiness::Ready);

    cluster.add_pods(
        "ns1",
        [
            labelled("app1-0", vec![ContainerStatus::ready("zk"), ContainerStatus::ready("exporter")]),
            labelled("app1-1", vec![ContainerStatus::waiting("zk", "ContainerCreating")]),
        ],
    );
    assert_eq!(
        reconciler.check_readiness("i1", "ns1").await.unwrap(),
        Readiness::Creating
    );

    cluster.add_pods("ns1", [labelled("app1-2", vec![ContainerStatus::waiting("zk", "ErrImagePull")])]);
    assert_eq!(
        reconciler.check_readiness("i1", "ns1").await.unwrap(),
        Readiness::Failed
    );

    assert!(cluster.calls().contains(&ClusterCall::ListPods {
        namespace: "ns1".into(),
        label_selector: "kubroker.io/instance=i1".into(),
    }));
}
