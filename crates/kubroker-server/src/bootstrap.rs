//! Builds the broker and its collaborators from configuration.

use std::sync::Arc;

use anyhow::Context;
use kubroker_cluster::{DynClusterApi, InMemoryCluster, Reconciler, RestClusterClient};
use kubroker_core::Catalog;
use kubroker_db_memory::InMemoryInstanceStore;
use kubroker_db_postgres::PostgresInstanceStore;
use kubroker_engine::{Broker, DefaultExtension, ExtensionRegistry, builtin_registry};
use kubroker_storage::DynInstanceStore;
use tracing::{info, warn};

use crate::config::{AppConfig, ClusterBackend, ClusterConfig, StorageBackend, StorageConfig};

pub async fn build_store(cfg: &StorageConfig) -> anyhow::Result<DynInstanceStore> {
    match cfg.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory instance store; instances are lost on restart");
            Ok(Arc::new(InMemoryInstanceStore::new()))
        }
        StorageBackend::Postgres => {
            let url = cfg.postgres.redacted_url();
            let store = PostgresInstanceStore::new(&cfg.postgres)
                .await
                .with_context(|| format!("failed to open instance store at {url}"))?;
            info!(url = %url, "PostgreSQL instance store ready");
            Ok(Arc::new(store))
        }
    }
}

pub fn build_cluster(cfg: &ClusterConfig) -> anyhow::Result<DynClusterApi> {
    match cfg.backend {
        ClusterBackend::Memory => {
            warn!("Using in-memory cluster; nothing is deployed");
            Ok(Arc::new(InMemoryCluster::new()))
        }
        ClusterBackend::Rest => {
            let client =
                RestClusterClient::from_kubeconfig_or_in_cluster(&cfg.kubeconfig, cfg.request_timeout())
                    .context("failed to configure cluster client")?;
            Ok(Arc::new(client))
        }
    }
}

/// Built-in extensions, plus a pass-through extension for every other catalog service.
pub fn build_registry(catalog: &Catalog) -> ExtensionRegistry {
    let mut registry = builtin_registry();
    for offering in catalog.services() {
        if !registry.contains(&offering.name) {
            info!(service = %offering.name, "No built-in extension; templates are used as rendered");
            registry.register(Arc::new(DefaultExtension::new(offering.name.clone())));
        }
    }
    registry
}

pub async fn build_broker(cfg: &AppConfig) -> anyhow::Result<Broker> {
    let catalog = Catalog::load_dir(&cfg.broker.catalog_dir).with_context(|| {
        format!(
            "failed to load catalog from {}",
            cfg.broker.catalog_dir.display()
        )
    })?;
    if catalog.is_empty() {
        warn!(dir = %cfg.broker.catalog_dir.display(), "Catalog has no services");
    }

    let registry = build_registry(&catalog);
    let store = build_store(&cfg.storage).await?;
    let cluster = build_cluster(&cfg.cluster)?;
    let reconciler = Reconciler::new(cluster, cfg.cluster.instance_label.clone());

    Ok(Broker::new(Arc::new(catalog), Arc::new(registry), store, reconciler)
        .with_async_mode(cfg.broker.async_mode))
}
