//! # kubroker-cluster
//!
//! Everything the broker needs from the container-orchestration cluster.
//!
//! - [`ClusterApi`]: typed create/get/update/delete, kind discovery and pod
//!   listing. Implemented over the Kubernetes REST API by
//!   [`RestClusterClient`] and in process by [`InMemoryCluster`].
//! - [`manifest`]: streaming decoding of multi-document YAML or JSON manifests.
//! - [`Reconciler`]: applies, re-applies or removes a rendered manifest and
//!   folds pod container statuses into a [`Readiness`].

mod client;
mod error;
pub mod manifest;
mod memory;
mod pod;
mod reconciler;
mod resource;
mod rest;

pub use client::{ClusterApi, DynClusterApi};
pub use error::{ClusterError, Result};
pub use memory::{ClusterCall, InMemoryCluster};
pub use pod::{
    CONTAINER_CREATING, ContainerState, ContainerStateWaiting, ContainerStatus, Pod, PodList,
    PodMetadata, PodStatus,
};
pub use reconciler::{
    ApplyMode, DEFAULT_NAMESPACE, KindFilter, Readiness, Reconciler, ServiceMap,
};
pub use resource::{ResourceDocument, ResourceType, group_version_path, split_api_version};
pub use rest::{ClusterCredentials, RestClusterClient, SERVICE_ACCOUNT_DIR};
