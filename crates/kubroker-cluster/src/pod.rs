//! The slice of the Pod object the readiness check reads.

use serde::{Deserialize, Serialize};

/// Wait reason of a container whose image is still being pulled or started.
pub const CONTAINER_CREATING: &str = "ContainerCreating";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: PodMetadata,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: ContainerState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting: Option<ContainerStateWaiting>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStateWaiting {
    #[serde(default)]
    pub reason: String,
}

impl ContainerStatus {
    pub fn ready(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: true,
            state: ContainerState::default(),
        }
    }

    pub fn waiting(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: false,
            state: ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: reason.into(),
                }),
            },
        }
    }

    /// Not ready and waiting for anything other than container creation.
    ///
    /// A not-ready container with no waiting state (running but failing its
    /// probe, or terminated) is not counted as failed.
    pub fn has_failed(&self) -> bool {
        !self.ready
            && self
                .state
                .waiting
                .as_ref()
                .is_some_and(|w| w.reason != CONTAINER_CREATING)
    }
}

impl Pod {
    pub fn new(name: impl Into<String>, containers: Vec<ContainerStatus>) -> Self {
        Self {
            metadata: PodMetadata {
                name: name.into(),
                ..Default::default()
            },
            status: PodStatus {
                phase: None,
                container_statuses: containers,
            },
        }
    }
}

/// `{"items": [...]}` as returned by a pod list call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}
