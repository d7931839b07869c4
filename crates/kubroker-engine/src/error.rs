//! Broker-level errors and their caller-visible kinds.

use std::fmt;

use kubroker_cluster::ClusterError;
use kubroker_core::CatalogError;
use kubroker_storage::StorageError;

/// Caller-visible category of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown service, plan or template, or a required parameter is missing.
    NotFound,
    /// The instance already exists.
    Conflict,
    /// The instance does not exist.
    Gone,
    /// Rendering failed or a hook rejected its input.
    ValidationFailure,
    /// The cluster capability failed.
    ClusterFailure,
    /// The persistence capability failed.
    PersistenceFailure,
    /// A lifecycle hook failed.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Gone => write!(f, "gone"),
            Self::ValidationFailure => write!(f, "validation_failure"),
            Self::ClusterFailure => write!(f, "cluster_failure"),
            Self::PersistenceFailure => write!(f, "persistence_failure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("service extension for {0} is not registered")]
    ExtensionNotFound(String),

    #[error("{0} is not found in parameters")]
    MissingParameter(&'static str),

    #[error("instance id {0} already exists")]
    InstanceExists(String),

    #[error("instance id {0} is gone")]
    InstanceGone(String),

    #[error("render failed at {stage} stage: {message}")]
    Render { stage: RenderStage, message: String },

    #[error("{hook} hook failed: {message}")]
    Hook { hook: &'static str, message: String },

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Stage of the template pipeline that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Identity,
    Parameters,
    Plan,
    PostDeploy,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "identity"),
            Self::Parameters => write!(f, "parameter"),
            Self::Plan => write!(f, "plan"),
            Self::PostDeploy => write!(f, "post-deploy"),
        }
    }
}

impl BrokerError {
    pub fn render(stage: RenderStage, message: impl fmt::Display) -> Self {
        Self::Render {
            stage,
            message: message.to_string(),
        }
    }

    pub fn hook(hook: &'static str, message: impl fmt::Display) -> Self {
        Self::Hook {
            hook,
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Catalog(e) if e.is_not_found() => ErrorKind::NotFound,
            Self::Catalog(_) => ErrorKind::ValidationFailure,
            Self::ExtensionNotFound(_) | Self::MissingParameter(_) => ErrorKind::NotFound,
            Self::InstanceExists(_) => ErrorKind::Conflict,
            Self::InstanceGone(_) => ErrorKind::Gone,
            Self::Render { .. } => ErrorKind::ValidationFailure,
            Self::Hook { .. } => ErrorKind::Internal,
            Self::Cluster(_) => ErrorKind::ClusterFailure,
            Self::Storage(_) => ErrorKind::PersistenceFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let cases: Vec<(BrokerError, ErrorKind)> = vec![
            (CatalogError::service_not_found("s1").into(), ErrorKind::NotFound),
            (CatalogError::invalid_quota("x").into(), ErrorKind::ValidationFailure),
            (BrokerError::MissingParameter("NAMESPACE"), ErrorKind::NotFound),
            (BrokerError::ExtensionNotFound("redis".into()), ErrorKind::NotFound),
            (BrokerError::InstanceExists("i1".into()), ErrorKind::Conflict),
            (BrokerError::InstanceGone("i1".into()), ErrorKind::Gone),
            (
                BrokerError::render(RenderStage::Identity, "missing Id"),
                ErrorKind::ValidationFailure,
            ),
            (BrokerError::hook("beforeDelete", "boom"), ErrorKind::Internal),
            (
                ClusterError::discovery("v1", "Widget").into(),
                ErrorKind::ClusterFailure,
            ),
            (StorageError::internal("down").into(), ErrorKind::PersistenceFailure),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            BrokerError::MissingParameter("NAMESPACE").to_string(),
            "NAMESPACE is not found in parameters"
        );
        assert_eq!(
            BrokerError::render(RenderStage::PostDeploy, "bad").to_string(),
            "render failed at post-deploy stage: bad"
        );
        assert_eq!(ErrorKind::PersistenceFailure.to_string(), "persistence_failure");
    }
}
