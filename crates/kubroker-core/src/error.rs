use thiserror::Error;

/// Errors raised while loading or querying the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("service id {0} is not found")]
    ServiceNotFound(String),

    #[error("plan id {plan_id} is not found for service {service_id}")]
    PlanNotFound { service_id: String, plan_id: String },

    #[error("service template for {0} is not found")]
    TemplateNotFound(String),

    #[error("duplicate service name: {0}")]
    DuplicateServiceName(String),

    #[error("duplicate service id: {0}")]
    DuplicateServiceId(String),

    #[error("duplicate plan name {plan} in service {service}")]
    DuplicatePlanName { service: String, plan: String },

    #[error("duplicate template for service {0}")]
    DuplicateTemplate(String),

    #[error("invalid quota: {0}")]
    InvalidQuota(String),

    #[error("failed to parse offering descriptor {path}: {source}")]
    Descriptor {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CatalogError {
    pub fn service_not_found(service_id: impl Into<String>) -> Self {
        Self::ServiceNotFound(service_id.into())
    }

    pub fn plan_not_found(service_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self::PlanNotFound {
            service_id: service_id.into(),
            plan_id: plan_id.into(),
        }
    }

    pub fn template_not_found(service_name: impl Into<String>) -> Self {
        Self::TemplateNotFound(service_name.into())
    }

    pub fn invalid_quota(message: impl Into<String>) -> Self {
        Self::InvalidQuota(message.into())
    }

    /// Check if this error is a failed lookup (as opposed to a load failure)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ServiceNotFound(_) | Self::PlanNotFound { .. } | Self::TemplateNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
