//! Errors raised while talking to the cluster or decoding manifests.

/// Errors from the cluster API or the reconciler.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The object does not exist.
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    /// No REST resource is registered for the apiVersion/kind pair.
    #[error("no resource type found for {api_version}, kind={kind}")]
    Discovery { api_version: String, kind: String },

    /// A manifest document could not be decoded.
    #[error("failed to decode manifest: {0}")]
    Decode(String),

    /// A decoded document lacks a required field.
    #[error("invalid resource document: {0}")]
    InvalidDocument(String),

    /// The API server answered with a non-success status.
    #[error("cluster API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure.
    #[error("cluster request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Credentials or client configuration could not be loaded.
    #[error("cluster client configuration error: {0}")]
    Config(String),
}

impl ClusterError {
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn discovery(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::Discovery {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }

    pub fn decode(message: impl std::fmt::Display) -> Self {
        Self::Decode(message.to_string())
    }

    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if the error means the object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Api { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
