//! Cluster endpoint and bearer-token credentials.
//!
//! Loaded either from a kubeconfig file (current context only) or from the
//! service-account files mounted into a pod.

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use url::Url;

use crate::error::{ClusterError, Result};

/// Directory holding the mounted service-account token and CA bundle.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

#[derive(Clone)]
pub struct ClusterCredentials {
    pub server: Url,
    pub token: Option<String>,
    /// PEM-encoded CA bundle to trust in addition to the system roots.
    pub ca_pem: Option<Vec<u8>>,
    pub insecure_skip_tls_verify: bool,
}

impl std::fmt::Debug for ClusterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCredentials")
            .field("server", &self.server.as_str())
            .field("token", &self.token.as_ref().map(|_| "****"))
            .field("ca_pem", &self.ca_pem.is_some())
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(rename = "current-context", default)]
    current_context: String,
    #[serde(default)]
    clusters: Vec<Named<KubeCluster>>,
    #[serde(default)]
    users: Vec<Named<KubeUser>>,
    #[serde(default)]
    contexts: Vec<Named<KubeContext>>,
}

#[derive(Debug, Deserialize)]
struct Named<T> {
    name: String,
    #[serde(alias = "cluster", alias = "user", alias = "context")]
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct KubeCluster {
    server: String,
    #[serde(default)]
    certificate_authority: Option<PathBuf>,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Default, Deserialize)]
struct KubeUser {
    #[serde(default)]
    token: Option<String>,
    #[serde(rename = "tokenFile", default)]
    token_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct KubeContext {
    cluster: String,
    #[serde(default)]
    user: String,
}

fn find<'a, T>(items: &'a [Named<T>], name: &str, what: &str) -> Result<&'a T> {
    items
        .iter()
        .find(|n| n.name == name)
        .map(|n| &n.value)
        .ok_or_else(|| ClusterError::config(format!("kubeconfig has no {what} named {name:?}")))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| ClusterError::config(format!("failed to read {}: {e}", path.display())))
}

fn parse_server(server: &str) -> Result<Url> {
    Url::parse(server).map_err(|e| ClusterError::config(format!("invalid server URL {server:?}: {e}")))
}

impl ClusterCredentials {
    /// Loads the current context of a kubeconfig file.
    ///
    /// Relative certificate and token file paths resolve against the
    /// kubeconfig's directory.
    pub fn from_kubeconfig(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = read_file(path)?;
        let config: Kubeconfig = serde_yaml::from_slice(&raw)
            .map_err(|e| ClusterError::config(format!("invalid kubeconfig {}: {e}", path.display())))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        if config.current_context.is_empty() {
            return Err(ClusterError::config("kubeconfig has no current-context"));
        }
        let context = find(&config.contexts, &config.current_context, "context")?;
        let cluster = find(&config.clusters, &context.cluster, "cluster")?;
        let user = if context.user.is_empty() {
            None
        } else {
            Some(find(&config.users, &context.user, "user")?)
        };

        let ca_pem = match (&cluster.certificate_authority_data, &cluster.certificate_authority) {
            (Some(data), _) => Some(
                STANDARD
                    .decode(data.trim())
                    .map_err(|e| ClusterError::config(format!("invalid certificate-authority-data: {e}")))?,
            ),
            (None, Some(file)) => Some(read_file(&base.join(file))?),
            (None, None) => None,
        };

        let token = match user {
            Some(KubeUser {
                token: Some(token), ..
            }) => Some(token.clone()),
            Some(KubeUser {
                token_file: Some(file),
                ..
            }) => Some(String::from_utf8_lossy(&read_file(&base.join(file))?).trim().to_string()),
            _ => None,
        };

        Ok(Self {
            server: parse_server(&cluster.server)?,
            token,
            ca_pem,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
        })
    }

    /// Credentials of the pod's service account.
    pub fn in_cluster() -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| ClusterError::config("KUBERNETES_SERVICE_HOST is not set; not running in a cluster"))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
        Self::from_service_account(&host, &port, Path::new(SERVICE_ACCOUNT_DIR))
    }

    pub fn from_service_account(host: &str, port: &str, dir: &Path) -> Result<Self> {
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        let token = String::from_utf8_lossy(&read_file(&dir.join("token"))?)
            .trim()
            .to_string();
        let ca_path = dir.join("ca.crt");
        let ca_pem = if ca_path.exists() {
            Some(read_file(&ca_path)?)
        } else {
            None
        };

        Ok(Self {
            server: parse_server(&format!("https://{host}:{port}"))?,
            token: Some(token),
            ca_pem,
            insecure_skip_tls_verify: false,
        })
    }
}
