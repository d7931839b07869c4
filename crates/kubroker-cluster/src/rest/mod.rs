//! Cluster client over the Kubernetes REST API.

mod credentials;

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub use credentials::{ClusterCredentials, SERVICE_ACCOUNT_DIR};

use crate::client::ClusterApi;
use crate::error::{ClusterError, Result};
use crate::pod::{Pod, PodList};
use crate::resource::{ResourceType, group_version_path};

#[derive(Debug, Deserialize)]
struct ApiResourceList {
    #[serde(default)]
    resources: Vec<ApiResource>,
}

#[derive(Debug, Deserialize)]
struct ApiResource {
    name: String,
    kind: String,
    #[serde(default)]
    namespaced: bool,
}

/// The `Status` object the API server returns on failures.
#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

pub struct RestClusterClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    /// (apiVersion, kind) -> resource type
    discovery: DashMap<(String, String), ResourceType>,
}

impl RestClusterClient {
    pub fn new(credentials: ClusterCredentials, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(pem) = &credentials.ca_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| ClusterError::config(format!("invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        if credentials.insecure_skip_tls_verify {
            warn!(server = %credentials.server, "TLS verification disabled for cluster API");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| ClusterError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: credentials.server.as_str().trim_end_matches('/').to_string(),
            token: credentials.token,
            discovery: DashMap::new(),
        })
    }

    /// Builds a client from a kubeconfig path, or in-cluster credentials when the path is empty.
    pub fn from_kubeconfig_or_in_cluster(kubeconfig: &str, timeout: Duration) -> Result<Self> {
        let credentials = if kubeconfig.is_empty() {
            ClusterCredentials::in_cluster()?
        } else {
            ClusterCredentials::from_kubeconfig(kubeconfig)?
        };
        debug!(?credentials, "Cluster credentials loaded");
        Self::new(credentials, timeout)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn fetch_discovery(&self, api_version: &str) -> Result<()> {
        let resp = self
            .request(Method::GET, &group_version_path(api_version))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let list: ApiResourceList = check(resp).await?.json().await?;

        for res in list.resources {
            // subresources such as pods/status
            if res.name.contains('/') {
                continue;
            }
            let resource = ResourceType::new(api_version, &res.kind, res.name, res.namespaced);
            self.discovery
                .insert((api_version.to_string(), res.kind), resource);
        }
        Ok(())
    }
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiStatus>(&body)
        .map(|s| s.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or(body);
    Err(ClusterError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ClusterApi for RestClusterClient {
    async fn discover(&self, api_version: &str, kind: &str) -> Result<ResourceType> {
        let key = (api_version.to_string(), kind.to_string());
        if let Some(found) = self.discovery.get(&key) {
            return Ok(found.value().clone());
        }
        self.fetch_discovery(api_version).await?;
        self.discovery
            .get(&key)
            .map(|r| r.value().clone())
            .ok_or_else(|| ClusterError::discovery(api_version, kind))
    }

    async fn create(&self, resource: &ResourceType, namespace: &str, body: &Value) -> Result<Value> {
        let resp = self
            .request(Method::POST, &resource.collection_path(namespace))
            .json(body)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn get(&self, resource: &ResourceType, namespace: &str, name: &str) -> Result<Option<Value>> {
        let resp = self
            .request(Method::GET, &resource.object_path(namespace, name))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(resp).await?.json().await?))
    }

    async fn update(
        &self,
        resource: &ResourceType,
        namespace: &str,
        name: &str,
        body: &Value,
    ) -> Result<Value> {
        let resp = self
            .request(Method::PUT, &resource.object_path(namespace, name))
            .json(body)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn delete(&self, resource: &ResourceType, namespace: &str, name: &str) -> Result<()> {
        let resp = self
            .request(Method::DELETE, &resource.object_path(namespace, name))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ClusterError::not_found(&resource.kind, namespace, name));
        }
        check(resp).await?;
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let resp = self
            .request(Method::GET, &format!("/api/v1/namespaces/{namespace}/pods"))
            .query(&[("labelSelector", label_selector)])
            .send()
            .await?;
        let list: PodList = check(resp).await?.json().await?;
        Ok(list.items)
    }
}
