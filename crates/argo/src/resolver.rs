use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use devplane_common::{
    argo::{ArgoClusterSecretConfig, ARGO_SECRET_TYPE_CLUSTER, ARGO_SECRET_TYPE_LABEL},
    cluster::{ClusterBean, ClusterConnectionConfig},
    DEFAULT_CLUSTER_URL,
};
use devplane_kube::client::{build_client, pem_bytes};
use devplane_rpc::error::ApiError;
use k8s_openapi::api::core::v1::Secret;
use kube::{api::ListParams, Api};
use tracing::{debug, error, warn};

use crate::lookup::ClusterLookup;

#[cfg(test)]
use mockall::automock;

const SECRET_SERVER_KEY: &str = "server";
const SECRET_CONFIG_KEY: &str = "config";

/// The cluster an application's workloads run in. `cluster_id` is 0 when
/// the cluster isn't registered and the credentials come from Argo CD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub cluster_id: i32,
    pub connection: ClusterConnectionConfig,
}

/// Argo CD cluster secrets readable in a cluster.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterSecretSource: Send + Sync {
    async fn cluster_secrets(
        &self,
        conn: &ClusterConnectionConfig,
    ) -> Result<Vec<BTreeMap<String, String>>>;
}

#[derive(Clone)]
pub struct KubeClusterSecretSource {
    timeout: Duration,
}

impl KubeClusterSecretSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ClusterSecretSource for KubeClusterSecretSource {
    async fn cluster_secrets(
        &self,
        conn: &ClusterConnectionConfig,
    ) -> Result<Vec<BTreeMap<String, String>>> {
        let client = build_client(conn, self.timeout)?;
        let api: Api<Secret> = Api::all(client);
        let selector = format!("{ARGO_SECRET_TYPE_LABEL}={ARGO_SECRET_TYPE_CLUSTER}");
        let secrets = api.list(&ListParams::default().labels(&selector)).await?;
        Ok(secrets
            .items
            .into_iter()
            .map(|secret| {
                secret
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, v)| (k, String::from_utf8_lossy(&v.0).into_owned()))
                    .collect()
            })
            .collect())
    }
}

fn decoded_pem(field: &str, data: &str) -> Option<String> {
    if data.is_empty() {
        return None;
    }
    match pem_bytes(data) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) => {
            warn!(field, error = ?err, "argocd cluster secret carries undecodable tls data");
            None
        }
    }
}

/// Connection to `server` built from an Argo CD cluster secret's `config`.
pub fn connection_from_secret(server: &str, config: &ArgoClusterSecretConfig) -> ClusterConnectionConfig {
    let tls = &config.tls_client_config;
    let (key_data, cert_data, ca_data) = if tls.insecure {
        (None, None, None)
    } else {
        (
            decoded_pem("keyData", &tls.key_data),
            decoded_pem("certData", &tls.cert_data),
            decoded_pem("caData", &tls.ca_data),
        )
    };
    ClusterConnectionConfig {
        cluster_id: 0,
        cluster_name: String::new(),
        server_url: server.to_string(),
        bearer_token: Some(config.bearer_token.clone()).filter(|t| !t.is_empty()),
        insecure_skip_tls_verify: tls.insecure,
        key_data,
        cert_data,
        ca_data,
        remote_connection: None,
    }
}

fn same_server(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Finds where an application's workloads run from its
/// `spec.destination.server`.
#[derive(Clone)]
pub struct DestinationResolver {
    clusters: Arc<dyn ClusterLookup>,
    secrets: Arc<dyn ClusterSecretSource>,
}

impl DestinationResolver {
    pub fn new(clusters: Arc<dyn ClusterLookup>, secrets: Arc<dyn ClusterSecretSource>) -> Self {
        Self { clusters, secrets }
    }

    /// `source` is the cluster holding the `Application` object. `None`
    /// means the destination is neither registered nor known to Argo CD.
    pub async fn resolve(
        &self,
        source: &ClusterBean,
        destination_server: &str,
    ) -> Result<Option<Destination>, ApiError> {
        if destination_server.is_empty() {
            return Ok(None);
        }
        if destination_server == DEFAULT_CLUSTER_URL {
            return Ok(Some(Destination {
                cluster_id: source.id,
                connection: source.connection_config(),
            }));
        }

        let clusters = self.clusters.active_clusters().await?;
        if let Some(cluster) = clusters
            .iter()
            .find(|c| same_server(&c.server_url, destination_server))
        {
            return Ok(Some(Destination {
                cluster_id: cluster.id,
                connection: cluster.connection_config(),
            }));
        }

        let secrets = self
            .secrets
            .cluster_secrets(&source.connection_config())
            .await
            .map_err(|e| {
                error!(cluster_id = source.id, error = ?e, "failed to list argocd cluster secrets");
                ApiError::upstream(format!("{e:#}"))
            })?;
        for data in secrets {
            let Some(server) = data.get(SECRET_SERVER_KEY) else {
                continue;
            };
            if !same_server(server, destination_server) {
                continue;
            }
            let Some(raw) = data.get(SECRET_CONFIG_KEY) else {
                continue;
            };
            let config: ArgoClusterSecretConfig = serde_json::from_str(raw).map_err(|e| {
                error!(server = server.as_str(), error = ?e, "argocd cluster secret config can't be decoded");
                ApiError::upstream(format!("invalid cluster config in argocd secret: {e}"))
            })?;
            debug!(server = server.as_str(), "destination resolved from argocd cluster secret");
            return Ok(Some(Destination {
                cluster_id: 0,
                connection: connection_from_secret(destination_server, &config),
            }));
        }
        Ok(None)
    }
}
