//! Kubeconfig import. Each context becomes a candidate cluster. Problems
//! found in a context are reported on that cluster rather than failing the
//! whole document.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use devplane_common::{
    cluster::{
        ClusterBean, UserInfo, ValidateClusterBean, BEARER_TOKEN, CERT_AUTH_DATA, CERT_DATA,
        CLUSTER_ALREADY_EXISTS, TLS_KEY,
    },
    DEFAULT_CLUSTER,
};
use kube::config::{AuthInfo, Cluster, Kubeconfig};
use secrecy::ExposeSecret;

use crate::client::pem_bytes;

pub const RESERVED_CLUSTER_ERROR: &str =
    "default_cluster is reserved by the system and cannot be updated";
pub const CLUSTER_NAME_MISSING_ERROR: &str = "cluster name missing from kubeconfig";
pub const SERVER_URL_MISSING_ERROR: &str = "server url missing from the kubeconfig";
pub const TOKEN_MISSING_ERROR: &str = "token missing from the kubeconfig";

const CLIENT_KEY_DATA: &str = "client-key-data";
const CERTIFICATE_AUTHORITY_DATA: &str = "certificate-authority-data";
const CLIENT_CERTIFICATE_DATA: &str = "client-certificate-data";

/// The parts of a kubeconfig cluster that end up on the cluster, absent
/// values read as empty.
#[derive(Default)]
struct Endpoint {
    server: String,
    insecure_skip_tls_verify: bool,
    certificate_authority_data: String,
}

impl From<&Cluster> for Endpoint {
    fn from(cluster: &Cluster) -> Self {
        Self {
            server: cluster.server.clone().unwrap_or_default(),
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify.unwrap_or(false),
            certificate_authority_data: cluster
                .certificate_authority_data
                .clone()
                .unwrap_or_default(),
        }
    }
}

#[derive(Default)]
struct Credentials {
    token: String,
    client_certificate_data: String,
    client_key_data: String,
}

impl From<&AuthInfo> for Credentials {
    fn from(user: &AuthInfo) -> Self {
        Self {
            token: user
                .token
                .as_ref()
                .map(|t| t.expose_secret().to_string())
                .unwrap_or_default(),
            client_certificate_data: user.client_certificate_data.clone().unwrap_or_default(),
            client_key_data: user
                .client_key_data
                .as_ref()
                .map(|k| k.expose_secret().to_string())
                .unwrap_or_default(),
        }
    }
}

/// One context of the document, turned into a cluster candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct KubeconfigEntry {
    pub cluster: ClusterBean,
    pub user_name: String,
    pub user_config: HashMap<String, String>,
}

impl KubeconfigEntry {
    pub fn is_valid(&self) -> bool {
        self.cluster.error_in_connecting.is_empty()
    }
}

/// Parses `document` (YAML or JSON) and validates every context whose
/// cluster is present. Only a malformed document is an error.
pub fn parse_kubeconfig(document: &str) -> Result<Vec<KubeconfigEntry>> {
    let config =
        Kubeconfig::from_yaml(document).map_err(|e| anyhow!("invalid kubeConfig found , {e}"))?;
    if config.api_version.as_deref().unwrap_or_default().is_empty() {
        return Err(anyhow!("api version missing from kubeConfig"));
    }
    if config.kind.as_deref().unwrap_or_default().is_empty() {
        return Err(anyhow!("kind missing from kubeConfig"));
    }

    let clusters: HashMap<&str, Endpoint> = config
        .clusters
        .iter()
        .map(|c| {
            let endpoint = c.cluster.as_ref().map(Endpoint::from).unwrap_or_default();
            (c.name.as_str(), endpoint)
        })
        .collect();
    let users: HashMap<&str, Credentials> = config
        .auth_infos
        .iter()
        .map(|u| {
            let credentials = u.auth_info.as_ref().map(Credentials::from).unwrap_or_default();
            (u.name.as_str(), credentials)
        })
        .collect();
    let no_credentials = Credentials::default();

    let mut entries = Vec::new();
    for ctx in config.contexts.iter().filter_map(|c| c.context.as_ref()) {
        let Some(cluster) = clusters.get(ctx.cluster.as_str()) else {
            continue;
        };
        let user_name = ctx.user.clone().unwrap_or_default();
        let user = users.get(user_name.as_str()).unwrap_or(&no_credentials);
        entries.push(context_entry(&ctx.cluster, &user_name, cluster, user));
    }
    Ok(entries)
}

fn context_entry(
    cluster_name: &str,
    user_name: &str,
    cluster: &Endpoint,
    user: &Credentials,
) -> KubeconfigEntry {
    let mut bean = ClusterBean {
        cluster_name: cluster_name.to_string(),
        server_url: cluster.server.clone(),
        insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
        user_name: Some(user_name.to_string()),
        ..Default::default()
    };
    let mut config = HashMap::new();
    if !user.token.is_empty() {
        config.insert(BEARER_TOKEN.to_string(), user.token.clone());
    }

    let error = if cluster_name.is_empty() {
        Some(CLUSTER_NAME_MISSING_ERROR.to_string())
    } else if cluster_name == DEFAULT_CLUSTER {
        Some(RESERVED_CLUSTER_ERROR.to_string())
    } else if cluster.server.is_empty() {
        Some(SERVER_URL_MISSING_ERROR.to_string())
    } else if user.token.is_empty() && cluster.insecure_skip_tls_verify {
        Some(TOKEN_MISSING_ERROR.to_string())
    } else if !cluster.insecure_skip_tls_verify {
        tls_config(cluster, user, &mut config).err()
    } else {
        None
    };

    bean.error_in_connecting = error.unwrap_or_default();
    if bean.error_in_connecting.is_empty() {
        bean.config = config.clone();
    }
    KubeconfigEntry {
        cluster: bean,
        user_name: user_name.to_string(),
        user_config: config,
    }
}

fn tls_config(
    cluster: &Endpoint,
    user: &Credentials,
    config: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    let missing: Vec<&str> = [
        (CLIENT_KEY_DATA, user.client_key_data.as_str()),
        (CERTIFICATE_AUTHORITY_DATA, cluster.certificate_authority_data.as_str()),
        (CLIENT_CERTIFICATE_DATA, user.client_certificate_data.as_str()),
    ]
    .into_iter()
    .filter(|(_, v)| v.is_empty())
    .map(|(k, _)| k)
    .collect();
    if !missing.is_empty() {
        return Err(format!("Missing fields against user: {}", missing.join(", ")));
    }

    for (key, field, data) in [
        (TLS_KEY, CLIENT_KEY_DATA, &user.client_key_data),
        (CERT_DATA, CLIENT_CERTIFICATE_DATA, &user.client_certificate_data),
        (CERT_AUTH_DATA, CERTIFICATE_AUTHORITY_DATA, &cluster.certificate_authority_data),
    ] {
        let pem = pem_bytes(data)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| format!("invalid {field} in the kubeconfig"))?;
        config.insert(key.to_string(), pem);
    }
    Ok(())
}

/// Builds the import result keyed by cluster name, once valid entries were
/// probed. `existing` maps active cluster names to their ids; such clusters
/// are flagged, never merged.
pub fn assemble_validation_result(
    entries: Vec<KubeconfigEntry>,
    existing: &HashMap<String, i32>,
) -> HashMap<String, ValidateClusterBean> {
    let mut result: HashMap<String, ValidateClusterBean> = HashMap::new();
    for mut entry in entries {
        if entry.cluster.error_in_connecting.is_empty() {
            if let Some(id) = existing.get(&entry.cluster.cluster_name) {
                entry.cluster.error_in_connecting = CLUSTER_ALREADY_EXISTS.to_string();
                entry.cluster.id = *id;
            }
        }
        let user_info = UserInfo {
            user_name: entry.user_name.clone(),
            config: entry.user_config,
            error_in_connecting: entry.cluster.error_in_connecting.clone(),
        };
        let validated = result
            .entry(entry.cluster.cluster_name.clone())
            .or_insert_with(|| ValidateClusterBean {
                cluster: entry.cluster.clone(),
                user_infos: HashMap::new(),
            });
        if entry.cluster.id != 0 {
            validated.cluster.id = entry.cluster.id;
        }
        validated.user_infos.insert(entry.user_name, user_info);
    }
    result
}
