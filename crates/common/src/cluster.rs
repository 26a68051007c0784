use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const BEARER_TOKEN: &str = "bearer_token";
pub const TLS_KEY: &str = "tls_key";
pub const CERT_DATA: &str = "cert_data";
pub const CERT_AUTH_DATA: &str = "cert_auth_data";

/// Marker written on kubeconfig import results whose cluster name is already
/// registered.
pub const CLUSTER_ALREADY_EXISTS: &str = "cluster-already-exists";

pub const CLUSTER_MODIFY_EVENT_PREFIX: &str = "cluster-event";
pub const CLUSTER_MODIFY_LABEL_KEY: &str = "devtron.ai/purpose";
pub const CLUSTER_MODIFY_LABEL_VALUE: &str = "cluster-modify";
pub const CLUSTER_EVENT_FIELD_CLUSTER_ID: &str = "clusterId";
pub const CLUSTER_EVENT_FIELD_ACTION: &str = "action";
pub const CLUSTER_EVENT_FIELD_UPDATED_ON: &str = "updatedOn";

pub fn cluster_modify_event_name(cluster_id: i32) -> String {
    format!("{CLUSTER_MODIFY_EVENT_PREFIX}-{cluster_id}")
}

pub fn virtual_cluster_error(cluster_name: &str) -> String {
    format!("virtual cluster '{cluster_name}' error: connection not setup for isolated clusters")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusAuth {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub tls_client_cert: String,
    #[serde(default)]
    pub tls_client_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshTunnelConfig {
    pub ssh_server_address: String,
    pub ssh_username: String,
    #[serde(default)]
    pub ssh_password: String,
    #[serde(default)]
    pub ssh_auth_key: String,
}

/// How the control plane reaches a cluster that isn't directly routable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RemoteConnection {
    Proxy { proxy_url: String },
    SshTunnel(SshTunnelConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterBean {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub server_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_url: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub config: HashMap<String, String>,
    #[serde(
        rename = "prometheusAuth",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub prometheus_auth: Option<PrometheusAuth>,
    #[serde(
        rename = "remoteConnectionConfig",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_connection: Option<RemoteConnection>,
    #[serde(rename = "k8sVersion", default)]
    pub k8s_version: String,
    #[serde(rename = "insecureSkipTlsVerify", default)]
    pub insecure_skip_tls_verify: bool,
    #[serde(rename = "errorInConnecting", default)]
    pub error_in_connecting: String,
    #[serde(rename = "isVirtualCluster", default)]
    pub is_virtual_cluster: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "userName", default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl ClusterBean {
    pub fn config_value(&self, key: &str) -> &str {
        self.config.get(key).map(|v| v.as_str()).unwrap_or("")
    }

    /// The credentials used to talk to the cluster. TLS material is dropped
    /// when the cluster is marked insecure.
    pub fn connection_config(&self) -> ClusterConnectionConfig {
        let (key_data, cert_data, ca_data) = if self.insecure_skip_tls_verify {
            (None, None, None)
        } else {
            (
                non_empty(self.config_value(TLS_KEY)),
                non_empty(self.config_value(CERT_DATA)),
                non_empty(self.config_value(CERT_AUTH_DATA)),
            )
        };
        ClusterConnectionConfig {
            cluster_id: self.id,
            cluster_name: self.cluster_name.clone(),
            server_url: self.server_url.clone(),
            bearer_token: non_empty(self.config_value(BEARER_TOKEN)),
            insecure_skip_tls_verify: self.insecure_skip_tls_verify,
            key_data,
            cert_data,
            ca_data,
            remote_connection: self.remote_connection.clone(),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Everything needed to build a kube client for one cluster.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClusterConnectionConfig {
    pub cluster_id: i32,
    pub cluster_name: String,
    pub server_url: String,
    pub bearer_token: Option<String>,
    pub insecure_skip_tls_verify: bool,
    pub key_data: Option<String>,
    pub cert_data: Option<String>,
    pub ca_data: Option<String>,
    pub remote_connection: Option<RemoteConnection>,
}

impl std::fmt::Debug for ClusterConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConnectionConfig")
            .field("cluster_id", &self.cluster_id)
            .field("cluster_name", &self.cluster_name)
            .field("server_url", &self.server_url)
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .finish_non_exhaustive()
    }
}

/// A credential field in an update request. An empty string in the request
/// keeps what is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sticky<T> {
    Keep,
    Replace(T),
}

impl Sticky<String> {
    pub fn from_request(value: Option<&String>) -> Self {
        match value {
            Some(v) if !v.is_empty() => Sticky::Replace(v.clone()),
            _ => Sticky::Keep,
        }
    }

    pub fn resolve(&self, stored: &str) -> String {
        match self {
            Sticky::Keep => stored.to_string(),
            Sticky::Replace(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialsUpdate {
    pub bearer_token: Sticky<String>,
    pub tls_key: Sticky<String>,
    pub cert_data: Sticky<String>,
    pub cert_auth_data: Sticky<String>,
}

impl CredentialsUpdate {
    pub fn from_request(config: &HashMap<String, String>) -> Self {
        Self {
            bearer_token: Sticky::from_request(config.get(BEARER_TOKEN)),
            tls_key: Sticky::from_request(config.get(TLS_KEY)),
            cert_data: Sticky::from_request(config.get(CERT_DATA)),
            cert_auth_data: Sticky::from_request(config.get(CERT_AUTH_DATA)),
        }
    }

    /// Merges the update onto the stored credentials. Keys other than the
    /// four credential keys are carried over from the stored map.
    pub fn apply(&self, stored: &HashMap<String, String>) -> HashMap<String, String> {
        let get = |key: &str| stored.get(key).map(|v| v.as_str()).unwrap_or("");
        let mut merged = stored.clone();
        for (key, field) in [
            (BEARER_TOKEN, &self.bearer_token),
            (TLS_KEY, &self.tls_key),
            (CERT_DATA, &self.cert_data),
            (CERT_AUTH_DATA, &self.cert_auth_data),
        ] {
            let value = field.resolve(get(key));
            if value.is_empty() {
                merged.remove(key);
            } else {
                merged.insert(key.to_string(), value);
            }
        }
        merged
    }
}

/// Returns true when any field that affects connectivity differs.
pub fn connection_changed(
    stored_url: &str,
    stored_insecure: bool,
    stored_config: &HashMap<String, String>,
    new_url: &str,
    new_insecure: bool,
    new_config: &HashMap<String, String>,
) -> bool {
    let get = |m: &HashMap<String, String>, key: &str| m.get(key).cloned().unwrap_or_default();
    stored_url != new_url
        || stored_insecure != new_insecure
        || [BEARER_TOKEN, TLS_KEY, CERT_DATA, CERT_AUTH_DATA]
            .iter()
            .any(|key| get(stored_config, key) != get(new_config, key))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "userName", default)]
    pub user_name: String,
    #[serde(default)]
    pub config: HashMap<String, String>,
    #[serde(rename = "errorInConnecting", default)]
    pub error_in_connecting: String,
}

/// Result of validating one kubeconfig context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidateClusterBean {
    #[serde(flatten)]
    pub cluster: ClusterBean,
    #[serde(rename = "userInfos", default)]
    pub user_infos: HashMap<String, UserInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeconfigRequest {
    pub config: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAutoComplete {
    pub id: i32,
    pub cluster_name: String,
    #[serde(rename = "errorInConnecting")]
    pub error_in_connecting: String,
    #[serde(rename = "isVirtualCluster")]
    pub is_virtual_cluster: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDescriptionUpdate {
    pub id: i32,
    pub description: String,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::EnumString,
    strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ClusterModifyAction {
    Add,
    Update,
}

/// Connection lifecycle of a registered cluster.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
pub enum ClusterState {
    Unregistered,
    Validating,
    Reachable,
    #[strum(to_string = "Not Reachable")]
    NotReachable,
    Virtual,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterStateEvent {
    /// Create or update asked for validation.
    ValidationStarted,
    /// Synchronous validation finished. `None` means the cluster answered.
    Validated(Option<String>),
    /// The prober wrote a new connection error, empty meaning reachable.
    Probed(String),
    MarkedVirtual,
    Deleted,
}

impl ClusterState {
    pub fn of(active: bool, is_virtual: bool, error_in_connecting: &str) -> Self {
        if !active {
            ClusterState::Deleted
        } else if is_virtual {
            ClusterState::Virtual
        } else if error_in_connecting.is_empty() {
            ClusterState::Reachable
        } else {
            ClusterState::NotReachable
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ClusterState::Reachable | ClusterState::NotReachable | ClusterState::Virtual
        )
    }

    /// Applies an event, returning `None` when the transition isn't allowed.
    pub fn next(self, event: &ClusterStateEvent) -> Option<ClusterState> {
        use ClusterState as S;
        use ClusterStateEvent as E;
        match (self, event) {
            (S::Deleted, _) => None,
            (S::Virtual, E::Probed(_)) => Some(S::Virtual),
            (_, E::MarkedVirtual) => Some(S::Virtual),
            (S::Unregistered | S::Reachable | S::NotReachable, E::ValidationStarted) => {
                Some(S::Validating)
            }
            (S::Validating, E::Validated(None)) => Some(S::Reachable),
            // a failed registration never leaves the unregistered state
            (S::Validating, E::Validated(Some(_))) => Some(S::Unregistered),
            (S::Reachable | S::NotReachable, E::Probed(err)) => {
                if err.is_empty() {
                    Some(S::Reachable)
                } else {
                    Some(S::NotReachable)
                }
            }
            (S::Reachable | S::NotReachable | S::Virtual, E::Deleted) => Some(S::Deleted),
            _ => None,
        }
    }
}
