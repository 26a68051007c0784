use serde::{Deserialize, Serialize};

use crate::tree::ResourceTreeResponse;

pub const ARGO_GROUP: &str = "argoproj.io";
pub const ARGO_VERSION: &str = "v1alpha1";
pub const ARGO_APPLICATION_KIND: &str = "Application";
pub const ARGO_APPLICATION_PLURAL: &str = "applications";

pub const ARGO_SECRET_TYPE_LABEL: &str = "argocd.argoproj.io/secret-type";
pub const ARGO_SECRET_TYPE_CLUSTER: &str = "cluster";
pub const ARGO_SECRET_TYPE_REPOSITORY: &str = "repository";

/// A resource Argo CD manages for an application, read from
/// `status.resources[*]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArgoManagedResource {
    pub group: String,
    pub kind: String,
    pub version: String,
    pub name: String,
    pub namespace: String,
}

/// Fields the locator extracts from an `Application` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArgoManagedResourceResponse {
    pub health_status: String,
    pub sync_status: String,
    pub destination_server: String,
    pub resources: Vec<ArgoManagedResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArgoAppListEntry {
    pub app_name: String,
    pub cluster_id: i32,
    pub cluster_name: String,
    pub namespace: String,
    pub app_status: String,
    pub sync_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArgoAppDetail {
    pub app_name: String,
    pub cluster_id: i32,
    pub cluster_name: String,
    pub namespace: String,
    pub app_status: String,
    pub sync_status: String,
    pub destination_server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_tree: Option<ResourceTreeResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArgoTlsClientConfig {
    pub insecure: bool,
    pub key_data: String,
    pub cert_data: String,
    pub ca_data: String,
}

/// The `config` key of an Argo CD cluster secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArgoClusterSecretConfig {
    pub bearer_token: String,
    pub tls_client_config: ArgoTlsClientConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_secret_config_decodes_argo_shape() {
        let raw = r#"{"bearerToken":"abc","tlsClientConfig":{"insecure":true,"caData":"Y2E="}}"#;
        let config: ArgoClusterSecretConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.bearer_token, "abc");
        assert!(config.tls_client_config.insecure);
        assert_eq!(config.tls_client_config.ca_data, "Y2E=");
        assert_eq!(config.tls_client_config.key_data, "");
    }
}
