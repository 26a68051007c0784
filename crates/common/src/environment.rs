use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentBean {
    #[serde(default)]
    pub id: i32,
    #[serde(rename = "environment_name", default)]
    pub environment_name: String,
    #[serde(default)]
    pub cluster_id: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "environmentIdentifier", default)]
    pub environment_identifier: String,
}

/// `<clusterName>__<namespace>`, the key used for environment ACLs.
pub fn environment_identifier(cluster_name: &str, namespace: &str) -> String {
    format!("{cluster_name}__{namespace}")
}
