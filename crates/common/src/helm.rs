use serde::{Deserialize, Serialize};

pub const DEFAULT_RELEASE_NAMESPACE: &str = "default";

fn default_namespace() -> String {
    DEFAULT_RELEASE_NAMESPACE.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRepoIdentifier {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub allow_insecure_connection: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRepoRef {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<ChartRepoIdentifier>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRef {
    #[serde(default)]
    pub chart_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_version: Option<String>,
    #[serde(default)]
    pub repo: ChartRepoRef,
}

/// Payload of the webhook that installs or upgrades a helm release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmAppCreateUpdateRequest {
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub release_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_override_yaml: Option<String>,
    #[serde(default)]
    pub chart: ChartRef,
}

impl HelmAppCreateUpdateRequest {
    /// Names of the required fields left empty, in payload order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.cluster_name.trim().is_empty() {
            missing.push("clusterName");
        }
        if self.release_name.trim().is_empty() {
            missing.push("releaseName");
        }
        if self.chart.chart_name.trim().is_empty() {
            missing.push("chart.chartName");
        }
        if self.chart.repo.name.trim().is_empty() {
            missing.push("chart.repo.name");
        }
        missing
    }

    pub fn namespace(&self) -> &str {
        if self.namespace.is_empty() {
            DEFAULT_RELEASE_NAMESPACE
        } else {
            &self.namespace
        }
    }
}

/// `<hostUrl>/orchestrator/application/app?appId=<appId>`
pub fn app_detail_url(host_url: &str, encoded_app_id: &str) -> String {
    format!(
        "{}/orchestrator/application/app?appId={encoded_app_id}",
        host_url.trim_end_matches('/')
    )
}
