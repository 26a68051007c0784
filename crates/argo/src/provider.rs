use std::sync::Arc;

use async_trait::async_trait;
use devplane_common::{
    argo::ArgoManagedResource,
    tree::{ApplicationCondition, ApplicationTree, HealthStatus, ResourceTreeResponse, SHARED_RESOURCE_WARNING},
};
use devplane_rpc::{
    argocd::ArgoCdClient,
    error::ApiError,
    helm_app::{ClusterConfig, ExternalResourceDetail, ExternalResourceTreeRequest, HelmAppClient},
};
use serde_json::Value;
use tracing::{error, warn};

use crate::{
    manifest::{ArgoCdManifestSource, KubeManifestSource},
    resolver::Destination,
    tree::enrich_tree,
    value::{array_at, str_at},
};

#[cfg(test)]
use mockall::automock;

const UNKNOWN_STATUS: &str = "Unknown";
const DEGRADED_STATUS: &str = "Degraded";

/// Everything needed to build the resource tree of one Argo application.
#[derive(Debug, Clone)]
pub struct TreeRequest {
    pub app_name: String,
    pub app_namespace: String,
    pub destination: Destination,
    pub resources: Vec<ArgoManagedResource>,
    /// The `Application` object as read from its cluster.
    pub application: Value,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceTreeProvider: Send + Sync {
    async fn resource_tree(&self, request: &TreeRequest) -> Result<ResourceTreeResponse, ApiError>;
}

/// Fills nodes without health from `status.resources[*].health`.
pub fn backfill_health(tree: &mut ApplicationTree, application: &Value) {
    let resources = array_at(application, &["status", "resources"]);
    if resources.is_empty() {
        return;
    }
    for node in tree.nodes.iter_mut().filter(|n| n.health.is_none()) {
        let matching = resources.iter().find(|r| {
            str_at(r, &["group"]) == node.group
                && str_at(r, &["version"]) == node.version
                && str_at(r, &["kind"]) == node.kind
                && str_at(r, &["name"]) == node.name
                && str_at(r, &["namespace"]) == node.namespace
        });
        if let Some(health) = matching.and_then(|r| r.get("health")) {
            node.health = Some(HealthStatus {
                status: str_at(health, &["status"]).to_string(),
                message: str_at(health, &["message"]).to_string(),
            });
        }
    }
}

/// Copies application level status onto the tree response: overall health,
/// conditions, per-resource sync messages and the synced revision.
pub fn apply_application_status(resp: &mut ResourceTreeResponse, application: Option<&Value>) {
    let Some(application) = application else {
        resp.status = UNKNOWN_STATUS.to_string();
        return;
    };

    backfill_health(&mut resp.tree, application);
    resp.revision_hash = str_at(application, &["status", "sync", "revision"]).to_string();
    resp.conditions = array_at(application, &["status", "conditions"])
        .iter()
        .map(|c| ApplicationCondition {
            type_: str_at(c, &["type"]).to_string(),
            message: str_at(c, &["message"]).to_string(),
        })
        .collect();
    resp.resources_sync_result_map = array_at(
        application,
        &["status", "operationState", "syncResult", "resources"],
    )
    .iter()
    .filter(|r| !r.is_null())
    .map(|r| {
        (
            format!("{}/{}", str_at(r, &["kind"]), str_at(r, &["name"])),
            str_at(r, &["message"]).to_string(),
        )
    })
    .collect();

    let mut status = str_at(application, &["status", "health", "status"]).to_string();
    if resp
        .conditions
        .iter()
        .any(|c| c.type_ != SHARED_RESOURCE_WARNING)
    {
        status = DEGRADED_STATUS.to_string();
    }
    if status.is_empty() {
        status = UNKNOWN_STATUS.to_string();
    }
    resp.status = status;
}

/// Gets the tree from the Helm-App service and reads manifests from the
/// destination cluster.
#[derive(Clone)]
pub struct HelmTreeProvider {
    helm: Arc<dyn HelmAppClient>,
}

impl HelmTreeProvider {
    pub fn new(helm: Arc<dyn HelmAppClient>) -> Self {
        Self { helm }
    }
}

pub fn external_resource_tree_request(request: &TreeRequest) -> ExternalResourceTreeRequest {
    ExternalResourceTreeRequest {
        cluster_config: Some(ClusterConfig::from(&request.destination.connection)),
        external_resource_detail: request
            .resources
            .iter()
            .map(|r| ExternalResourceDetail {
                group: r.group.clone(),
                kind: r.kind.clone(),
                version: r.version.clone(),
                name: r.name.clone(),
                namespace: r.namespace.clone(),
            })
            .collect(),
    }
}

#[async_trait]
impl ResourceTreeProvider for HelmTreeProvider {
    async fn resource_tree(&self, request: &TreeRequest) -> Result<ResourceTreeResponse, ApiError> {
        let tree = self
            .helm
            .get_resource_tree_for_external_resources(external_resource_tree_request(request))
            .await
            .map_err(|e| {
                error!(
                    app = request.app_name.as_str(),
                    cluster_id = request.destination.cluster_id,
                    error = ?e,
                    "failed to get resource tree for external resources"
                );
                ApiError::upstream(e.to_string())
            })?;

        let source = KubeManifestSource::new(&request.destination.connection)
            .map_err(|e| ApiError::upstream(format!("{e:#}")))?;
        let mut resp = enrich_tree(&source, tree).await;
        apply_application_status(&mut resp, Some(&request.application));
        Ok(resp)
    }
}

/// Reads the tree and manifests from a live Argo CD server. Applications
/// Argo CD doesn't know about are handed to `fallback`.
#[derive(Clone)]
pub struct ArgoCdTreeProvider {
    argocd: Arc<dyn ArgoCdClient>,
    fallback: Arc<dyn ResourceTreeProvider>,
}

impl ArgoCdTreeProvider {
    pub fn new(argocd: Arc<dyn ArgoCdClient>, fallback: Arc<dyn ResourceTreeProvider>) -> Self {
        Self { argocd, fallback }
    }
}

#[async_trait]
impl ResourceTreeProvider for ArgoCdTreeProvider {
    async fn resource_tree(&self, request: &TreeRequest) -> Result<ResourceTreeResponse, ApiError> {
        let app_namespace = Some(request.app_namespace.clone()).filter(|ns| !ns.is_empty());
        let tree = match self
            .argocd
            .resource_tree(&request.app_name, app_namespace.clone())
            .await
        {
            Ok(tree) => tree,
            Err(e) => {
                warn!(
                    app = request.app_name.as_str(),
                    error = ?e,
                    "argocd resource tree unavailable, falling back"
                );
                return self.fallback.resource_tree(request).await;
            }
        };

        let source = ArgoCdManifestSource::new(
            self.argocd.clone(),
            request.app_name.clone(),
            app_namespace.clone(),
        );
        let mut resp = enrich_tree(&source, tree).await;

        // the object Argo CD serves is fresher than the one read from the cluster
        let application = match self
            .argocd
            .get_application(&request.app_name, app_namespace)
            .await
        {
            Ok(app) => app,
            Err(e) => {
                warn!(app = request.app_name.as_str(), error = ?e, "failed to get application from argocd");
                request.application.clone()
            }
        };
        apply_application_status(&mut resp, Some(&application));
        Ok(resp)
    }
}
