use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use devplane_common::{
    argo::{
        ArgoAppDetail, ArgoAppListEntry, ArgoManagedResource, ArgoManagedResourceResponse,
        ARGO_APPLICATION_KIND, ARGO_APPLICATION_PLURAL, ARGO_GROUP, ARGO_VERSION,
    },
    cluster::{ClusterBean, ClusterConnectionConfig},
};
use devplane_kube::client::build_client;
use devplane_rpc::error::ApiError;
use futures::future::join_all;
use kube::{
    api::{ApiResource, DynamicObject, GroupVersionKind},
    Api,
};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{
    lookup::ClusterLookup,
    provider::{ResourceTreeProvider, TreeRequest},
    resolver::DestinationResolver,
    value::{array_at, str_at, Table},
};

#[cfg(test)]
use mockall::automock;

const TABLE_ACCEPT: &str = "application/json;as=Table;v=v1;g=meta.k8s.io,application/json";
const NAME_COLUMN: &str = "Name";
const SYNC_STATUS_COLUMN: &str = "Sync Status";
const HEALTH_STATUS_COLUMN: &str = "Health Status";

fn application_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(ARGO_GROUP, ARGO_VERSION, ARGO_APPLICATION_KIND),
        ARGO_APPLICATION_PLURAL,
    )
}

/// Access to `Application` objects in one cluster.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArgoApplicationApi: Send + Sync {
    /// `None` when the object doesn't exist.
    async fn get_application(
        &self,
        conn: &ClusterConnectionConfig,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>>;

    /// Every application of the cluster in table form. `None` when the
    /// cluster doesn't serve the `Application` resource.
    async fn list_applications(&self, conn: &ClusterConnectionConfig) -> Result<Option<Value>>;
}

#[derive(Clone)]
pub struct KubeArgoApplicationApi {
    timeout: Duration,
}

impl KubeArgoApplicationApi {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ArgoApplicationApi for KubeArgoApplicationApi {
    async fn get_application(
        &self,
        conn: &ClusterConnectionConfig,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>> {
        let client = build_client(conn, self.timeout)?;
        let api: Api<DynamicObject> =
            Api::namespaced_with(client, namespace, &application_resource());
        let object = api.get_opt(name).await?;
        Ok(object.map(serde_json::to_value).transpose()?)
    }

    async fn list_applications(&self, conn: &ClusterConnectionConfig) -> Result<Option<Value>> {
        let client = build_client(conn, self.timeout)?;
        let path = format!("/apis/{ARGO_GROUP}/{ARGO_VERSION}/{ARGO_APPLICATION_PLURAL}");
        let request = http::Request::get(path)
            .header(http::header::ACCEPT, TABLE_ACCEPT)
            .body(Vec::new())?;
        match client.request::<Value>(request).await {
            Ok(table) => Ok(Some(table)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Health, sync, destination and managed resources of an `Application`.
pub fn managed_resources(application: &Value) -> ArgoManagedResourceResponse {
    ArgoManagedResourceResponse {
        health_status: str_at(application, &["status", "health", "status"]).to_string(),
        sync_status: str_at(application, &["status", "sync", "status"]).to_string(),
        destination_server: str_at(application, &["spec", "destination", "server"]).to_string(),
        resources: array_at(application, &["status", "resources"])
            .iter()
            .map(|r| ArgoManagedResource {
                group: str_at(r, &["group"]).to_string(),
                kind: str_at(r, &["kind"]).to_string(),
                version: str_at(r, &["version"]).to_string(),
                name: str_at(r, &["name"]).to_string(),
                namespace: str_at(r, &["namespace"]).to_string(),
            })
            .collect(),
    }
}

/// List entries from an application table of `cluster`.
pub fn list_entries(cluster: &ClusterBean, table: &Value) -> Vec<ArgoAppListEntry> {
    let table = Table::parse(table);
    table
        .rows
        .iter()
        .map(|row| ArgoAppListEntry {
            app_name: table.cell(row, NAME_COLUMN).to_string(),
            cluster_id: cluster.id,
            cluster_name: cluster.cluster_name.clone(),
            namespace: row.namespace.clone(),
            app_status: table.cell(row, HEALTH_STATUS_COLUMN).to_string(),
            sync_status: table.cell(row, SYNC_STATUS_COLUMN).to_string(),
        })
        .collect()
}

/// Finds Argo applications across registered clusters and assembles their
/// details.
#[derive(Clone)]
pub struct ArgoAppLocator {
    clusters: Arc<dyn ClusterLookup>,
    applications: Arc<dyn ArgoApplicationApi>,
    resolver: DestinationResolver,
    trees: Arc<dyn ResourceTreeProvider>,
}

impl ArgoAppLocator {
    pub fn new(
        clusters: Arc<dyn ClusterLookup>,
        applications: Arc<dyn ArgoApplicationApi>,
        resolver: DestinationResolver,
        trees: Arc<dyn ResourceTreeProvider>,
    ) -> Self {
        Self {
            clusters,
            applications,
            resolver,
            trees,
        }
    }

    /// Applications of the given clusters, or of every active cluster.
    /// Clusters that are virtual, unreachable or without Argo CD are skipped.
    pub async fn list_applications(
        &self,
        cluster_ids: Option<Vec<i32>>,
    ) -> Result<Vec<ArgoAppListEntry>, ApiError> {
        let clusters = match cluster_ids.filter(|ids| !ids.is_empty()) {
            Some(ids) => self.clusters.clusters_by_ids(ids).await?,
            None => self.clusters.active_clusters().await?,
        };

        let listings = clusters
            .iter()
            .filter(|c| !c.is_virtual_cluster && c.error_in_connecting.is_empty())
            .map(|cluster| async move {
                match self
                    .applications
                    .list_applications(&cluster.connection_config())
                    .await
                {
                    Ok(Some(table)) => list_entries(cluster, &table),
                    Ok(None) => {
                        debug!(cluster_id = cluster.id, "argo applications not served, skipping");
                        Vec::new()
                    }
                    Err(err) => {
                        warn!(
                            cluster_id = cluster.id,
                            cluster_name = cluster.cluster_name.as_str(),
                            error = ?err,
                            "failed to list argo applications"
                        );
                        Vec::new()
                    }
                }
            });
        Ok(join_all(listings).await.into_iter().flatten().collect())
    }

    /// Detail of the application `name` in `namespace` of cluster
    /// `cluster_id`, including the resource tree of its workloads.
    pub async fn get_app_detail(
        &self,
        name: &str,
        namespace: &str,
        cluster_id: i32,
    ) -> Result<ArgoAppDetail, ApiError> {
        let cluster = self
            .clusters
            .get_cluster(cluster_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("cluster {cluster_id} not found")))?;

        let mut detail = ArgoAppDetail {
            app_name: name.to_string(),
            cluster_id,
            cluster_name: cluster.cluster_name.clone(),
            namespace: namespace.to_string(),
            ..Default::default()
        };
        if cluster.is_virtual_cluster {
            return Ok(detail);
        }
        if !cluster.error_in_connecting.is_empty() {
            return Err(ApiError::not_reachable(&cluster.error_in_connecting));
        }

        let application = self
            .applications
            .get_application(&cluster.connection_config(), namespace, name)
            .await
            .map_err(|e| {
                error!(cluster_id, app = name, error = ?e, "failed to get argo application");
                ApiError::upstream(format!("{e:#}"))
            })?
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "argo application {name} not found in namespace {namespace}"
                ))
            })?;

        let managed = managed_resources(&application);
        detail.app_status = managed.health_status.clone();
        detail.sync_status = managed.sync_status.clone();
        detail.destination_server = managed.destination_server.clone();

        match self
            .resolver
            .resolve(&cluster, &managed.destination_server)
            .await?
        {
            Some(destination) => {
                let request = TreeRequest {
                    app_name: name.to_string(),
                    app_namespace: namespace.to_string(),
                    destination,
                    resources: managed.resources,
                    application: application.clone(),
                };
                detail.resource_tree = Some(self.trees.resource_tree(&request).await?);
            }
            None => {
                debug!(
                    app = name,
                    destination = managed.destination_server.as_str(),
                    "destination cluster unknown, no resource tree"
                );
            }
        }
        detail.manifest = Some(application);
        Ok(detail)
    }
}

#[cfg(test)]
mod tests;
