use std::sync::Arc;

use async_trait::async_trait;
use devplane_argo::locator::ArgoAppLocator;
use devplane_db::api::DbApi;
use devplane_kube::{
    argocd_repo::GitOpsRepoSync,
    chart_sync::ChartSyncTrigger,
    events::ClusterEventPublisher,
    informer::NamespaceInformerFactory,
    prober::{ClusterConnectivity, ConnectionStatusStore},
};
use devplane_rpc::helm_app::HelmAppClient;

use crate::cluster_access::ClusterAccess;

mod argo;
mod chart_repo;
mod cluster;
mod environment;
mod webhook_helm;

pub use chart_repo::validate_chart_repo;

/// The services behind the REST surface. Every cluster facing call goes
/// through one of the trait objects so they can be swapped in tests.
#[derive(Clone)]
pub struct Controller {
    pub db: DbApi,
    pub connectivity: Arc<dyn ClusterConnectivity>,
    pub access: Arc<dyn ClusterAccess>,
    pub events: Arc<dyn ClusterEventPublisher>,
    pub informers: NamespaceInformerFactory,
    pub argo: ArgoAppLocator,
    pub repo_sync: Arc<dyn GitOpsRepoSync>,
    pub chart_sync: Arc<dyn ChartSyncTrigger>,
    pub helm: Arc<dyn HelmAppClient>,
    pub http: reqwest::Client,
}

/// Writes probe results onto the cluster rows.
#[derive(Clone)]
pub struct DbStatusStore(pub DbApi);

#[async_trait]
impl ConnectionStatusStore for DbStatusStore {
    async fn set_connection_error(&self, cluster_id: i32, error: &str) -> anyhow::Result<()> {
        self.0.update_cluster_connection_error(cluster_id, error).await
    }
}

#[cfg(test)]
pub(crate) mod tests;
