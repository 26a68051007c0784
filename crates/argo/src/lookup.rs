use anyhow::Result;
use async_trait::async_trait;
use devplane_common::cluster::ClusterBean;
use devplane_db::{api::DbApi, cluster_bean};

#[cfg(test)]
use mockall::automock;

/// Registered clusters, as seen by the Argo integration.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterLookup: Send + Sync {
    async fn get_cluster(&self, id: i32) -> Result<Option<ClusterBean>>;

    async fn active_clusters(&self) -> Result<Vec<ClusterBean>>;

    async fn clusters_by_ids(&self, ids: Vec<i32>) -> Result<Vec<ClusterBean>>;
}

#[async_trait]
impl ClusterLookup for DbApi {
    async fn get_cluster(&self, id: i32) -> Result<Option<ClusterBean>> {
        let cluster = DbApi::get_cluster(self, id).await?;
        Ok(cluster.as_ref().map(cluster_bean))
    }

    async fn active_clusters(&self) -> Result<Vec<ClusterBean>> {
        let clusters = self.get_all_active_clusters().await?;
        Ok(clusters.iter().map(cluster_bean).collect())
    }

    async fn clusters_by_ids(&self, ids: Vec<i32>) -> Result<Vec<ClusterBean>> {
        let clusters = self.get_clusters_by_ids(&ids).await?;
        Ok(clusters.iter().map(cluster_bean).collect())
    }
}
