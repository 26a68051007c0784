use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use devplane_common::cluster::ClusterConnectionConfig;
use devplane_kube::{
    client::{build_client, server_version},
    namespace::ensure_namespace,
};

#[cfg(test)]
use mockall::automock;

/// Calls made against a registered cluster outside of probing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterAccess: Send + Sync {
    async fn server_version(&self, conn: &ClusterConnectionConfig) -> Result<String>;

    /// Returns whether the namespace had to be created.
    async fn ensure_namespace(&self, conn: &ClusterConnectionConfig, namespace: &str)
        -> Result<bool>;
}

#[derive(Clone)]
pub struct KubeClusterAccess {
    timeout: Duration,
}

impl KubeClusterAccess {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ClusterAccess for KubeClusterAccess {
    async fn server_version(&self, conn: &ClusterConnectionConfig) -> Result<String> {
        let client = build_client(conn, self.timeout)?;
        server_version(&client).await
    }

    async fn ensure_namespace(
        &self,
        conn: &ClusterConnectionConfig,
        namespace: &str,
    ) -> Result<bool> {
        let client = build_client(conn, self.timeout)?;
        ensure_namespace(&client, namespace).await
    }
}
