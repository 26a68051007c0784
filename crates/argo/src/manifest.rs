use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use devplane_common::{cluster::ClusterConnectionConfig, tree::ResourceRef};
use devplane_kube::client::build_client;
use devplane_rpc::argocd::{ArgoCdClient, ResourceQuery};
use kube::{
    api::{ApiResource, DynamicObject, GroupVersionKind},
    Api,
};
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

/// Per-request timeout of a manifest fetch.
pub const MANIFEST_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Live manifests of the resources of one application.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn get_manifest(&self, resource: &ResourceRef) -> Result<Value>;
}

/// Reads manifests straight from the cluster the application runs in.
#[derive(Clone)]
pub struct KubeManifestSource {
    client: kube::Client,
}

impl KubeManifestSource {
    pub fn new(conn: &ClusterConnectionConfig) -> Result<Self> {
        let client = build_client(conn, MANIFEST_FETCH_TIMEOUT)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ManifestSource for KubeManifestSource {
    async fn get_manifest(&self, resource: &ResourceRef) -> Result<Value> {
        let gvk = GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind);
        let ar = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> = if resource.namespace.is_empty() {
            Api::all_with(self.client.clone(), &ar)
        } else {
            Api::namespaced_with(self.client.clone(), &resource.namespace, &ar)
        };
        let object = api.get_opt(&resource.name).await?.ok_or_else(|| {
            anyhow!("{} {}/{} not found", resource.kind, resource.namespace, resource.name)
        })?;
        Ok(serde_json::to_value(object)?)
    }
}

/// Reads manifests through the Argo CD API, scoped to one application.
#[derive(Clone)]
pub struct ArgoCdManifestSource {
    client: Arc<dyn ArgoCdClient>,
    app_name: String,
    app_namespace: Option<String>,
}

impl ArgoCdManifestSource {
    pub fn new(
        client: Arc<dyn ArgoCdClient>,
        app_name: impl Into<String>,
        app_namespace: Option<String>,
    ) -> Self {
        Self {
            client,
            app_name: app_name.into(),
            app_namespace,
        }
    }
}

#[async_trait]
impl ManifestSource for ArgoCdManifestSource {
    async fn get_manifest(&self, resource: &ResourceRef) -> Result<Value> {
        let query = ResourceQuery {
            app_name: self.app_name.clone(),
            app_namespace: self.app_namespace.clone(),
            group: resource.group.clone(),
            version: resource.version.clone(),
            kind: resource.kind.clone(),
            namespace: resource.namespace.clone(),
            resource_name: resource.name.clone(),
        };
        Ok(self.client.get_resource(&query).await?)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn deployment_ref() -> ResourceRef {
        ResourceRef {
            group: "apps".to_string(),
            version: "v1".to_string(),
            kind: "Deployment".to_string(),
            namespace: "shop".to_string(),
            name: "web".to_string(),
            uid: String::new(),
        }
    }

    #[tokio::test]
    async fn kube_source_reads_namespaced_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apis/apps/v1/namespaces/shop/deployments/web"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"apiVersion":"apps/v1","kind":"Deployment","metadata":{"name":"web","namespace":"shop"},"status":{"collisionCount":2}}"#,
            ))
            .mount(&server)
            .await;

        let source = KubeManifestSource::new(&ClusterConnectionConfig {
            server_url: server.uri(),
            insecure_skip_tls_verify: true,
            ..Default::default()
        })
        .unwrap();
        let manifest = source.get_manifest(&deployment_ref()).await.unwrap();
        assert_eq!(manifest["metadata"]["name"], "web");
        assert_eq!(manifest["status"]["collisionCount"], 2);
    }

    #[tokio::test]
    async fn kube_source_reports_missing_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"not found","reason":"NotFound","code":404}"#,
            ))
            .mount(&server)
            .await;

        let source = KubeManifestSource::new(&ClusterConnectionConfig {
            server_url: server.uri(),
            insecure_skip_tls_verify: true,
            ..Default::default()
        })
        .unwrap();
        assert!(source.get_manifest(&deployment_ref()).await.is_err());
    }
}
