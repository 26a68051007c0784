//! Client for the Helm-App gRPC side-car (`ApplicationService`).
//!
//! Messages are declared with `prost` derives directly so the crate builds
//! without `protoc`.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use devplane_common::{
    cluster::ClusterConnectionConfig,
    tree::{ApplicationTree, HealthStatus, NetworkingInfo, ResourceNode, ResourceRef},
};
use tonic::{
    codegen::http::uri::PathAndQuery,
    transport::{Channel, Endpoint},
};

#[cfg(test)]
use mockall::automock;

#[derive(Debug, thiserror::Error)]
pub enum HelmAppError {
    #[error("invalid helm app service url: {0}")]
    InvalidUrl(String),
    #[error("helm app service is not ready: {0}")]
    NotReady(String),
    #[error("helm app service returned {code:?}: {message}")]
    Status {
        code: tonic::Code,
        message: String,
    },
}

impl From<tonic::Status> for HelmAppError {
    fn from(status: tonic::Status) -> Self {
        HelmAppError::Status {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
#[prost(skip_debug)]
pub struct ClusterConfig {
    #[prost(string, tag = "1")]
    pub api_server_url: String,
    #[prost(string, tag = "2")]
    pub token: String,
    #[prost(int32, tag = "3")]
    pub cluster_id: i32,
    #[prost(string, tag = "4")]
    pub cluster_name: String,
    #[prost(bool, tag = "5")]
    pub insecure_skip_tls_verify: bool,
    #[prost(string, tag = "6")]
    pub key_data: String,
    #[prost(string, tag = "7")]
    pub cert_data: String,
    #[prost(string, tag = "8")]
    pub ca_data: String,
}

impl From<&ClusterConnectionConfig> for ClusterConfig {
    fn from(conn: &ClusterConnectionConfig) -> Self {
        ClusterConfig {
            api_server_url: conn.server_url.clone(),
            token: conn.bearer_token.clone().unwrap_or_default(),
            cluster_id: conn.cluster_id,
            cluster_name: conn.cluster_name.clone(),
            insecure_skip_tls_verify: conn.insecure_skip_tls_verify,
            key_data: conn.key_data.clone().unwrap_or_default(),
            cert_data: conn.cert_data.clone().unwrap_or_default(),
            ca_data: conn.ca_data.clone().unwrap_or_default(),
        }
    }
}

// Debug is hand written so tokens never reach the logs.
impl std::fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("api_server_url", &self.api_server_url)
            .field("cluster_id", &self.cluster_id)
            .field("cluster_name", &self.cluster_name)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ReleaseIdentifier {
    #[prost(message, optional, tag = "1")]
    pub cluster_config: Option<ClusterConfig>,
    #[prost(string, tag = "2")]
    pub release_name: String,
    #[prost(string, tag = "3")]
    pub release_namespace: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ChartRepository {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub url: String,
    #[prost(string, tag = "3")]
    pub username: String,
    #[prost(string, tag = "4")]
    pub password: String,
    #[prost(bool, tag = "5")]
    pub allow_insecure_connection: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InstallReleaseRequest {
    #[prost(message, optional, tag = "1")]
    pub release_identifier: Option<ReleaseIdentifier>,
    #[prost(string, tag = "2")]
    pub chart_name: String,
    #[prost(string, tag = "3")]
    pub chart_version: String,
    #[prost(string, tag = "4")]
    pub values_yaml: String,
    #[prost(message, optional, tag = "5")]
    pub chart_repository: Option<ChartRepository>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InstallReleaseResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpgradeReleaseResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BooleanResponse {
    #[prost(bool, tag = "1")]
    pub result: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ExternalResourceDetail {
    #[prost(string, tag = "1")]
    pub group: String,
    #[prost(string, tag = "2")]
    pub kind: String,
    #[prost(string, tag = "3")]
    pub version: String,
    #[prost(string, tag = "4")]
    pub name: String,
    #[prost(string, tag = "5")]
    pub namespace: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ExternalResourceTreeRequest {
    #[prost(message, optional, tag = "1")]
    pub cluster_config: Option<ClusterConfig>,
    #[prost(message, repeated, tag = "2")]
    pub external_resource_detail: Vec<ExternalResourceDetail>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtoResourceRef {
    #[prost(string, tag = "1")]
    pub group: String,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(string, tag = "3")]
    pub kind: String,
    #[prost(string, tag = "4")]
    pub namespace: String,
    #[prost(string, tag = "5")]
    pub name: String,
    #[prost(string, tag = "6")]
    pub uid: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtoHealthStatus {
    #[prost(string, tag = "1")]
    pub status: String,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtoNetworkingInfo {
    #[prost(map = "string, string", tag = "1")]
    pub labels: HashMap<String, String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtoResourceNode {
    #[prost(string, tag = "1")]
    pub group: String,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(string, tag = "3")]
    pub kind: String,
    #[prost(string, tag = "4")]
    pub namespace: String,
    #[prost(string, tag = "5")]
    pub name: String,
    #[prost(string, tag = "6")]
    pub uid: String,
    #[prost(message, repeated, tag = "7")]
    pub parent_refs: Vec<ProtoResourceRef>,
    #[prost(message, optional, tag = "8")]
    pub networking_info: Option<ProtoNetworkingInfo>,
    #[prost(string, tag = "9")]
    pub resource_version: String,
    #[prost(message, optional, tag = "10")]
    pub health: Option<ProtoHealthStatus>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtoResourceTreeResponse {
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<ProtoResourceNode>,
}

impl From<ProtoResourceRef> for ResourceRef {
    fn from(r: ProtoResourceRef) -> Self {
        ResourceRef {
            group: r.group,
            version: r.version,
            kind: r.kind,
            namespace: r.namespace,
            name: r.name,
            uid: r.uid,
        }
    }
}

impl From<ProtoResourceNode> for ResourceNode {
    fn from(n: ProtoResourceNode) -> Self {
        ResourceNode {
            group: n.group,
            version: n.version,
            kind: n.kind,
            namespace: n.namespace,
            name: n.name,
            uid: n.uid,
            parent_refs: n.parent_refs.into_iter().map(ResourceRef::from).collect(),
            health: n.health.map(|h| HealthStatus {
                status: h.status,
                message: h.message,
            }),
            networking_info: n.networking_info.map(|info| NetworkingInfo {
                labels: info.labels.into_iter().collect(),
                ..Default::default()
            }),
            resource_version: n.resource_version,
        }
    }
}

impl From<ProtoResourceTreeResponse> for ApplicationTree {
    fn from(resp: ProtoResourceTreeResponse) -> Self {
        ApplicationTree {
            nodes: resp.nodes.into_iter().map(ResourceNode::from).collect(),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait HelmAppClient: Send + Sync {
    async fn install_release(&self, req: InstallReleaseRequest) -> Result<bool, HelmAppError>;

    async fn update_application_with_chart_info(
        &self,
        req: InstallReleaseRequest,
    ) -> Result<bool, HelmAppError>;

    async fn is_release_installed(&self, req: ReleaseIdentifier) -> Result<bool, HelmAppError>;

    async fn get_resource_tree_for_external_resources(
        &self,
        req: ExternalResourceTreeRequest,
    ) -> Result<ApplicationTree, HelmAppError>;
}

const INSTALL_RELEASE: &str = "/ApplicationService/InstallRelease";
const UPDATE_WITH_CHART_INFO: &str = "/ApplicationService/UpdateApplicationWithChartInfo";
const IS_RELEASE_INSTALLED: &str = "/ApplicationService/IsReleaseInstalled";
const RESOURCE_TREE_FOR_EXTERNAL: &str = "/ApplicationService/GetResourceTreeForExternalResources";

#[derive(Clone)]
pub struct GrpcHelmAppClient {
    channel: Channel,
    timeout: Duration,
}

impl GrpcHelmAppClient {
    /// The connection is established on first use.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, HelmAppError> {
        let channel = Endpoint::from_shared(url.to_string())
            .map_err(|e| HelmAppError::InvalidUrl(e.to_string()))?
            .connect_timeout(Duration::from_secs(5))
            .connect_lazy();
        Ok(Self { channel, timeout })
    }

    async fn unary<Req, Resp>(&self, path: &'static str, req: Req) -> Result<Resp, HelmAppError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| HelmAppError::NotReady(e.to_string()))?;
        let codec = tonic::codec::ProstCodec::<Req, Resp>::default();
        let mut request = tonic::Request::new(req);
        request.set_timeout(self.timeout);
        let resp = grpc
            .unary(request, PathAndQuery::from_static(path), codec)
            .await?;
        Ok(resp.into_inner())
    }
}

#[async_trait]
impl HelmAppClient for GrpcHelmAppClient {
    async fn install_release(&self, req: InstallReleaseRequest) -> Result<bool, HelmAppError> {
        let resp: InstallReleaseResponse = self.unary(INSTALL_RELEASE, req).await?;
        Ok(resp.success)
    }

    async fn update_application_with_chart_info(
        &self,
        req: InstallReleaseRequest,
    ) -> Result<bool, HelmAppError> {
        let resp: UpgradeReleaseResponse = self.unary(UPDATE_WITH_CHART_INFO, req).await?;
        Ok(resp.success)
    }

    async fn is_release_installed(&self, req: ReleaseIdentifier) -> Result<bool, HelmAppError> {
        let resp: BooleanResponse = self.unary(IS_RELEASE_INSTALLED, req).await?;
        Ok(resp.result)
    }

    async fn get_resource_tree_for_external_resources(
        &self,
        req: ExternalResourceTreeRequest,
    ) -> Result<ApplicationTree, HelmAppError> {
        let resp: ProtoResourceTreeResponse = self.unary(RESOURCE_TREE_FOR_EXTERNAL, req).await?;
        Ok(resp.into())
    }
}
