use std::{collections::BTreeMap, collections::HashMap, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use devplane_argo::{
    locator::{ArgoAppLocator, ArgoApplicationApi},
    provider::{ResourceTreeProvider, TreeRequest},
    resolver::{ClusterSecretSource, DestinationResolver},
};
use devplane_common::{
    chart_repo::{
        ChartRepoDto, DUPLICATE_REPO_MSG, INVALID_AUTH_MSG, INVALID_NAME_MSG,
        NON_LOWERCASE_NAME_MSG,
    },
    cluster::{
        virtual_cluster_error, ClusterBean, ClusterConnectionConfig, ClusterModifyAction,
        ClusterState, BEARER_TOKEN, CLUSTER_ALREADY_EXISTS,
    },
    environment::EnvironmentBean,
    helm::{ChartRef, ChartRepoIdentifier, ChartRepoRef, HelmAppCreateUpdateRequest},
    tree::{ApplicationTree, ResourceTreeResponse},
    DEFAULT_CLUSTER, HOST_URL_CONFIG_KEY,
};
use devplane_db::api::DbApi;
use devplane_kube::{
    argocd_repo::GitOpsRepoSync, chart_sync::ChartSyncTrigger, events::ClusterEventPublisher,
    informer::NamespaceInformerFactory, kubeconfig::RESERVED_CLUSTER_ERROR,
    prober::ClusterConnectivity,
};
use devplane_rpc::{
    error::ApiError,
    helm_app::{
        ChartRepository, ExternalResourceTreeRequest, HelmAppClient, HelmAppError,
        InstallReleaseRequest, ReleaseIdentifier,
    },
};
use parking_lot::Mutex;
use sea_orm::Database;
use serde_json::Value;
use wiremock::{
    matchers::{basic_auth, method, path},
    Mock, MockServer, ResponseTemplate,
};

use super::{cluster::CLUSTER_DUPLICATE_MSG, environment::ENVIRONMENT_DUPLICATE_MSG, *};
use crate::cluster_access::MockClusterAccess;

const UNREACHABLE: &str = "Incorrect server url : connection refused";

/// Fails `/livez` for the listed server urls.
#[derive(Default)]
struct FakeConnectivity {
    down: Mutex<Vec<String>>,
}

#[async_trait]
impl ClusterConnectivity for FakeConnectivity {
    async fn livez(&self, conn: &ClusterConnectionConfig) -> Result<(), String> {
        if conn.server_url == "not-a-url" || self.down.lock().contains(&conn.server_url) {
            Err(UNREACHABLE.to_string())
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct RecordingEvents {
    published: Mutex<Vec<(i32, ClusterModifyAction)>>,
    removed: Mutex<Vec<i32>>,
}

#[async_trait]
impl ClusterEventPublisher for RecordingEvents {
    async fn publish(&self, cluster_id: i32, action: ClusterModifyAction) -> Result<()> {
        self.published.lock().push((cluster_id, action));
        Ok(())
    }

    async fn remove(&self, cluster_id: i32) -> Result<()> {
        self.removed.lock().push(cluster_id);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingRepoSync {
    fail: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl GitOpsRepoSync for RecordingRepoSync {
    async fn add_or_update(&self, repo: &ChartRepoDto, previous_name: Option<String>) -> Result<()> {
        if *self.fail.lock() {
            return Err(anyhow!("argocd-cm: forbidden"));
        }
        self.calls.lock().push(format!(
            "upsert {} (was {})",
            repo.name,
            previous_name.unwrap_or_default()
        ));
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        if *self.fail.lock() {
            return Err(anyhow!("argocd-cm: forbidden"));
        }
        self.calls.lock().push(format!("delete {name}"));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingChartSync {
    launched: Mutex<usize>,
}

#[async_trait]
impl ChartSyncTrigger for RecordingChartSync {
    async fn trigger(&self) -> Result<String> {
        let mut launched = self.launched.lock();
        *launched += 1;
        Ok(format!("chart-sync-{launched}"))
    }
}

#[derive(Default)]
struct FakeHelm {
    installed: Mutex<bool>,
    calls: Mutex<Vec<String>>,
    repositories: Mutex<Vec<ChartRepository>>,
}

#[async_trait]
impl HelmAppClient for FakeHelm {
    async fn install_release(&self, req: InstallReleaseRequest) -> Result<bool, HelmAppError> {
        let repo = req.chart_repository.map(|r| {
            let url = r.url.clone();
            self.repositories.lock().push(r);
            url
        });
        let repo = repo.unwrap_or_default();
        self.calls.lock().push(format!("install {} from {repo}", req.chart_name));
        *self.installed.lock() = true;
        Ok(true)
    }

    async fn update_application_with_chart_info(
        &self,
        req: InstallReleaseRequest,
    ) -> Result<bool, HelmAppError> {
        self.calls.lock().push(format!("update {}", req.chart_name));
        Ok(true)
    }

    async fn is_release_installed(&self, req: ReleaseIdentifier) -> Result<bool, HelmAppError> {
        assert!(req.cluster_config.is_some());
        Ok(*self.installed.lock())
    }

    async fn get_resource_tree_for_external_resources(
        &self,
        _: ExternalResourceTreeRequest,
    ) -> Result<ApplicationTree, HelmAppError> {
        Ok(ApplicationTree::default())
    }
}

struct NoApplications;

#[async_trait]
impl ArgoApplicationApi for NoApplications {
    async fn get_application(
        &self,
        _: &ClusterConnectionConfig,
        _: &str,
        _: &str,
    ) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn list_applications(&self, _: &ClusterConnectionConfig) -> Result<Option<Value>> {
        Ok(None)
    }
}

struct NoSecrets;

#[async_trait]
impl ClusterSecretSource for NoSecrets {
    async fn cluster_secrets(
        &self,
        _: &ClusterConnectionConfig,
    ) -> Result<Vec<BTreeMap<String, String>>> {
        Ok(Vec::new())
    }
}

struct EmptyTrees;

#[async_trait]
impl ResourceTreeProvider for EmptyTrees {
    async fn resource_tree(&self, _: &TreeRequest) -> Result<ResourceTreeResponse, ApiError> {
        Ok(ResourceTreeResponse::default())
    }
}

pub(crate) struct Harness {
    pub(crate) controller: Controller,
    connectivity: Arc<FakeConnectivity>,
    events: Arc<RecordingEvents>,
    repo_sync: Arc<RecordingRepoSync>,
    chart_sync: Arc<RecordingChartSync>,
    helm: Arc<FakeHelm>,
}

async fn prepare_db() -> Result<DbApi> {
    let conn = Database::connect("sqlite::memory:").await?;
    let db = DbApi { conn, pool: None };
    db.migrate().await?;
    Ok(db)
}

fn cluster_access() -> MockClusterAccess {
    let mut access = MockClusterAccess::new();
    access
        .expect_server_version()
        .returning(|_| Ok("v1.30.2".to_string()));
    access.expect_ensure_namespace().returning(|_, _| Ok(true));
    access
}

async fn harness_with(access: MockClusterAccess) -> Harness {
    let db = prepare_db().await.unwrap();
    let connectivity = Arc::new(FakeConnectivity::default());
    let events = Arc::new(RecordingEvents::default());
    let repo_sync = Arc::new(RecordingRepoSync::default());
    let chart_sync = Arc::new(RecordingChartSync::default());
    let helm = Arc::new(FakeHelm::default());

    let lookup = Arc::new(db.clone());
    let argo = ArgoAppLocator::new(
        lookup.clone(),
        Arc::new(NoApplications),
        DestinationResolver::new(lookup, Arc::new(NoSecrets)),
        Arc::new(EmptyTrees),
    );
    let controller = Controller {
        db,
        connectivity: connectivity.clone(),
        access: Arc::new(access),
        events: events.clone(),
        informers: NamespaceInformerFactory::default(),
        argo,
        repo_sync: repo_sync.clone(),
        chart_sync: chart_sync.clone(),
        helm: helm.clone(),
        http: reqwest::Client::new(),
    };
    Harness {
        controller,
        connectivity,
        events,
        repo_sync,
        chart_sync,
        helm,
    }
}

pub(crate) async fn harness() -> Harness {
    harness_with(cluster_access()).await
}

pub(crate) fn cluster(name: &str) -> ClusterBean {
    ClusterBean {
        cluster_name: name.to_string(),
        server_url: format!("https://{name}.example.com:6443"),
        insecure_skip_tls_verify: true,
        config: HashMap::from([(BEARER_TOKEN.to_string(), format!("{name}-token"))]),
        ..Default::default()
    }
}

fn environment(cluster_id: i32, name: &str, namespace: &str) -> EnvironmentBean {
    EnvironmentBean {
        environment_name: name.to_string(),
        cluster_id,
        namespace: namespace.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn malformed_server_url_is_rejected() {
    let h = harness().await;
    let mut bad = cluster("staging");
    bad.server_url = "not-a-url".to_string();

    let err = h.controller.create_cluster(bad, 1).await.unwrap_err();
    assert_eq!(err, ApiError::InvalidRequest(UNREACHABLE.to_string()));
    assert!(h.controller.db.get_cluster_by_name("staging").await.unwrap().is_none());
    assert!(h.events.published.lock().is_empty());
}

#[tokio::test]
async fn created_cluster_is_announced_and_watched() {
    let h = harness().await;
    let created = h.controller.create_cluster(cluster("prod"), 1).await.unwrap();

    assert!(created.id > 0);
    assert_eq!(created.error_in_connecting, "");
    assert_eq!(created.k8s_version, "v1.30.2");
    assert_eq!(
        *h.events.published.lock(),
        vec![(created.id, ClusterModifyAction::Add)]
    );
    assert!(h.controller.informers.is_watching("prod"));

    let err = h.controller.create_cluster(cluster("prod"), 1).await.unwrap_err();
    assert_eq!(err, ApiError::InvalidRequest(CLUSTER_DUPLICATE_MSG.to_string()));
}

#[tokio::test]
async fn registration_ends_reachable_or_virtual() {
    let h = harness().await;
    assert_eq!(
        h.controller.registration_state(&cluster("prod")).await.unwrap(),
        ClusterState::Reachable
    );

    let mut edge = cluster("edge");
    edge.is_virtual_cluster = true;
    edge.server_url = String::new();
    assert_eq!(
        h.controller.registration_state(&edge).await.unwrap(),
        ClusterState::Virtual
    );

    h.connectivity.down.lock().push(cluster("dev").server_url);
    let err = h.controller.registration_state(&cluster("dev")).await.unwrap_err();
    assert_eq!(err, ApiError::InvalidRequest(UNREACHABLE.to_string()));
}

#[tokio::test]
async fn bearer_token_is_kept_when_left_empty() {
    let h = harness().await;
    let created = h.controller.create_cluster(cluster("prod"), 1).await.unwrap();

    let mut keep = created.clone();
    keep.config = HashMap::from([(BEARER_TOKEN.to_string(), String::new())]);
    let kept = h.controller.update_cluster(keep, 2).await.unwrap();
    assert_eq!(kept.config_value(BEARER_TOKEN), "prod-token");
    assert_eq!(h.events.published.lock().len(), 1);

    let mut rotate = created.clone();
    rotate.config = HashMap::from([(BEARER_TOKEN.to_string(), "rotated".to_string())]);
    let rotated = h.controller.update_cluster(rotate, 2).await.unwrap();
    assert_eq!(rotated.config_value(BEARER_TOKEN), "rotated");
    assert_eq!(
        h.events.published.lock().last(),
        Some(&(created.id, ClusterModifyAction::Update))
    );
}

#[tokio::test]
async fn update_to_unreachable_server_is_not_persisted() {
    let h = harness().await;
    let created = h.controller.create_cluster(cluster("prod"), 1).await.unwrap();
    h.connectivity
        .down
        .lock()
        .push("https://moved.example.com:6443".to_string());

    let mut moved = created.clone();
    moved.server_url = "https://moved.example.com:6443".to_string();
    let err = h.controller.update_cluster(moved, 1).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));

    let stored = h.controller.find_cluster_by_id(created.id).await.unwrap();
    assert_eq!(stored.server_url, "https://prod.example.com:6443");
    assert_eq!(h.events.published.lock().len(), 1);
}

#[tokio::test]
async fn rename_to_taken_name_fails() {
    let h = harness().await;
    h.controller.create_cluster(cluster("prod"), 1).await.unwrap();
    let staging = h.controller.create_cluster(cluster("staging"), 1).await.unwrap();

    let mut renamed = staging.clone();
    renamed.cluster_name = "prod".to_string();
    let err = h.controller.update_cluster(renamed, 1).await.unwrap_err();
    assert_eq!(err, ApiError::InvalidRequest(CLUSTER_DUPLICATE_MSG.to_string()));
}

#[tokio::test]
async fn default_cluster_is_immutable() {
    let h = harness().await;
    let platform = h
        .controller
        .create_cluster(cluster(DEFAULT_CLUSTER), 1)
        .await
        .unwrap();

    let err = h
        .controller
        .update_cluster(platform.clone(), 1)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::InvalidRequest(RESERVED_CLUSTER_ERROR.to_string()));
    let err = h.controller.delete_cluster(platform.id, 1).await.unwrap_err();
    assert_eq!(err, ApiError::InvalidRequest(RESERVED_CLUSTER_ERROR.to_string()));
}

#[tokio::test]
async fn cluster_with_environments_cannot_be_deleted() {
    let h = harness().await;
    let prod = h.controller.create_cluster(cluster("prod"), 1).await.unwrap();
    let env = h
        .controller
        .create_environment(environment(prod.id, "prod-web", "web"), 1)
        .await
        .unwrap();

    let err = h.controller.delete_cluster(prod.id, 1).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
    assert!(h.controller.find_cluster_by_id(prod.id).await.unwrap().active);

    h.controller.delete_environment(env.id, 1).await.unwrap();
    h.controller.delete_cluster(prod.id, 1).await.unwrap();
    assert!(matches!(
        h.controller.find_cluster_by_id(prod.id).await,
        Err(ApiError::NotFound(_))
    ));
    assert_eq!(*h.events.removed.lock(), vec![prod.id]);
    assert!(!h.controller.informers.is_watching("prod"));
}

#[tokio::test]
async fn probe_writes_connection_errors() {
    let h = harness().await;
    let prod = h.controller.create_cluster(cluster("prod"), 1).await.unwrap();
    let mut isolated = cluster("isolated");
    isolated.is_virtual_cluster = true;
    let isolated = h.controller.create_cluster(isolated, 1).await.unwrap();
    h.connectivity
        .down
        .lock()
        .push("https://prod.example.com:6443".to_string());

    h.controller.probe_all_clusters().await.unwrap();

    let prod = h.controller.find_cluster_by_id(prod.id).await.unwrap();
    assert_eq!(prod.error_in_connecting, UNREACHABLE);
    let isolated = h.controller.find_cluster_by_id(isolated.id).await.unwrap();
    assert_eq!(isolated.error_in_connecting, virtual_cluster_error("isolated"));

    let autocomplete = h.controller.find_all_clusters_for_autocomplete().await.unwrap();
    assert_eq!(autocomplete.len(), 2);
    assert!(autocomplete.iter().any(|c| c.is_virtual_cluster));
}

const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: ok
  cluster:
    server: https://ok.example.com:6443
    insecure-skip-tls-verify: true
- name: bad-tls
  cluster:
    server: https://bad.example.com:6443
    certificate-authority-data: Q0E=
- name: default_cluster
  cluster:
    server: https://kubernetes.default.svc
    insecure-skip-tls-verify: true
users:
- name: ok-admin
  user:
    token: ok-token
- name: bad-admin
  user:
    client-key-data: S0VZ
- name: default-admin
  user:
    token: abc
contexts:
- name: ok
  context:
    cluster: ok
    user: ok-admin
- name: bad-tls
  context:
    cluster: bad-tls
    user: bad-admin
- name: default
  context:
    cluster: default_cluster
    user: default-admin
"#;

#[tokio::test]
async fn kubeconfig_import_reports_each_context() {
    let h = harness().await;
    let result = h.controller.validate_kubeconfig(KUBECONFIG).await.unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result["ok"].cluster.error_in_connecting, "");
    assert_eq!(
        result["bad-tls"].cluster.error_in_connecting,
        "Missing fields against user: client-certificate-data"
    );
    assert_eq!(
        result[DEFAULT_CLUSTER].cluster.error_in_connecting,
        RESERVED_CLUSTER_ERROR
    );

    let ok = h.controller.create_cluster(cluster("ok"), 1).await.unwrap();
    let result = h.controller.validate_kubeconfig(KUBECONFIG).await.unwrap();
    assert_eq!(result["ok"].cluster.error_in_connecting, CLUSTER_ALREADY_EXISTS);
    assert_eq!(result["ok"].cluster.id, ok.id);

    let err = h
        .controller
        .validate_kubeconfig("kind: Config")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));
}

#[tokio::test]
async fn environment_namespace_rules() {
    let mut access = MockClusterAccess::new();
    access
        .expect_server_version()
        .returning(|_| Ok("v1.30.2".to_string()));
    access
        .expect_ensure_namespace()
        .withf(|_, namespace| namespace == "web")
        .times(1)
        .returning(|_, _| Ok(true));
    let h = harness_with(access).await;
    let legacy = h.controller.create_cluster(cluster("legacy"), 1).await.unwrap();
    let prod = h.controller.create_cluster(cluster("prod"), 1).await.unwrap();

    let blank = h
        .controller
        .create_environment(environment(legacy.id, "legacy", ""), 1)
        .await
        .unwrap();
    assert_eq!(blank.environment_identifier, "legacy__");
    let err = h
        .controller
        .create_environment(environment(legacy.id, "legacy-web", "web"), 1)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ApiError::InvalidRequest("cannot create env as existing old envs have no namespace".to_string())
    );

    let web = h
        .controller
        .create_environment(environment(prod.id, "prod-web", "web"), 1)
        .await
        .unwrap();
    assert_eq!(web.environment_identifier, "prod__web");
    assert_eq!(web.cluster_name, "prod");

    let err = h
        .controller
        .create_environment(environment(prod.id, "prod-blank", ""), 1)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::InvalidRequest("namespace cannot be empty".to_string()));
    let err = h
        .controller
        .create_environment(environment(prod.id, "prod-web-2", "web"), 1)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::InvalidRequest(ENVIRONMENT_DUPLICATE_MSG.to_string()));

    let by_cluster = h.controller.get_environments_by_cluster_id(prod.id).await.unwrap();
    assert_eq!(by_cluster.len(), 1);
    assert_eq!(
        h.controller.find_environment_by_name("prod-web").await.unwrap().id,
        web.id
    );
}

#[tokio::test]
async fn environment_with_helm_releases_cannot_be_deleted() {
    let h = harness().await;
    let prod = h.controller.create_cluster(cluster("prod"), 1).await.unwrap();
    let env = h
        .controller
        .create_environment(environment(prod.id, "prod-web", "web"), 1)
        .await
        .unwrap();
    h.controller
        .db
        .upsert_helm_release(prod.id, "web", "nginx", None, "nginx", "1.0.0")
        .await
        .unwrap();

    let err = h.controller.delete_environment(env.id, 1).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
    assert_eq!(h.controller.get_all_active_environments().await.unwrap().len(), 1);
}

fn chart_repo(name: &str, url: &str) -> ChartRepoDto {
    ChartRepoDto {
        name: name.to_string(),
        url: url.to_string(),
        active: true,
        ..Default::default()
    }
}

async fn index_server(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/charts/index.yaml"))
        .respond_with(ResponseTemplate::new(status).set_body_string("apiVersion: v1\nentries: {}\n"))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn chart_repo_name_is_checked_before_fetching() {
    let h = harness().await;
    for name in ["my repo", "ab"] {
        let result = h
            .controller
            .validate_chart_repo(&chart_repo(name, "http://127.0.0.1:1/charts"))
            .await;
        assert_eq!(result.custom_err_msg, INVALID_NAME_MSG);
        assert!(!result.actual_err_msg.is_empty());
    }
}

#[tokio::test]
async fn chart_repo_validation_uses_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/charts/index.yaml"))
        .and(basic_auth("reader", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("apiVersion: v1\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/charts/index.yaml"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let http = reqwest::Client::new();

    let mut repo = chart_repo("private", &format!("{}/charts/", server.uri()));
    let result = validate_chart_repo(&http, &repo).await;
    assert_eq!(result.custom_err_msg, INVALID_AUTH_MSG);

    repo.user_name = "reader".to_string();
    repo.password = "secret".to_string();
    assert!(validate_chart_repo(&http, &repo).await.is_success());
}

#[tokio::test]
async fn chart_repo_create_registers_and_syncs() {
    let h = harness().await;
    let server = index_server(200).await;
    let url = format!("{}/charts", server.uri());

    let err = h
        .controller
        .create_chart_repo(chart_repo("Bitnami", &url), 1)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::InvalidRequest(NON_LOWERCASE_NAME_MSG.to_string()));

    let created = h
        .controller
        .create_chart_repo(chart_repo("bitnami", &url), 1)
        .await
        .unwrap();
    assert!(created.id > 0);
    assert_eq!(*h.repo_sync.calls.lock(), vec!["upsert bitnami (was )".to_string()]);
    assert_eq!(*h.chart_sync.launched.lock(), 1);

    let err = h
        .controller
        .create_chart_repo(chart_repo("bitnami", &url), 1)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::InvalidRequest(DUPLICATE_REPO_MSG.to_string()));
    assert_eq!(h.controller.get_chart_repo_list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn chart_repo_is_not_saved_when_argocd_rejects_it() {
    let h = harness().await;
    let server = index_server(200).await;
    *h.repo_sync.fail.lock() = true;

    let err = h
        .controller
        .create_chart_repo(chart_repo("bitnami", &format!("{}/charts", server.uri())), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Upstream(_)));
    assert!(h.controller.db.get_chart_repo_by_name("bitnami").await.unwrap().is_none());
    assert_eq!(*h.chart_sync.launched.lock(), 0);
}

#[tokio::test]
async fn deployed_chart_repo_is_frozen() {
    let h = harness().await;
    let server = index_server(200).await;
    let url = format!("{}/charts", server.uri());
    let repo = h
        .controller
        .create_chart_repo(chart_repo("bitnami", &url), 1)
        .await
        .unwrap();
    h.controller
        .db
        .upsert_helm_release(1, "web", "nginx", Some(repo.id), "nginx", "1.0.0")
        .await
        .unwrap();

    let mut renamed = repo.clone();
    renamed.name = "bitnami-mirror".to_string();
    let err = h.controller.update_chart_repo(renamed, 1).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));

    let mut insecure = repo.clone();
    insecure.allow_insecure_connection = true;
    let updated = h.controller.update_chart_repo(insecure, 1).await.unwrap();
    assert_eq!(updated.deployment_count, 1);
    assert!(updated.allow_insecure_connection);

    let err = h.controller.delete_chart_repo(repo.id, 1).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn unused_chart_repo_is_deleted_from_argocd() {
    let h = harness().await;
    let server = index_server(200).await;
    let repo = h
        .controller
        .create_chart_repo(chart_repo("bitnami", &format!("{}/charts", server.uri())), 1)
        .await
        .unwrap();

    h.controller.delete_chart_repo(repo.id, 1).await.unwrap();
    assert_eq!(
        h.repo_sync.calls.lock().last().map(String::as_str),
        Some("delete bitnami")
    );
    assert!(matches!(
        h.controller.get_chart_repo_by_id(repo.id).await,
        Err(ApiError::NotFound(_))
    ));
}

fn helm_request(cluster_name: &str, repo: ChartRepoRef) -> HelmAppCreateUpdateRequest {
    HelmAppCreateUpdateRequest {
        cluster_name: cluster_name.to_string(),
        namespace: "web".to_string(),
        release_name: "nginx".to_string(),
        values_override_yaml: Some("replicaCount: 2\n".to_string()),
        chart: ChartRef {
            chart_name: "nginx".to_string(),
            chart_version: Some("15.1.0".to_string()),
            repo,
        },
    }
}

#[tokio::test]
async fn webhook_installs_then_updates_release() {
    let h = harness().await;
    let prod = h.controller.create_cluster(cluster("prod"), 1).await.unwrap();
    let server = index_server(200).await;
    let url = format!("{}/charts", server.uri());
    let repo = h
        .controller
        .create_chart_repo(chart_repo("bitnami", &url), 1)
        .await
        .unwrap();
    h.controller
        .db
        .update_config(HOST_URL_CONFIG_KEY, "https://devtron.example.com")
        .await
        .unwrap();

    let by_name = ChartRepoRef {
        name: "bitnami".to_string(),
        identifier: None,
    };
    let detail = h
        .controller
        .create_or_update_helm_app(helm_request("prod", by_name.clone()))
        .await
        .unwrap();
    assert_eq!(
        detail.as_deref(),
        Some(
            format!(
                "https://devtron.example.com/orchestrator/application/app?appId={}|web|nginx",
                prod.id
            )
            .as_str()
        )
    );
    h.controller
        .create_or_update_helm_app(helm_request("prod", by_name))
        .await
        .unwrap();
    assert_eq!(
        *h.helm.calls.lock(),
        vec![format!("install nginx from {url}"), "update nginx".to_string()]
    );
    assert_eq!(
        h.controller.get_chart_repo_by_id(repo.id).await.unwrap().deployment_count,
        1
    );
}

#[tokio::test]
async fn webhook_validates_its_input() {
    let h = harness().await;
    h.controller.create_cluster(cluster("prod"), 1).await.unwrap();

    let mut incomplete = helm_request("prod", ChartRepoRef::default());
    incomplete.release_name = String::new();
    let err = h
        .controller
        .create_or_update_helm_app(incomplete)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ApiError::InvalidRequest("missing required fields: releaseName, chart.repo.name".to_string())
    );

    let inline = ChartRepoRef {
        name: "external".to_string(),
        identifier: Some(ChartRepoIdentifier {
            url: "https://charts.example.com".to_string(),
            username: None,
            password: None,
            allow_insecure_connection: false,
        }),
    };
    let err = h
        .controller
        .create_or_update_helm_app(helm_request("missing", inline.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let unknown_repo = ChartRepoRef {
        name: "nowhere".to_string(),
        identifier: None,
    };
    let err = h
        .controller
        .create_or_update_helm_app(helm_request("prod", unknown_repo))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    // no host url configured
    let detail = h
        .controller
        .create_or_update_helm_app(helm_request("prod", inline))
        .await
        .unwrap();
    assert_eq!(detail, None);
    assert_eq!(
        *h.helm.calls.lock(),
        vec!["install nginx from https://charts.example.com".to_string()]
    );
}

#[tokio::test]
async fn inline_repo_carries_its_insecure_flag() {
    let h = harness().await;
    h.controller.create_cluster(cluster("prod"), 1).await.unwrap();

    let identifier: ChartRepoIdentifier = serde_json::from_str(
        r#"{"url":"https://self-signed.example.com","username":"bot","password":"pw","allowInsecureConnection":true}"#,
    )
    .unwrap();
    let inline = ChartRepoRef {
        name: "self-signed".to_string(),
        identifier: Some(identifier),
    };
    h.controller
        .create_or_update_helm_app(helm_request("prod", inline))
        .await
        .unwrap();

    let repositories = h.helm.repositories.lock();
    assert_eq!(repositories.len(), 1);
    assert_eq!(repositories[0].name, "self-signed");
    assert_eq!(repositories[0].username, "bot");
    assert!(repositories[0].allow_insecure_connection);
}

#[tokio::test]
async fn malformed_app_id_is_rejected() {
    let h = harness().await;
    let err = h
        .controller
        .argo_app_detail_by_app_id("guestbook")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(msg) if msg.starts_with("malformed app id")));
}
