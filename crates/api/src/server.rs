use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use devplane_argo::{
    locator::{ArgoAppLocator, KubeArgoApplicationApi},
    provider::{ArgoCdTreeProvider, HelmTreeProvider, ResourceTreeProvider},
    resolver::{DestinationResolver, KubeClusterSecretSource},
};
use devplane_common::DEFAULT_CLUSTER;
use devplane_db::{api::DbApi, cluster_bean};
use devplane_kube::{
    argocd_repo::ArgoRepoSync,
    chart_sync::ChartSyncJob,
    client::{build_client, LIVEZ_TIMEOUT},
    events::ConfigMapEventPublisher,
    informer::NamespaceInformerFactory,
    prober::LivezConnectivity,
};
use devplane_rpc::{
    argocd::{HttpArgoCdClient, ARGOCD_TIMEOUT},
    helm_app::GrpcHelmAppClient,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
    cluster_access::KubeClusterAccess, controller::Controller, router,
    scheduler::{spawn_probe_scheduler, DEFAULT_CLUSTER_STATUS_CRON_MINUTES},
    state::CoreState,
};

const DEFAULT_NAMESPACE: &str = "devtroncd";
const DEFAULT_ARGOCD_CONFIGMAP: &str = "argocd-cm";
const DEFAULT_HELM_APP_URL: &str = "http://kubelink-service:50051";
const DEFAULT_CHART_SYNC_IMAGE: &str = "quay.io/devtron/chart-sync:latest";
const HELM_APP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Deserialize, Default)]
#[cfg_attr(test, derive(Debug))]
#[serde(rename_all = "kebab-case")]
struct DevplaneConfig {
    db: Option<String>,
    bind: Option<String>,
    http_port: Option<u16>,
    /// Minutes between two connection probes.
    cluster_status_cron_time: Option<u64>,
    platform_namespace: Option<String>,
    argocd_namespace: Option<String>,
    argocd_configmap: Option<String>,
    helm_app_url: Option<String>,
    argocd_url: Option<String>,
    argocd_token: Option<String>,
    argocd_insecure: Option<bool>,
    chart_sync_image: Option<String>,
}

#[derive(Parser)]
#[clap(name = "devplane")]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// The config file path
    #[clap(short, long, action, value_hint = clap::ValueHint::AnyPath)]
    config_file: Option<PathBuf>,
    /// The folder for putting logs
    #[clap(short, long, action, value_hint = clap::ValueHint::AnyPath)]
    logs_folder: Option<PathBuf>,
    /// Don't run db migration on startup
    #[clap(short, long, action)]
    no_migration: bool,
}

pub async fn start() {
    let cli = Cli::parse();

    let _result = setup_log(&cli).await;

    if let Err(e) = run(&cli).await {
        tracing::error!("devplane api start server error: {e:#}");
    }
}

async fn read_config(cli: &Cli) -> Result<DevplaneConfig> {
    let config_file = cli
        .config_file
        .clone()
        .unwrap_or_else(|| PathBuf::from("/etc/devplane.conf"));
    let config_content = tokio::fs::read_to_string(&config_file)
        .await
        .with_context(|| format!("can't read config file {}", config_file.to_string_lossy()))?;
    parse_config(&config_content)
}

fn parse_config(content: &str) -> Result<DevplaneConfig> {
    toml::from_str(content).with_context(|| "wrong config file format")
}

/// The client for the cluster the platform itself runs in. In-cluster
/// credentials win, otherwise the registered `default_cluster` is used.
async fn platform_client(db: &DbApi) -> Result<kube::Client> {
    match kube::Client::try_default().await {
        Ok(client) => return Ok(client),
        Err(err) => {
            warn!(error = ?err, "no in-cluster credentials, falling back to {DEFAULT_CLUSTER}")
        }
    }
    let model = db
        .get_cluster_by_name(DEFAULT_CLUSTER)
        .await?
        .ok_or_else(|| anyhow!("{DEFAULT_CLUSTER} is not registered"))?;
    build_client(&cluster_bean(&model).connection_config(), LIVEZ_TIMEOUT)
}

fn tree_provider(
    config: &DevplaneConfig,
    helm: Arc<GrpcHelmAppClient>,
) -> Result<Arc<dyn ResourceTreeProvider>> {
    let helm_trees: Arc<dyn ResourceTreeProvider> = Arc::new(HelmTreeProvider::new(helm));
    let (Some(url), Some(token)) = (config.argocd_url.as_deref(), config.argocd_token.as_deref())
    else {
        return Ok(helm_trees);
    };
    let argocd = HttpArgoCdClient::new(url, token, config.argocd_insecure.unwrap_or(false))
        .with_context(|| format!("argocd client for {url}"))?;
    info!("resource trees served by argocd at {url}");
    Ok(Arc::new(ArgoCdTreeProvider::new(Arc::new(argocd), helm_trees)))
}

async fn build_controller(config: &DevplaneConfig, db: DbApi) -> Result<Controller> {
    let platform = platform_client(&db).await?;
    let platform_namespace = config
        .platform_namespace
        .clone()
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    let argocd_namespace = config
        .argocd_namespace
        .clone()
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    let helm_app_url = config.helm_app_url.as_deref().unwrap_or(DEFAULT_HELM_APP_URL);
    let helm = Arc::new(
        GrpcHelmAppClient::new(helm_app_url, HELM_APP_TIMEOUT)
            .with_context(|| format!("helm app client for {helm_app_url}"))?,
    );

    let lookup = Arc::new(db.clone());
    let argo = ArgoAppLocator::new(
        lookup.clone(),
        Arc::new(KubeArgoApplicationApi::new(ARGOCD_TIMEOUT)),
        DestinationResolver::new(lookup, Arc::new(KubeClusterSecretSource::new(ARGOCD_TIMEOUT))),
        tree_provider(config, helm.clone())?,
    );

    Ok(Controller {
        db,
        connectivity: Arc::new(LivezConnectivity::new(LIVEZ_TIMEOUT)),
        access: Arc::new(KubeClusterAccess::new(LIVEZ_TIMEOUT)),
        events: Arc::new(ConfigMapEventPublisher::new(
            platform.clone(),
            platform_namespace.clone(),
        )),
        informers: NamespaceInformerFactory::new(LIVEZ_TIMEOUT),
        argo,
        repo_sync: Arc::new(ArgoRepoSync::new(
            platform.clone(),
            argocd_namespace,
            config
                .argocd_configmap
                .clone()
                .unwrap_or_else(|| DEFAULT_ARGOCD_CONFIGMAP.to_string()),
        )),
        chart_sync: Arc::new(ChartSyncJob::new(
            platform,
            platform_namespace,
            config
                .chart_sync_image
                .clone()
                .unwrap_or_else(|| DEFAULT_CHART_SYNC_IMAGE.to_string()),
        )),
        helm,
        http: reqwest::Client::new(),
    })
}

async fn run(cli: &Cli) -> Result<()> {
    let config = read_config(cli).await?;
    let db_url = config
        .db
        .clone()
        .ok_or_else(|| anyhow!("can't find database url in your config file"))?;
    let db = DbApi::new(&db_url, cli.no_migration).await?;

    let controller = build_controller(&config, db).await?;
    if let Err(err) = controller.build_informers().await {
        warn!(error = ?err, "namespace informers not started");
    }

    let every = config
        .cluster_status_cron_time
        .unwrap_or(DEFAULT_CLUSTER_STATUS_CRON_MINUTES)
        .max(1);
    let scheduler = spawn_probe_scheduler(controller.clone(), Duration::from_secs(every * 60));

    let state = Arc::new(CoreState::new(controller));
    let app = router::build_router(state);

    let bind = format!(
        "{}:{}",
        config.bind.unwrap_or_else(|| "0.0.0.0".to_string()),
        config.http_port.unwrap_or(8080)
    );
    let tcp_listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind to {bind}"))?;
    info!("devplane api listening on {bind}");
    if let Err(err) = axum::serve(tcp_listener, app.into_make_service()).await {
        tracing::error!("http server stopped error: {err}");
    }
    scheduler.stop().await;
    Ok(())
}

async fn setup_log(cli: &Cli) -> Result<tracing_appender::non_blocking::WorkerGuard, anyhow::Error> {
    let folder = cli
        .logs_folder
        .clone()
        .unwrap_or_else(|| PathBuf::from("/var/log/devplane"));
    tokio::fs::create_dir_all(&folder).await?;
    let file_appender = tracing_appender::rolling::Builder::new()
        .max_log_files(30)
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("devplane.log")
        .build(folder)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let var = std::env::var("RUST_LOG").unwrap_or_default();
    let var = format!(
        "error,devplane=info,devplane_api=info,devplane_argo=info,devplane_kube=info,devplane_rpc=info,devplane_common=info,devplane_db=info,{var}"
    );
    let filter = tracing_subscriber::EnvFilter::builder().parse_lossy(var);
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .init();
    Ok(guard)
}
