use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{any, get, post, put},
    Router,
};
use tracing::error;

use crate::{argo_app, chart_repo, cluster, environment, state::CoreState, webhook_helm};

async fn not_found() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

async fn health(State(state): State<Arc<CoreState>>) -> impl IntoResponse {
    match state.db.conn.ping().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            error!(error = ?err, "database ping failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

fn cluster_routes() -> Router<Arc<CoreState>> {
    Router::new()
        .route(
            "/",
            get(cluster::list_clusters)
                .post(cluster::create_cluster)
                .put(cluster::update_cluster),
        )
        .route("/autocomplete", get(cluster::cluster_autocomplete))
        .route("/namespaces", get(cluster::all_cluster_namespaces))
        .route("/description", put(cluster::set_cluster_description))
        .route("/validate", post(cluster::validate_kubeconfig))
        .route("/by-name/{name}", get(cluster::get_cluster_by_name))
        .route(
            "/{id}",
            get(cluster::get_cluster).delete(cluster::delete_cluster),
        )
        .route("/{id}/namespaces", get(cluster::cluster_namespaces))
}

fn environment_routes() -> Router<Arc<CoreState>> {
    Router::new()
        .route(
            "/",
            get(environment::list_environments)
                .post(environment::create_environment)
                .put(environment::update_environment),
        )
        .route("/by-name/{name}", get(environment::get_environment_by_name))
        .route(
            "/{id}",
            get(environment::get_environment).delete(environment::delete_environment),
        )
}

fn argo_routes() -> Router<Arc<CoreState>> {
    Router::new()
        .route("/", get(argo_app::list_argo_apps))
        .route("/detail", get(argo_app::argo_app_detail))
        .route("/{app_id}", get(argo_app::argo_app_detail_by_app_id))
}

fn chart_repo_routes() -> Router<Arc<CoreState>> {
    Router::new()
        .route(
            "/",
            get(chart_repo::list_chart_repos)
                .post(chart_repo::create_chart_repo)
                .put(chart_repo::update_chart_repo),
        )
        .route("/validate", post(chart_repo::validate_chart_repo))
        .route("/sync", post(chart_repo::trigger_chart_sync))
        .route("/by-name/{name}", get(chart_repo::get_chart_repo_by_name))
        .route(
            "/{id}",
            get(chart_repo::get_chart_repo).delete(chart_repo::delete_chart_repo),
        )
}

fn v1_api_routes() -> Router<Arc<CoreState>> {
    Router::new()
        .nest("/cluster", cluster_routes())
        .nest("/env", environment_routes())
        .nest("/argo-application", argo_routes())
        .nest("/chart-repo", chart_repo_routes())
        .route(
            "/webhook/helm/app",
            post(webhook_helm::create_or_update_helm_app),
        )
        .route("/{*wildcard}", any(not_found))
}

pub fn build_router(state: Arc<CoreState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", v1_api_routes())
        .with_state(state)
}
