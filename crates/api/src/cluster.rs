use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use devplane_common::cluster::{ClusterBean, ClusterDescriptionUpdate, KubeconfigRequest};
use devplane_rpc::error::ApiError;
use serde::Deserialize;

use crate::state::{CoreState, UserId};

#[derive(Debug, Default, Deserialize)]
pub struct ClusterQuery {
    /// Comma separated cluster ids.
    pub ids: Option<String>,
    #[serde(default)]
    pub exclude_virtual: bool,
}

pub(crate) fn parse_ids(ids: &str) -> Result<Vec<i32>, ApiError> {
    ids.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i32>()
                .map_err(|_| ApiError::InvalidRequest(format!("invalid id {s}")))
        })
        .collect()
}

pub async fn list_clusters(
    State(state): State<Arc<CoreState>>,
    Query(query): Query<ClusterQuery>,
) -> Result<Response, ApiError> {
    let clusters = match query.ids.as_deref() {
        Some(ids) => {
            let ids = parse_ids(ids)?;
            state.controller.find_clusters_by_ids(&ids).await?
        }
        None if query.exclude_virtual => state.controller.find_all_clusters_except_virtual().await?,
        None => state.controller.find_all_clusters().await?,
    };
    Ok(Json(clusters).into_response())
}

pub async fn get_cluster(
    State(state): State<Arc<CoreState>>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let cluster = state.controller.find_cluster_by_id(id).await?;
    Ok(Json(cluster).into_response())
}

pub async fn get_cluster_by_name(
    State(state): State<Arc<CoreState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let cluster = state.controller.find_cluster_by_name(&name).await?;
    Ok(Json(cluster).into_response())
}

pub async fn create_cluster(
    State(state): State<Arc<CoreState>>,
    UserId(user_id): UserId,
    Json(cluster): Json<ClusterBean>,
) -> Result<Response, ApiError> {
    let cluster = state.controller.create_cluster(cluster, user_id).await?;
    Ok(Json(cluster).into_response())
}

pub async fn update_cluster(
    State(state): State<Arc<CoreState>>,
    UserId(user_id): UserId,
    Json(cluster): Json<ClusterBean>,
) -> Result<Response, ApiError> {
    let cluster = state.controller.update_cluster(cluster, user_id).await?;
    Ok(Json(cluster).into_response())
}

pub async fn delete_cluster(
    State(state): State<Arc<CoreState>>,
    UserId(user_id): UserId,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    state.controller.delete_cluster(id, user_id).await?;
    Ok(().into_response())
}

pub async fn set_cluster_description(
    State(state): State<Arc<CoreState>>,
    UserId(user_id): UserId,
    Json(update): Json<ClusterDescriptionUpdate>,
) -> Result<Response, ApiError> {
    let cluster = state
        .controller
        .set_cluster_description(update.id, &update.description, user_id)
        .await?;
    Ok(Json(cluster).into_response())
}

pub async fn cluster_autocomplete(
    State(state): State<Arc<CoreState>>,
) -> Result<Response, ApiError> {
    let clusters = state.controller.find_all_clusters_for_autocomplete().await?;
    Ok(Json(clusters).into_response())
}

pub async fn all_cluster_namespaces(State(state): State<Arc<CoreState>>) -> Response {
    Json(state.controller.get_all_cluster_namespaces()).into_response()
}

pub async fn cluster_namespaces(
    State(state): State<Arc<CoreState>>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let namespaces = state.controller.find_all_namespaces_by_cluster_id(id).await?;
    Ok(Json(namespaces).into_response())
}

pub async fn validate_kubeconfig(
    State(state): State<Arc<CoreState>>,
    Json(req): Json<KubeconfigRequest>,
) -> Result<Response, ApiError> {
    let result = state.controller.validate_kubeconfig(&req.config).await?;
    Ok(Json(result).into_response())
}
