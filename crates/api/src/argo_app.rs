use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use devplane_rpc::error::ApiError;
use serde::Deserialize;

use crate::{cluster::parse_ids, state::CoreState};

#[derive(Debug, Default, Deserialize)]
pub struct ArgoAppListQuery {
    /// Comma separated cluster ids, every active cluster when absent.
    pub cluster_ids: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArgoAppDetailQuery {
    pub name: String,
    pub namespace: String,
    pub cluster_id: i32,
}

pub async fn list_argo_apps(
    State(state): State<Arc<CoreState>>,
    Query(query): Query<ArgoAppListQuery>,
) -> Result<Response, ApiError> {
    let ids = query.cluster_ids.as_deref().map(parse_ids).transpose()?;
    let apps = state.controller.list_argo_apps(ids).await?;
    Ok(Json(apps).into_response())
}

pub async fn argo_app_detail(
    State(state): State<Arc<CoreState>>,
    Query(query): Query<ArgoAppDetailQuery>,
) -> Result<Response, ApiError> {
    let detail = state
        .controller
        .argo_app_detail(&query.name, &query.namespace, query.cluster_id)
        .await?;
    Ok(Json(detail).into_response())
}

pub async fn argo_app_detail_by_app_id(
    State(state): State<Arc<CoreState>>,
    Path(app_id): Path<String>,
) -> Result<Response, ApiError> {
    let detail = state.controller.argo_app_detail_by_app_id(&app_id).await?;
    Ok(Json(detail).into_response())
}
