use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use devplane_common::chart_repo::ChartRepoDto;
use devplane_rpc::error::ApiError;
use serde_json::json;

use crate::state::{CoreState, UserId};

pub async fn list_chart_repos(State(state): State<Arc<CoreState>>) -> Result<Response, ApiError> {
    let repos = state.controller.get_chart_repo_list().await?;
    Ok(Json(repos).into_response())
}

pub async fn get_chart_repo(
    State(state): State<Arc<CoreState>>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let repo = state.controller.get_chart_repo_by_id(id).await?;
    Ok(Json(repo).into_response())
}

pub async fn get_chart_repo_by_name(
    State(state): State<Arc<CoreState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let repo = state.controller.get_chart_repo_by_name(&name).await?;
    Ok(Json(repo).into_response())
}

pub async fn create_chart_repo(
    State(state): State<Arc<CoreState>>,
    UserId(user_id): UserId,
    Json(repo): Json<ChartRepoDto>,
) -> Result<Response, ApiError> {
    let repo = state.controller.create_chart_repo(repo, user_id).await?;
    Ok(Json(repo).into_response())
}

pub async fn update_chart_repo(
    State(state): State<Arc<CoreState>>,
    UserId(user_id): UserId,
    Json(repo): Json<ChartRepoDto>,
) -> Result<Response, ApiError> {
    let repo = state.controller.update_chart_repo(repo, user_id).await?;
    Ok(Json(repo).into_response())
}

pub async fn delete_chart_repo(
    State(state): State<Arc<CoreState>>,
    UserId(user_id): UserId,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    state.controller.delete_chart_repo(id, user_id).await?;
    Ok(().into_response())
}

/// Always 200, the outcome is in the body.
pub async fn validate_chart_repo(
    State(state): State<Arc<CoreState>>,
    Json(repo): Json<ChartRepoDto>,
) -> Response {
    Json(state.controller.validate_chart_repo(&repo).await).into_response()
}

pub async fn trigger_chart_sync(State(state): State<Arc<CoreState>>) -> Result<Response, ApiError> {
    let job = state.controller.trigger_chart_sync_manual().await?;
    Ok(Json(json!({ "job": job })).into_response())
}
