use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use devplane_common::environment::EnvironmentBean;
use devplane_rpc::error::ApiError;
use serde::Deserialize;

use crate::state::{CoreState, UserId};

#[derive(Debug, Default, Deserialize)]
pub struct EnvironmentQuery {
    pub cluster_id: Option<i32>,
    /// Include soft deleted environments.
    #[serde(default)]
    pub all: bool,
}

pub async fn list_environments(
    State(state): State<Arc<CoreState>>,
    Query(query): Query<EnvironmentQuery>,
) -> Result<Response, ApiError> {
    let envs = match query.cluster_id {
        Some(cluster_id) => {
            state
                .controller
                .get_environments_by_cluster_id(cluster_id)
                .await?
        }
        None if query.all => state.controller.get_all_environments().await?,
        None => state.controller.get_all_active_environments().await?,
    };
    Ok(Json(envs).into_response())
}

pub async fn get_environment(
    State(state): State<Arc<CoreState>>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let env = state.controller.find_environment_by_id(id).await?;
    Ok(Json(env).into_response())
}

pub async fn get_environment_by_name(
    State(state): State<Arc<CoreState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let env = state.controller.find_environment_by_name(&name).await?;
    Ok(Json(env).into_response())
}

pub async fn create_environment(
    State(state): State<Arc<CoreState>>,
    UserId(user_id): UserId,
    Json(env): Json<EnvironmentBean>,
) -> Result<Response, ApiError> {
    let env = state.controller.create_environment(env, user_id).await?;
    Ok(Json(env).into_response())
}

pub async fn update_environment(
    State(state): State<Arc<CoreState>>,
    UserId(user_id): UserId,
    Json(env): Json<EnvironmentBean>,
) -> Result<Response, ApiError> {
    let env = state.controller.update_environment(env, user_id).await?;
    Ok(Json(env).into_response())
}

pub async fn delete_environment(
    State(state): State<Arc<CoreState>>,
    UserId(user_id): UserId,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    state.controller.delete_environment(id, user_id).await?;
    Ok(().into_response())
}
