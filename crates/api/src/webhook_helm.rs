use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use devplane_common::helm::HelmAppCreateUpdateRequest;
use devplane_rpc::error::ApiError;
use serde_json::json;

use crate::state::CoreState;

pub async fn create_or_update_helm_app(
    State(state): State<Arc<CoreState>>,
    Json(req): Json<HelmAppCreateUpdateRequest>,
) -> Result<Response, ApiError> {
    let url = state.controller.create_or_update_helm_app(req).await?;
    Ok(Json(json!({ "detailUrl": url.unwrap_or_default() })).into_response())
}
