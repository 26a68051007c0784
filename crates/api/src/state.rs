use axum::{extract::FromRequestParts, http::request::Parts};
use devplane_db::api::DbApi;
use devplane_rpc::error::ApiError;

use crate::controller::Controller;

pub const USER_ID_HEADER: &str = "x-user-id";
const DEFAULT_USER_ID: i32 = 1;

pub struct CoreState {
    pub db: DbApi,
    pub controller: Controller,
}

impl CoreState {
    pub fn new(controller: Controller) -> Self {
        Self {
            db: controller.db.clone(),
            controller,
        }
    }
}

/// The acting user, recorded in the audit columns. Authentication happens
/// in front of this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub i32);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_ID_HEADER) else {
            return Ok(UserId(DEFAULT_USER_ID));
        };
        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .map(UserId)
            .ok_or_else(|| ApiError::InvalidRequest(format!("invalid {USER_ID_HEADER} header")))
    }
}
