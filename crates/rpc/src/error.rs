use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    Unauthenticated,
    Unauthorized,
    InvalidRequest(String),
    NotFound(String),
    Conflict(String),
    NotReachable(String),
    Upstream(String),
    InternalError(String),
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err: anyhow::Error = err.into();
        Self::InternalError(format!("{err:#}"))
    }
}

impl ApiError {
    /// Wraps an error coming back from a cluster or a side-car, collapsing
    /// messages that are too long to show.
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(devplane_common::bounded_error(msg))
    }

    pub fn not_reachable(reason: &str) -> Self {
        Self::NotReachable(format!(
            "cluster is not reachable: {}",
            devplane_common::bounded_error(reason)
        ))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ApiError::*;
        let err = match self {
            Unauthenticated => "Not authenticated",
            Unauthorized => "Not authorized",
            InvalidRequest(s) | NotFound(s) | Conflict(s) | NotReachable(s) | Upstream(s) => s,
            InternalError(_) => "Internal Server Error",
        };
        f.write_str(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use ApiError::*;
        match &self {
            InternalError(e) => tracing::error!("internal server error: {e}"),
            Upstream(e) => tracing::warn!("upstream error: {e}"),
            _ => {}
        }
        let status = match self {
            Unauthenticated => StatusCode::FORBIDDEN,
            Unauthorized => StatusCode::UNAUTHORIZED,
            InvalidRequest(_) => StatusCode::BAD_REQUEST,
            NotFound(_) => StatusCode::NOT_FOUND,
            Conflict(_) => StatusCode::CONFLICT,
            NotReachable(_) => StatusCode::FAILED_DEPENDENCY,
            Upstream(_) => StatusCode::BAD_GATEWAY,
            InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(serde_json::json!({
                "error": self.to_string(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_details() {
        let err = ApiError::from(anyhow::anyhow!("db password is hunter2"));
        assert!(matches!(err, ApiError::InternalError(_)));
        assert_eq!(err.to_string(), "Internal Server Error");
    }

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (ApiError::InvalidRequest("bad".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("missing".into()), StatusCode::NOT_FOUND),
            (ApiError::Conflict("in use".into()), StatusCode::CONFLICT),
            (ApiError::not_reachable("timeout"), StatusCode::FAILED_DEPENDENCY),
            (ApiError::upstream("boom"), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn long_upstream_messages_are_collapsed() {
        let err = ApiError::upstream("x".repeat(3000));
        assert_eq!(err.to_string(), devplane_common::UNABLE_TO_CONNECT_ERROR);
        assert_eq!(
            ApiError::not_reachable("dial tcp: i/o timeout").to_string(),
            "cluster is not reachable: dial tcp: i/o timeout"
        );
    }
}
