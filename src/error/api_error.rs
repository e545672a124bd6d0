use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::store::StoreError;

/// Every failure a handler can surface, with its wire mapping.
///
/// Status codes and bodies are part of the protocol contract and must not
/// drift: clients match on the literal body strings.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("object not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    /// No admission slot became free within the queue timeout.
    #[error("admission queue timeout")]
    QueueTimeout,

    /// An async striped write completed with an error.
    #[error("upload failed")]
    UploadFailed,

    #[error("internal server error")]
    Internal,

    /// The store driver refused to accept an async write.
    #[error("failed to submit async write")]
    AioSubmit,

    /// The cluster status probe failed.
    #[error("store unreachable")]
    StoreDown,

    /// DDoS filter verdict: drop the connection without a useful response.
    #[error("rejected")]
    Rejected,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UnAuthorized"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "object not found"),
            ApiError::BadRequest(msg) => {
                tracing::warn!("bad request: {msg}");
                (StatusCode::BAD_REQUEST, "error")
            }
            ApiError::QueueTimeout => (StatusCode::REQUEST_TIMEOUT, "server is too busy,timeout"),
            ApiError::UploadFailed => (StatusCode::REQUEST_TIMEOUT, "error"),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            ApiError::AioSubmit => (StatusCode::NOT_IMPLEMENTED, "error"),
            ApiError::StoreDown => (StatusCode::GATEWAY_TIMEOUT, "error"),
            ApiError::Rejected => {
                // No hijack in this stack; a 444-style empty close denies the
                // offender any response signal at minimal cost.
                let mut res = ().into_response();
                *res.status_mut() =
                    StatusCode::from_u16(444).unwrap_or(StatusCode::FORBIDDEN);
                res.headers_mut()
                    .insert(header::CONNECTION, HeaderValue::from_static("close"));
                return res;
            }
        };
        (status, body).into_response()
    }
}

/// Pool open, striper create, state, read, and delete failures all surface
/// as a 404 to the client.
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::warn!("store error: {err}");
        ApiError::NotFound
    }
}
