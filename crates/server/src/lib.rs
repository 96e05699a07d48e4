//! WebSocket and HTTP entrypoint for the voice gateway: wires the config,
//! upstream adapters, memory engine, and tool registry into an `AppState`,
//! then exposes that state through an `axum` router.

pub mod http;
pub mod rate_limit;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced at the HTTP/WS boundary, outside the per-turn
/// `GatewayError` taxonomy (that one rides the wire `ERROR` frame instead).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("rate limit exceeded")]
    RateLimited,

    #[error("upstream dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServerError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        StatusCode::from(&err)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        (status, self.to_string()).into_response()
    }
}
