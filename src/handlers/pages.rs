use axum::{
    body::Body,
    extract::{Extension, Query},
    http::{header, Response, StatusCode},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::ServerError,
    handlers::html,
    server::State,
    views::{render_error, render_verify_request},
};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorParams {
    error: Option<String>,
}

/// Handler for `GET /health`
pub(crate) async fn health() -> Result<Response<Body>, ServerError> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"status":"ok"}"#))?)
}

/// Handler for `GET /verify-request`
pub(crate) async fn verify_request(
    Extension(state): Extension<Arc<State>>,
) -> Result<Response<Body>, ServerError> {
    html(
        StatusCode::OK,
        render_verify_request(&state.config.display_host())?,
    )
}

/// Handler for `GET /error`
pub(crate) async fn error_page(
    Query(params): Query<ErrorParams>,
) -> Result<Response<Body>, ServerError> {
    html(StatusCode::OK, render_error(params.error.as_deref())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_is_ok() {
        let response = health().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn error_page_renders_for_any_code() {
        for error in [None, Some("Verification".to_owned()), Some("<b>".to_owned())] {
            let response = error_page(Query(ErrorParams { error })).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
