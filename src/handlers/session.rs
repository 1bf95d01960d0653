use axum::{
    body::Body,
    extract::Extension,
    http::{header, Response, StatusCode},
};
use std::sync::Arc;

use crate::{
    auth::{expired_session_cookie, Auth},
    constants::SIGN_IN_PATH,
    error::ServerError,
    handlers::redirect_with_cookie,
    server::State,
};

/// Handler for `GET /api/auth/session`
///
/// Answers `{}` when nobody is signed in.
pub(crate) async fn get_session(auth: Auth) -> Result<Response<Body>, ServerError> {
    let body = match auth {
        Auth::KnownUser(session) => serde_json::to_vec(&session)?,
        Auth::UnknownUser => b"{}".to_vec(),
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))?)
}

/// Handler for `POST /api/auth/signout`
pub(crate) async fn sign_out(
    Extension(state): Extension<Arc<State>>,
) -> Result<Response<Body>, ServerError> {
    redirect_with_cookie(
        SIGN_IN_PATH,
        &expired_session_cookie(state.config.secure_cookies()),
    )
}
