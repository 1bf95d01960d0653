use axum::{
    body::Body,
    http::{header, Response, StatusCode},
};
use url::Url;

use crate::config::Config;
use crate::constants::ERROR_PATH;
use crate::error::ServerError;

pub(crate) mod login;
pub(crate) mod oauth;
pub(crate) mod pages;
pub(crate) mod session;
pub(crate) mod webhook;

/// See-other redirect, so a form POST is followed by a GET.
pub(crate) fn redirect(location: &str) -> Result<Response<Body>, ServerError> {
    Ok(Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(header::LOCATION, location)
        .body(Body::empty())?)
}

pub(crate) fn redirect_with_cookie(
    location: &str,
    cookie: &str,
) -> Result<Response<Body>, ServerError> {
    Ok(Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(header::LOCATION, location)
        .header(header::SET_COOKIE, cookie)
        .body(Body::empty())?)
}

/// Send the browser to the error page with one of its known codes.
pub(crate) fn error_redirect(code: &str) -> Result<Response<Body>, ServerError> {
    redirect(&format!("{}?error={}", ERROR_PATH, code))
}

pub(crate) fn html(status: StatusCode, page: String) -> Result<Response<Body>, ServerError> {
    Ok(Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Body::from(page))?)
}

/// Where to send the user after signing in.
///
/// Relative paths and urls on our own origin are kept, anything else falls back to the default redirect.
pub(crate) fn safe_callback_url(requested: Option<&str>, config: &Config) -> String {
    match requested.map(str::trim).filter(|url| !url.is_empty()) {
        Some(path) if path.starts_with('/') => {
            if path.starts_with("//") || path.starts_with("/\\") {
                config.default_redirect.clone()
            } else {
                path.to_owned()
            }
        }
        Some(url) => match Url::parse(url) {
            Ok(parsed) if parsed.origin() == config.base_url.origin() => parsed.to_string(),
            _ => config.default_redirect.clone(),
        },
        None => config.default_redirect.clone(),
    }
}
