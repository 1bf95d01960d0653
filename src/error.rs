use axum::{
    extract::rejection::{ExtensionRejection, FormRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

const INTERNAL_SERVER_ERROR_MESSAGE: &str = "Something went wrong on our end.";

/// Any possible server errors
#[derive(Debug, Error)]
pub(crate) enum ServerError {
    #[error(transparent)]
    AxumFormRejection(#[from] FormRejection),

    #[error(transparent)]
    AxumExtensionRejection(#[from] ExtensionRejection),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Provider returned an unusable profile: {0}")]
    UnusableProfile(String),

    #[error(transparent)]
    DbError(#[from] sea_orm::DbErr),

    #[error(transparent)]
    RedisError(#[from] redis::RedisError),

    #[error(transparent)]
    MailBuildError(#[from] lettre::error::Error),

    #[error(transparent)]
    MailAddressError(#[from] lettre::address::AddressError),

    #[error(transparent)]
    SmtpError(#[from] lettre::transport::smtp::Error),

    #[error(transparent)]
    HttpClientError(#[from] reqwest::Error),

    #[error(transparent)]
    UrlError(#[from] url::ParseError),

    #[error(transparent)]
    TemplateError(#[from] tera::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    #[error(transparent)]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    HttpError(#[from] axum::http::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::AxumFormRejection(_)
            | ServerError::InvalidSignature
            | ServerError::MalformedBody(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            e => {
                tracing::error!("Internal error occurred: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_SERVER_ERROR_MESSAGE.into(),
                )
            }
        }
        .into_response()
    }
}
