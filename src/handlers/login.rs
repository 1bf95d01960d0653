use axum::{
    async_trait,
    body::Body,
    extract::{rejection::FormRejection, Extension, Form, Query},
    http::{Response, StatusCode},
};
use redis::AsyncCommands;
use serde::Deserialize;
use std::sync::Arc;
use validator::{Validate, ValidationErrors};

use crate::{
    config::Config,
    constants::{EMAIL_PROVIDER_ID, VERIFY_EXPIRY_SECONDS, VERIFY_KEY_PREFIX, VERIFY_REQUEST_PATH},
    error::ServerError,
    handlers::{html, oauth, redirect, safe_callback_url},
    pending::PendingEmail,
    providers::Providers,
    server::State,
    utils::{mail::send_magic_link, RKeys},
    views::{render_sign_in, sign_in_error_message, ProviderButton, SignInView},
};

/// Providers offered as buttons on the sign in page, in display order.
const LOGIN_BUTTONS: [&str; 3] = ["google", "github", "twitter"];

/// The form input of a `POST /sign-in/email` request.
#[derive(Debug, Validate, Deserialize)]
pub(crate) struct LoginForm {
    #[validate(email(message = "Invalid email"))]
    pub(crate) email: String,
    #[serde(rename = "callbackUrl", default)]
    pub(crate) callback_url: Option<String>,
}

/// A request to start signing in, either by email or through an OAuth provider.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SignInRequest {
    Email { email: String, callback_url: String },
    OAuth { provider: String, callback_url: String },
}

impl LoginForm {
    /// Validate the form and turn it into an email sign in request.
    pub(crate) fn dispatch(self, config: &Config) -> Result<SignInRequest, ValidationErrors> {
        self.validate()?;
        Ok(SignInRequest::Email {
            email: self.email.trim().to_lowercase(),
            callback_url: safe_callback_url(self.callback_url.as_deref(), config),
        })
    }
}

/// Query of `GET /sign-in`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SignInPageParams {
    error: Option<String>,
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
}

/// Handler for `GET /sign-in`
pub(crate) async fn sign_in_page(
    Query(params): Query<SignInPageParams>,
    Extension(state): Extension<Arc<State>>,
) -> Result<Response<Body>, ServerError> {
    let callback_url = safe_callback_url(params.callback_url.as_deref(), &state.config);
    let page = render_sign_in(&SignInView {
        error: sign_in_error_message(params.error.as_deref()),
        email: "",
        email_error: None,
        callback_url: &callback_url,
        providers: login_buttons(&state.providers),
    })?;
    html(StatusCode::OK, page)
}

/// Handler for `POST /sign-in/email`
pub(crate) async fn email_sign_in(
    Extension(state): Extension<Arc<State>>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response<Body>, ServerError> {
    let Form(input) = form?;
    let email = input.email.clone();
    let callback_url = safe_callback_url(input.callback_url.as_deref(), &state.config);

    match input.dispatch(&state.config) {
        Ok(request) => sign_in(&state, request).await,
        Err(errors) => {
            let page = render_sign_in(&SignInView {
                error: None,
                email: &email,
                email_error: field_message(&errors, "email"),
                callback_url: &callback_url,
                providers: login_buttons(&state.providers),
            })?;
            html(StatusCode::BAD_REQUEST, page)
        }
    }
}

/// Start a sign in, by email or through an OAuth provider.
pub(crate) async fn sign_in(
    state: &State,
    request: SignInRequest,
) -> Result<Response<Body>, ServerError> {
    match request {
        SignInRequest::Email {
            email,
            callback_url,
        } => email_magic_link(state, &email, callback_url).await,
        SignInRequest::OAuth {
            provider,
            callback_url,
        } => oauth::authorize(state, &provider, callback_url).await,
    }
}

/// Delivery of magic links.
#[async_trait]
pub(crate) trait MagicLinkSender {
    async fn deliver(&self, email: &str, callback_url: String) -> Result<(), ServerError>;
}

#[async_trait]
impl MagicLinkSender for State {
    /// Stores the pending sign in under a fresh token and mails its link.
    async fn deliver(&self, email: &str, callback_url: String) -> Result<(), ServerError> {
        let RKeys {
            base_key,
            prefixed_key,
        } = RKeys::generate(VERIFY_KEY_PREFIX);

        let pending = PendingEmail {
            email: email.to_owned(),
            callback_url,
        };
        let _: () = self
            .redis_manager
            .clone()
            .set_ex(&prefixed_key, pending, VERIFY_EXPIRY_SECONDS)
            .await?;

        let url = format!(
            "{}?token={}",
            self.config
                .absolute_url(&format!("/api/auth/callback/{}", EMAIL_PROVIDER_ID)),
            base_key
        );
        send_magic_link(
            &self.mailsender,
            &self.config.email_from,
            email,
            &self.config.display_host(),
            &url,
        )
        .await?;

        tracing::info!("sent sign in email");
        Ok(())
    }
}

/// Email sign in always lands on the verify page; delivery failures are only logged.
pub(crate) async fn email_magic_link<S>(
    sender: &S,
    email: &str,
    callback_url: String,
) -> Result<Response<Body>, ServerError>
where
    S: MagicLinkSender + Sync,
{
    if let Err(e) = sender.deliver(email, callback_url).await {
        tracing::error!("Failed to send sign in email: {:?}", e);
    }
    redirect(VERIFY_REQUEST_PATH)
}

fn login_buttons(providers: &Providers) -> Vec<ProviderButton> {
    LOGIN_BUTTONS
        .iter()
        .filter_map(|id| providers.get(id))
        .map(|provider| ProviderButton {
            id: provider.id(),
            name: provider.name(),
        })
        .collect()
}

fn field_message(errors: &ValidationErrors, field: &str) -> Option<String> {
    errors
        .field_errors()
        .get(field)
        .and_then(|errors| errors.first())
        .map(|error| {
            error
                .message
                .as_ref()
                .map(|message| message.to_string())
                .unwrap_or_else(|| error.code.to_string())
        })
}
