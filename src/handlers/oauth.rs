use axum::{
    body::Body,
    extract::{Extension, Form, Path, Query},
    http::Response,
};
use entity::user;
use redis::AsyncCommands;
use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    actions::{self, NewUser},
    auth::start_session,
    config::Config,
    constants::{
        ACCOUNT_NOT_LINKED, EMAIL_PROVIDER_ID, OAUTH_STATE_EXPIRY_SECONDS, OAUTH_STATE_PREFIX,
        SIGN_IN_PATH, VERIFY_KEY_PREFIX,
    },
    error::ServerError,
    handlers::{
        error_redirect,
        login::{sign_in, SignInRequest},
        redirect, redirect_with_cookie, safe_callback_url,
    },
    pending::{self, PendingEmail, PendingOAuth},
    providers::{Profile, TokenSet},
    server::State,
    utils::{pkce::generate_code_verifier, RKeys},
};

/// Query or form input selecting where to land after signing in.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProviderSignInParams {
    #[serde(rename = "callbackUrl", default)]
    callback_url: Option<String>,
}

/// Query of `GET /api/auth/callback/:provider`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    /// Magic link token, only for the email provider.
    token: Option<String>,
    error: Option<String>,
}

/// How an OAuth identity maps onto a local user.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OAuthOutcome {
    SignedIn(user::Model),
    /// The profile email belongs to a user who signed up another way.
    AccountNotLinked,
    /// The account row points at a user that no longer exists.
    MissingUser,
}

/// Handler for `GET /api/auth/signin/:provider`
pub(crate) async fn provider_sign_in(
    Path(provider): Path<String>,
    Query(params): Query<ProviderSignInParams>,
    Extension(state): Extension<Arc<State>>,
) -> Result<Response<Body>, ServerError> {
    start_provider_sign_in(&state, provider, params).await
}

/// Handler for `POST /api/auth/signin/:provider`
pub(crate) async fn provider_sign_in_form(
    Path(provider): Path<String>,
    Extension(state): Extension<Arc<State>>,
    Form(params): Form<ProviderSignInParams>,
) -> Result<Response<Body>, ServerError> {
    start_provider_sign_in(&state, provider, params).await
}

async fn start_provider_sign_in(
    state: &State,
    provider: String,
    params: ProviderSignInParams,
) -> Result<Response<Body>, ServerError> {
    let callback_url = safe_callback_url(params.callback_url.as_deref(), &state.config);
    sign_in(
        state,
        SignInRequest::OAuth {
            provider,
            callback_url,
        },
    )
    .await
}

/// Remember the pending authorization and send the browser to the provider's consent screen.
pub(crate) async fn authorize(
    state: &State,
    provider_id: &str,
    callback_url: String,
) -> Result<Response<Body>, ServerError> {
    let provider = match state.providers.get(provider_id) {
        Some(provider) => provider,
        None => {
            tracing::warn!(provider = %provider_id, "sign in with unconfigured provider");
            return error_redirect("Configuration");
        }
    };

    let RKeys {
        base_key,
        prefixed_key,
    } = RKeys::generate(OAUTH_STATE_PREFIX);
    let code_verifier = generate_code_verifier();

    let url = provider.authorization_url(
        &callback_uri(&state.config, provider.id()),
        &base_key,
        &code_verifier,
    )?;

    let pending = PendingOAuth {
        provider: provider.id().to_owned(),
        code_verifier,
        callback_url,
    };
    let _: () = state
        .redis_manager
        .clone()
        .set_ex(&prefixed_key, pending, OAUTH_STATE_EXPIRY_SECONDS)
        .await?;

    redirect(url.as_str())
}

/// Handler for `GET /api/auth/callback/:provider`
pub(crate) async fn callback(
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    Extension(state): Extension<Arc<State>>,
) -> Result<Response<Body>, ServerError> {
    if provider == EMAIL_PROVIDER_ID {
        email_callback(&state, params.token).await
    } else {
        oauth_callback(&state, &provider, params).await
    }
}

async fn email_callback(
    state: &State,
    token: Option<String>,
) -> Result<Response<Body>, ServerError> {
    let token = match token {
        Some(token) => token,
        None => return error_redirect("Verification"),
    };

    let key = format!("{}{}", VERIFY_KEY_PREFIX, token);
    let pending: Option<PendingEmail> =
        pending::take(&mut state.redis_manager.clone(), &key).await?;
    let pending = match pending {
        Some(pending) => pending,
        None => {
            tracing::info!("unknown or expired sign in link");
            return error_redirect("Verification");
        }
    };

    let user = redeem_magic_link(&state.db, &pending.email).await?;
    tracing::info!(user_id = %user.id, "signed in by email");

    let cookie = start_session(&user, &state.config.auth_secret, state.config.secure_cookies())?;
    redirect_with_cookie(&pending.callback_url, &cookie)
}

async fn oauth_callback(
    state: &State,
    provider_id: &str,
    params: CallbackParams,
) -> Result<Response<Body>, ServerError> {
    if let Some(error) = &params.error {
        tracing::warn!(provider = %provider_id, %error, "authorization was not granted");
        return error_redirect("OAuthCallback");
    }

    let (code, oauth_state) = match (params.code, params.state) {
        (Some(code), Some(oauth_state)) => (code, oauth_state),
        _ => return error_redirect("OAuthCallback"),
    };

    let key = format!("{}{}", OAUTH_STATE_PREFIX, oauth_state);
    let pending: Option<PendingOAuth> =
        pending::take(&mut state.redis_manager.clone(), &key).await?;
    let pending = match pending {
        Some(pending) if pending.provider == provider_id => pending,
        _ => {
            tracing::warn!(provider = %provider_id, "callback with unknown state");
            return error_redirect("OAuthCallback");
        }
    };

    let provider = match state.providers.get(provider_id) {
        Some(provider) => provider,
        None => return error_redirect("Configuration"),
    };

    let redirect_uri = callback_uri(&state.config, provider.id());
    let tokens = match provider
        .exchange_code(&state.http, &code, &redirect_uri, &pending.code_verifier)
        .await
    {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::error!(provider = %provider_id, "code exchange failed: {:?}", e);
            return error_redirect("OAuthCallback");
        }
    };
    let profile = match provider.fetch_profile(&state.http, &tokens).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::error!(provider = %provider_id, "profile fetch failed: {:?}", e);
            return error_redirect("OAuthCallback");
        }
    };

    match complete_oauth(&state.db, provider.id(), &profile, &tokens).await? {
        OAuthOutcome::SignedIn(user) => {
            tracing::info!(provider = %provider_id, user_id = %user.id, "signed in");
            let cookie =
                start_session(&user, &state.config.auth_secret, state.config.secure_cookies())?;
            redirect_with_cookie(&pending.callback_url, &cookie)
        }
        OAuthOutcome::AccountNotLinked => {
            tracing::info!(provider = %provider_id, "email already in use by another account");
            redirect(&format!("{}?error={}", SIGN_IN_PATH, ACCOUNT_NOT_LINKED))
        }
        OAuthOutcome::MissingUser => {
            tracing::error!(provider = %provider_id, "account is linked to a missing user");
            error_redirect("OAuthCallback")
        }
    }
}

/// Redirect uri registered with a provider.
pub(crate) fn callback_uri(config: &Config, provider_id: &str) -> String {
    config.absolute_url(&format!("/api/auth/callback/{}", provider_id))
}

/// Resolve a provider identity to a user, creating and linking one on first sign in.
///
/// Identities are never linked to an existing user by email.
pub(crate) async fn complete_oauth(
    db: &DatabaseConnection,
    provider: &str,
    profile: &Profile,
    tokens: &TokenSet,
) -> Result<OAuthOutcome, DbErr> {
    if let Some(account) = actions::find_account(db, provider, &profile.id).await? {
        return Ok(match actions::find_user(db, account.user_id).await? {
            Some(user) => OAuthOutcome::SignedIn(user),
            None => OAuthOutcome::MissingUser,
        });
    }

    let email = profile.email.as_deref().map(|email| email.trim().to_lowercase());
    if let Some(email) = &email {
        if actions::find_user_by_email(db, email).await?.is_some() {
            return Ok(OAuthOutcome::AccountNotLinked);
        }
    }

    let new_user = NewUser {
        name: profile.name.clone(),
        email,
        image: profile.image.clone(),
    };

    // a user without its account would be locked out of this provider
    let txn = db.begin().await?;
    let created = async {
        let user = actions::create_user(&txn, new_user).await?;
        actions::link_account(&txn, user.id, provider, profile, tokens).await?;
        Ok::<_, DbErr>(user)
    }
    .await;

    match created {
        Ok(user) => {
            txn.commit().await?;
            Ok(OAuthOutcome::SignedIn(user))
        }
        Err(e) => {
            txn.rollback().await?;
            Err(e)
        }
    }
}

/// The user behind a redeemed magic link, created on first use. Redeeming proves the address.
pub(crate) async fn redeem_magic_link(
    db: &DatabaseConnection,
    email: &str,
) -> Result<user::Model, DbErr> {
    let user = actions::find_user_by_email_or_create(db, email).await?;
    actions::mark_email_verified(db, user.id).await?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::tests::user_model;
    use crate::config::tests::{base_env, config_from};
    use entity::account;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use ulid::Ulid;
    use uuid::Uuid;

    fn profile(email: Option<&str>) -> Profile {
        Profile {
            id: "4242".to_owned(),
            name: Some("Ada".to_owned()),
            email: email.map(str::to_owned),
            image: None,
        }
    }

    fn tokens() -> TokenSet {
        TokenSet {
            access_token: "gho_token".to_owned(),
            token_type: Some("bearer".to_owned()),
            refresh_token: None,
            expires_in: Some(3600),
            scope: Some("read:user user:email".to_owned()),
            id_token: None,
        }
    }

    fn account_for(user: &user::Model) -> account::Model {
        account::Model {
            id: Uuid::from(Ulid::new()),
            user_id: user.id,
            account_type: "oauth".to_owned(),
            provider: "github".to_owned(),
            provider_account_id: "4242".to_owned(),
            access_token: Some("gho_token".to_owned()),
            refresh_token: None,
            expires_at: None,
            token_type: Some("bearer".to_owned()),
            scope: None,
            id_token: None,
        }
    }

    fn exec_ok() -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }
    }

    #[test]
    fn callback_uri_is_absolute() {
        let config = config_from(&base_env()).unwrap();
        assert_eq!(
            callback_uri(&config, "github"),
            "http://localhost:3000/api/auth/callback/github"
        );
    }

    #[tokio::test]
    async fn linked_account_signs_in_its_user() {
        let user = user_model(None);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![account_for(&user)]])
            .append_query_results(vec![vec![user.clone()]])
            .into_connection();

        let outcome = complete_oauth(&db, "github", &profile(Some("ada@example.com")), &tokens())
            .await
            .unwrap();

        assert_eq!(outcome, OAuthOutcome::SignedIn(user));
        assert_eq!(db.into_transaction_log().len(), 2);
    }

    #[tokio::test]
    async fn email_of_another_user_is_not_linked() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<account::Model>::new()])
            .append_query_results(vec![vec![user_model(None)]])
            .into_connection();

        let outcome = complete_oauth(&db, "github", &profile(Some("Ada@Example.com")), &tokens())
            .await
            .unwrap();

        assert_eq!(outcome, OAuthOutcome::AccountNotLinked);
        // account lookup + email lookup, nothing written
        assert_eq!(db.into_transaction_log().len(), 2);
    }

    #[tokio::test]
    async fn first_sign_in_creates_and_links() {
        let user = user_model(None);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<account::Model>::new()])
            .append_query_results(vec![Vec::<user::Model>::new(), vec![user.clone()]])
            .append_query_results(vec![vec![account_for(&user)]])
            .append_exec_results(vec![exec_ok()])
            .into_connection();

        let outcome = complete_oauth(&db, "github", &profile(Some("ada@example.com")), &tokens())
            .await
            .unwrap();

        assert_eq!(outcome, OAuthOutcome::SignedIn(user));
        // account lookup, email lookup, then one transaction for insert + link + verify
        let log = db.into_transaction_log();
        assert_eq!(log.len(), 3);
        assert!(format!("{:?}", log[2]).contains("COMMIT"));
    }

    #[tokio::test]
    async fn failed_link_leaves_no_user_behind() {
        let user = user_model(None);
        // nothing queued for the account insert
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<account::Model>::new()])
            .append_query_results(vec![Vec::<user::Model>::new(), vec![user]])
            .into_connection();

        let result = complete_oauth(&db, "github", &profile(Some("ada@example.com")), &tokens()).await;
        assert!(result.is_err());

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("ROLLBACK"));
        assert!(!log.contains("COMMIT"));
    }

    #[tokio::test]
    async fn dangling_account_is_reported() {
        let user = user_model(None);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![account_for(&user)]])
            .append_query_results(vec![Vec::<user::Model>::new()])
            .into_connection();

        let outcome = complete_oauth(&db, "github", &profile(None), &tokens())
            .await
            .unwrap();
        assert_eq!(outcome, OAuthOutcome::MissingUser);
    }

    #[tokio::test]
    async fn magic_link_marks_the_email_verified() {
        let user = user_model(None);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![user.clone()]])
            .append_exec_results(vec![exec_ok()])
            .into_connection();

        let redeemed = redeem_magic_link(&db, "ada@example.com").await.unwrap();
        assert_eq!(redeemed.id, user.id);
        // lookup + verified update
        assert_eq!(db.into_transaction_log().len(), 2);
    }
}
