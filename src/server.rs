use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use lettre::{transport::smtp::authentication::Credentials, AsyncSmtpTransport, Tokio1Executor};
use redis::aio::ConnectionManager;
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{add_extension::AddExtensionLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    config::Config,
    handlers::{login, oauth, pages, session, webhook},
    providers::Providers,
};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub(crate) struct State {
    pub(crate) config: Config,
    pub(crate) db: DatabaseConnection,
    pub(crate) redis_manager: ConnectionManager,
    pub(crate) mailsender: AsyncSmtpTransport<Tokio1Executor>,
    /// Shared client for provider token and profile requests.
    pub(crate) http: reqwest::Client,
    pub(crate) providers: Providers,
}

impl State {
    /// Attempt to create a new State instance
    pub(crate) async fn try_new(config: Config) -> Result<State> {
        let db = Database::connect(config.database_url.as_str())
            .await
            .context("failed to connect to the database")?;

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis_manager = ConnectionManager::new(redis_client)
            .await
            .context("failed to connect to redis")?;

        let mailsender = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
            .build();

        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let providers = Providers::from_config(&config);

        Ok(State {
            config,
            db,
            redis_manager,
            mailsender,
            http,
            providers,
        })
    }
}

pub(crate) fn router(state: Arc<State>) -> Router {
    Router::new()
        .route("/health", get(pages::health))
        .route("/sign-in", get(login::sign_in_page))
        .route("/sign-in/email", post(login::email_sign_in))
        .route("/verify-request", get(pages::verify_request))
        .route("/error", get(pages::error_page))
        .route(
            "/api/auth/signin/:provider",
            get(oauth::provider_sign_in).post(oauth::provider_sign_in_form),
        )
        .route("/api/auth/callback/:provider", get(oauth::callback))
        .route("/api/auth/session", get(session::get_session))
        .route("/api/auth/signout", post(session::sign_out))
        .route("/api/webhooks/stripe", post(webhook::stripe_webhook))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(AddExtensionLayer::new(state)),
        )
}

/// Run the server.
pub(crate) async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("plansync_server=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr = config.addr;

    let state = Arc::new(State::try_new(config).await?);
    tracing::info!(
        providers = ?state.providers.iter().map(|p| p.id()).collect::<Vec<_>>(),
        "enabled sign in providers"
    );

    tracing::info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(router(state).into_make_service())
        .await?;
    Ok(())
}
