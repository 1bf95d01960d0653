//! Runtime configuration, read once from the environment at startup.

use anyhow::{Context, Result};
use lettre::message::Mailbox;
use std::collections::HashMap;
use std::net::SocketAddr;
use url::Url;

use crate::providers::PROVIDERS;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_EMAIL_FROM: &str = "onboarding@resend.dev";

/// Client id/secret pair issued by an OAuth provider.
#[derive(Debug, Clone)]
pub(crate) struct ClientCredentials {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) addr: SocketAddr,
    pub(crate) database_url: String,
    pub(crate) redis_url: String,
    /// External origin used to build callback and sign-in links.
    pub(crate) base_url: Url,
    pub(crate) auth_secret: String,
    pub(crate) default_redirect: String,
    pub(crate) smtp_host: String,
    pub(crate) smtp_username: String,
    pub(crate) smtp_password: String,
    pub(crate) email_from: Mailbox,
    /// When set, incoming Stripe webhooks must carry a valid signature.
    pub(crate) stripe_webhook_secret: Option<String>,
    /// Keyed by provider id; a provider without both values is left out.
    pub(crate) oauth_credentials: HashMap<&'static str, ClientCredentials>,
}

impl Config {
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key).with_context(|| format!("{} is not set in env", key))
        };

        let addr = lookup("ADDR")
            .unwrap_or_else(|| DEFAULT_ADDR.to_owned())
            .parse()
            .context("ADDR must be a socket address")?;
        let base_url = Url::parse(&lookup("BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()))
            .context("BASE_URL must be an absolute url")?;
        let email_from = lookup("EMAIL_FROM")
            .unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_owned())
            .parse()
            .context("EMAIL_FROM must be a mailbox")?;

        let mut oauth_credentials = HashMap::new();
        for provider in PROVIDERS {
            let client_id = lookup(&format!("{}_CLIENT_ID", provider.env_prefix));
            let client_secret = lookup(&format!("{}_CLIENT_SECRET", provider.env_prefix));
            if let (Some(client_id), Some(client_secret)) = (client_id, client_secret) {
                oauth_credentials.insert(
                    provider.id,
                    ClientCredentials {
                        client_id,
                        client_secret,
                    },
                );
            }
        }

        Ok(Config {
            addr,
            database_url: require("DATABASE_URL")?,
            redis_url: require("REDIS_URL")?,
            base_url,
            auth_secret: require("AUTH_SECRET")?,
            default_redirect: lookup("DEFAULT_REDIRECT").unwrap_or_else(|| "/".to_owned()),
            smtp_host: require("SMTP_HOST")?,
            smtp_username: require("SMTP_USERNAME")?,
            smtp_password: require("SMTP_PASSWORD")?,
            email_from,
            stripe_webhook_secret: lookup("STRIPE_WEBHOOK_SECRET").filter(|s| !s.is_empty()),
            oauth_credentials,
        })
    }

    /// Cookies only get the `Secure` attribute when we are served over https.
    pub(crate) fn secure_cookies(&self) -> bool {
        self.base_url.scheme() == "https"
    }

    /// Host (and port, if any) shown to users in emails.
    pub(crate) fn display_host(&self) -> String {
        match (self.base_url.host_str(), self.base_url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_owned(),
            _ => self.base_url.to_string(),
        }
    }

    /// Absolute url for a path on this server.
    pub(crate) fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}
