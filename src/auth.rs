//! JWT sessions.
//!
//! A session is a signed token in an `HttpOnly` cookie. The user record stays
//! the source of truth for the role: every time a session is read, the role and
//! id claims are refreshed from the database.

use axum::{
    async_trait,
    extract::{Extension, FromRequest, RequestParts, TypedHeader},
    headers::Cookie,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use entity::{sea_orm_active_enums::UserRole, user};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{DatabaseConnection, DbErr};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    actions,
    constants::{SESSION_COOKIE_NAME, SESSION_DURATION_SECS},
    error::ServerError,
    server::State,
};

/// Session token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Claims {
    /// User id as a string, as issued.
    pub(crate) sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) role: Option<UserRole>,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) email: Option<String>,
    #[serde(default)]
    pub(crate) picture: Option<String>,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
}

impl Claims {
    pub(crate) fn for_user(user: &user::Model, now: DateTime<Utc>) -> Self {
        Claims {
            sub: user.id.to_string(),
            id: Some(user.id),
            role: Some(user.role),
            name: user.name.clone(),
            email: user.email.clone(),
            picture: user.image.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(SESSION_DURATION_SECS)).timestamp(),
        }
    }

    /// Take role and id from the current user record. Without a record the claims stay as issued.
    pub(crate) fn refreshed(mut self, user: Option<&user::Model>) -> Self {
        if let Some(user) = user {
            self.role = Some(user.role);
            self.id = Some(user.id);
        }
        self
    }
}

pub(crate) fn encode_session(
    claims: &Claims,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// `None` for anything that is not a live token signed with `secret`.
pub(crate) fn decode_session(token: &str, secret: &str) -> Option<Claims> {
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .ok()
}

/// Reload the user behind a token and refresh its claims.
pub(crate) async fn load_claims(db: &DatabaseConnection, claims: Claims) -> Result<Claims, DbErr> {
    let user = match Uuid::parse_str(&claims.sub) {
        Ok(id) => actions::find_user(db, id).await?,
        Err(_) => None,
    };
    Ok(claims.refreshed(user.as_ref()))
}

/// Issue a session for `user`, returning the `Set-Cookie` value.
pub(crate) fn start_session(
    user: &user::Model,
    secret: &str,
    secure: bool,
) -> Result<String, ServerError> {
    let token = encode_session(&Claims::for_user(user, Utc::now()), secret)?;
    Ok(session_cookie(&token, SESSION_DURATION_SECS, secure))
}

pub(crate) fn session_cookie(value: &str, max_age: i64, secure: bool) -> String {
    format!(
        "{cname}={cval}; Path=/; HttpOnly; SameSite=Lax; Max-Age={age}{secure}",
        cname = SESSION_COOKIE_NAME,
        cval = value,
        age = max_age,
        secure = if secure { "; Secure" } else { "" },
    )
}

pub(crate) fn expired_session_cookie(secure: bool) -> String {
    session_cookie("expired", -1, secure)
}

/// What `GET /api/auth/session` returns for a signed in user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Session {
    pub(crate) user: SessionUser,
    pub(crate) expires: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SessionUser {
    pub(crate) id: Option<Uuid>,
    pub(crate) name: Option<String>,
    pub(crate) email: Option<String>,
    pub(crate) image: Option<String>,
    pub(crate) role: Option<UserRole>,
}

impl From<Claims> for Session {
    fn from(claims: Claims) -> Self {
        Session {
            expires: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or_else(Utc::now),
            user: SessionUser {
                id: claims.id,
                name: claims.name,
                email: claims.email,
                image: claims.picture,
                role: claims.role,
            },
        }
    }
}

/// The authorization of a user making a request.
#[derive(Debug)]
pub(crate) enum Auth {
    KnownUser(Session),
    UnknownUser,
}

#[async_trait]
impl<B> FromRequest<B> for Auth
where
    B: Send,
{
    type Rejection = ServerError;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Extension(state) = Extension::<Arc<State>>::from_request(req).await?;

        let cookie = Option::<TypedHeader<Cookie>>::from_request(req)
            .await
            .ok()
            .flatten();

        let claims = cookie
            .as_ref()
            .and_then(|TypedHeader(cookie)| cookie.get(SESSION_COOKIE_NAME))
            .and_then(|token| decode_session(token, &state.config.auth_secret));

        match claims {
            Some(claims) => {
                let claims = load_claims(&state.db, claims).await?;
                Ok(Auth::KnownUser(claims.into()))
            }
            None => Ok(Auth::UnknownUser),
        }
    }
}
