use axum::{
    body::{Body, Bytes},
    extract::Extension,
    http::{header, HeaderMap, Response, StatusCode},
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::{
    billing::{sync_subscription, verify_signature, StripeEvent, SyncOutcome, SIGNATURE_HEADER},
    config::Config,
    error::ServerError,
    server::State,
};

/// Handler for `POST /api/webhooks/stripe`
pub(crate) async fn stripe_webhook(
    Extension(state): Extension<Arc<State>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response<Body>, ServerError> {
    receive_event(&state.config, &state.db, &headers, &body).await
}

/// Once an event is accepted the answer is always `200 {"ok":true}`, whatever happened to it.
pub(crate) async fn receive_event(
    config: &Config,
    db: &DatabaseConnection,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response<Body>, ServerError> {
    if let Some(secret) = &config.stripe_webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(ServerError::InvalidSignature)?;
        if let Err(e) = verify_signature(body, signature, secret, Utc::now().timestamp()) {
            tracing::warn!("Rejected webhook: {}", e);
            return Err(e);
        }
    }

    let event = parse_event(body)?;
    handle_event(db, &event).await;

    acknowledged()
}

pub(crate) fn parse_event(body: &[u8]) -> Result<StripeEvent, ServerError> {
    serde_json::from_slice(body).map_err(|e| ServerError::MalformedBody(e.to_string()))
}

/// Apply an event and log what happened. Failures never reach Stripe.
pub(crate) async fn handle_event(db: &DatabaseConnection, event: &StripeEvent) {
    let event_id = event.id.as_deref().unwrap_or("-");
    match sync_subscription(db, event).await {
        Ok(SyncOutcome::Ignored) => {
            tracing::info!(event_id, event_type = %event.event_type, "Unhandled event type")
        }
        Ok(SyncOutcome::MissingCustomer) => {
            tracing::warn!(event_id, event_type = %event.event_type, "Event has no customer id")
        }
        Ok(SyncOutcome::UnknownCustomer) => tracing::warn!(
            event_id,
            event_type = %event.event_type,
            customer = event.customer_id().unwrap_or_default(),
            "No user for customer"
        ),
        Ok(SyncOutcome::Updated { user_id, plan }) => tracing::info!(
            event_id,
            event_type = %event.event_type,
            %user_id,
            ?plan,
            "Updated plan"
        ),
        Err(e) => tracing::error!(
            event_id,
            event_type = %event.event_type,
            "Failed to sync subscription: {:?}",
            e
        ),
    }
}

fn acknowledged() -> Result<Response<Body>, ServerError> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"ok":true}"#))?)
}
