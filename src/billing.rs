//! Stripe subscription sync.
//!
//! Stripe tells us about billing lifecycle changes through webhook events. The
//! only thing we track locally is the plan on the user record, matched through
//! the customer id Stripe issued for that user.

use entity::sea_orm_active_enums::Plan;
use hmac::{Hmac, Mac};
use sea_orm::{DatabaseConnection, DbErr};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::actions;
use crate::error::ServerError;

type HmacSha256 = Hmac<Sha256>;

pub(crate) const SIGNATURE_HEADER: &str = "stripe-signature";
/// Maximum age of a signed event, in seconds.
pub(crate) const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// A Stripe event, reduced to the parts we read.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StripeEvent {
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(rename = "type")]
    pub(crate) event_type: String,
    /// Only read for the event types we act on.
    #[serde(default)]
    pub(crate) data: EventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct EventData {
    #[serde(default)]
    pub(crate) object: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    CheckoutSessionCompleted,
    InvoicePaid,
    InvoicePaymentFailed,
    SubscriptionDeleted,
    Unhandled,
}

impl EventKind {
    pub(crate) fn parse(event_type: &str) -> Self {
        match event_type {
            "checkout.session.completed" => EventKind::CheckoutSessionCompleted,
            "invoice.paid" => EventKind::InvoicePaid,
            "invoice.payment_failed" => EventKind::InvoicePaymentFailed,
            "customer.subscription.deleted" => EventKind::SubscriptionDeleted,
            _ => EventKind::Unhandled,
        }
    }
}

/// The plan a user ends up on after an event, or `None` if the event does not touch plans.
pub(crate) fn plan_for_event(kind: EventKind) -> Option<Plan> {
    match kind {
        EventKind::CheckoutSessionCompleted | EventKind::InvoicePaid => Some(Plan::Master),
        EventKind::InvoicePaymentFailed | EventKind::SubscriptionDeleted => Some(Plan::Free),
        EventKind::Unhandled => None,
    }
}

impl StripeEvent {
    pub(crate) fn kind(&self) -> EventKind {
        EventKind::parse(&self.event_type)
    }

    /// The customer id of the event object. Expanded customer objects are not followed.
    pub(crate) fn customer_id(&self) -> Option<&str> {
        self.data.object.get("customer").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SyncOutcome {
    /// Event type we do not act on.
    Ignored,
    /// The event object carries no usable customer id.
    MissingCustomer,
    /// No user has this customer id.
    UnknownCustomer,
    Updated { user_id: Uuid, plan: Plan },
}

/// Apply an event to the plan of the matching user.
pub(crate) async fn sync_subscription(
    db: &DatabaseConnection,
    event: &StripeEvent,
) -> Result<SyncOutcome, DbErr> {
    let plan = match plan_for_event(event.kind()) {
        Some(plan) => plan,
        None => return Ok(SyncOutcome::Ignored),
    };
    let customer_id = match event.customer_id() {
        Some(customer_id) => customer_id,
        None => return Ok(SyncOutcome::MissingCustomer),
    };

    match actions::find_user_by_customer(db, customer_id).await? {
        Some(user) => {
            actions::set_plan(db, user.id, plan).await?;
            Ok(SyncOutcome::Updated {
                user_id: user.id,
                plan,
            })
        }
        None => Ok(SyncOutcome::UnknownCustomer),
    }
}

/// Check a `Stripe-Signature` header (`t=<unix ts>,v1=<hex hmac>[,v1=...]`) against the raw payload.
pub(crate) fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), ServerError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(ServerError::InvalidSignature)?;
    let issued_at: i64 = timestamp
        .parse()
        .map_err(|_| ServerError::InvalidSignature)?;
    match now.checked_sub(issued_at).map(i64::unsigned_abs) {
        Some(age) if age <= SIGNATURE_TOLERANCE_SECS as u64 => {}
        _ => return Err(ServerError::InvalidSignature),
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| ServerError::InvalidSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    let matched = signatures
        .iter()
        .any(|signature| bool::from(expected.as_bytes().ct_eq(signature.as_bytes())));
    if matched {
        Ok(())
    } else {
        Err(ServerError::InvalidSignature)
    }
}
