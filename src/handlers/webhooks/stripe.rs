use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::AppState;
use crate::email::spawn_order_confirmation;
use crate::error::{AppError, msg};
use crate::models::{ActorType, AuditAction};
use crate::payments::{SIGNATURE_HEADER, VerifyError, WebhookEvent, WebhookVerifier};
use crate::reconcile::{PersistenceError, ReconcileOutcome, reconcile};
use crate::util::AuditLogBuilder;

/// Failures at the webhook boundary. Authentication and payload failures are
/// permanent (400); persistence and configuration failures are retryable (500).
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("missing signature")]
    MissingSignature,

    #[error("invalid signature")]
    SignatureInvalid,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("webhook secret not configured")]
    NotConfigured,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<VerifyError> for WebhookError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::MissingSignature => WebhookError::MissingSignature,
            VerifyError::SignatureInvalid => WebhookError::SignatureInvalid,
            VerifyError::InvalidPayload(detail) => WebhookError::InvalidPayload(detail),
        }
    }
}

impl From<AppError> for WebhookError {
    fn from(err: AppError) -> Self {
        WebhookError::Persistence(PersistenceError(err))
    }
}

#[derive(Serialize)]
struct WebhookErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            WebhookError::MissingSignature => {
                tracing::warn!("Webhook rejected: no {} header", SIGNATURE_HEADER);
                (StatusCode::BAD_REQUEST, msg::MISSING_SIGNATURE, None)
            }
            WebhookError::SignatureInvalid => {
                tracing::warn!("Webhook rejected: signature mismatch");
                (StatusCode::BAD_REQUEST, msg::INVALID_SIGNATURE, None)
            }
            WebhookError::InvalidPayload(detail) => {
                tracing::warn!("Webhook rejected: {}", detail);
                (StatusCode::BAD_REQUEST, msg::INVALID_PAYLOAD, Some(detail))
            }
            WebhookError::NotConfigured => {
                tracing::error!("Webhook received but STRIPE_WEBHOOK_SECRET is not set");
                (StatusCode::INTERNAL_SERVER_ERROR, msg::WEBHOOK_NOT_CONFIGURED, None)
            }
            WebhookError::Persistence(e) => {
                tracing::error!("Webhook persistence failed, sender will retry: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::PERSISTENCE_FAILED, None)
            }
        };

        (status, Json(WebhookErrorBody { error, details })).into_response()
    }
}

/// Acknowledgment body for accepted events.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

/// Axum handler for Stripe webhooks.
///
/// The body is taken as raw bytes so the signature is checked against exactly
/// what was sent.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    let secret = state
        .stripe
        .webhook_secret
        .as_deref()
        .ok_or(WebhookError::NotConfigured)?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .map(|v| v.to_str().map_err(|_| WebhookError::SignatureInvalid))
        .transpose()?;

    let event = WebhookVerifier::new(secret).verify(&body, signature)?;

    let outcome = {
        let conn = state.db.get().map_err(AppError::from)?;
        reconcile(&conn, &event)?
    };

    let order_id = match &outcome {
        ReconcileOutcome::Applied { order_id, .. } | ReconcileOutcome::Unchanged { order_id, .. } => {
            Some(order_id.clone())
        }
        _ => None,
    };

    if let ReconcileOutcome::Applied { order_id, status } = &outcome {
        record_transition(&state, &headers, &event, order_id, status.as_str());

        if matches!(event, WebhookEvent::CheckoutCompleted(_)) {
            spawn_order_confirmation(
                state.email_service.clone(),
                state.db.clone(),
                order_id.clone(),
            );
        }
    }

    Ok(Json(WebhookAck {
        received: true,
        outcome: outcome.label(),
        order_id,
    }))
}

/// Audit an applied transition. Failures are logged, never surfaced: the
/// order write has already committed.
fn record_transition(
    state: &AppState,
    headers: &HeaderMap,
    event: &WebhookEvent,
    order_id: &str,
    status: &str,
) {
    let audit_conn = match state.audit.get() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!("Audit DB connection error: {}", e);
            return;
        }
    };

    let details = serde_json::json!({
        "event_kind": event.kind(),
        "event_id": event.event_id(),
        "payment_intent_id": event.payment_intent_id(),
        "status": status,
    });

    if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, headers)
        .actor(ActorType::PaymentProvider, Some("stripe"))
        .action(AuditAction::ReconcileOrder)
        .resource("order", order_id)
        .details(&details)
        .save()
    {
        tracing::warn!("Failed to write reconcile audit log: {}", e);
    }
}
