use axum::{Extension, extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::middleware::SessionContext;
use crate::models::{ActorType, AuditAction, CreateOrder};
use crate::payments::{CheckoutRequest, StripeClient};
use crate::util::AuditLogBuilder;

const MAX_QUANTITY: i64 = 99;

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub price_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    /// Receipt address; defaults to the session email
    #[serde(default)]
    pub customer_email: Option<String>,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    pub order_id: String,
    pub checkout_url: String,
}

/// Create a pending order and a hosted checkout session for it.
///
/// The order is linked to the session id so `checkout.session.completed`
/// can find it before the payment intent id is known.
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    headers: HeaderMap,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CreateCheckoutResponse>> {
    if req.price_id.trim().is_empty() {
        return Err(AppError::BadRequest("price_id is required".into()));
    }
    if !(1..=MAX_QUANTITY).contains(&req.quantity) {
        return Err(AppError::BadRequest(msg::INVALID_QUANTITY.into()));
    }

    let customer_email = req
        .customer_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(String::from)
        .or_else(|| ctx.identity.email.clone());

    let stripe = StripeClient::new(state.http_client.clone(), &state.stripe)?;

    let order = {
        let conn = state.db.get()?;
        queries::create_order(
            &conn,
            &CreateOrder {
                user_id: Some(ctx.identity.user_id.clone()),
                customer_email: customer_email.clone(),
                price_id: Some(req.price_id.clone()),
                quantity: req.quantity,
                stripe_payment_intent_id: None,
            },
        )?
    };

    let session = match stripe
        .create_checkout_session(&CheckoutRequest {
            order_id: &order.id,
            price_id: &req.price_id,
            quantity: req.quantity,
            customer_email: customer_email.as_deref(),
            success_url: &state.checkout_success_url,
            cancel_url: &state.checkout_cancel_url,
        })
        .await
    {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Checkout session for order {} failed: {}", order.id, e);
            discard_order(&state, &order.id);
            return Err(e);
        }
    };

    {
        let conn = state.db.get()?;
        if !queries::set_order_checkout_session(&conn, &order.id, &session.id)? {
            return Err(AppError::Internal(format!(
                "Order {} vanished before checkout session was linked",
                order.id
            )));
        }
    }

    tracing::info!(
        "Checkout created: order={}, session={}, user={}",
        order.id,
        session.id,
        ctx.identity.user_id
    );

    match state.audit.get() {
        Ok(audit_conn) => {
            let details = serde_json::json!({
                "price_id": req.price_id,
                "quantity": req.quantity,
                "checkout_session_id": session.id,
            });
            if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
                .actor(ActorType::User, Some(&ctx.identity.user_id))
                .action(AuditAction::CreateCheckout)
                .resource("order", &order.id)
                .details(&details)
                .save()
            {
                tracing::warn!("Failed to write checkout audit log: {}", e);
            }
        }
        Err(e) => tracing::warn!("Audit DB connection error: {}", e),
    }

    Ok(Json(CreateCheckoutResponse {
        order_id: order.id,
        checkout_url: session.url,
    }))
}

/// Drop an order whose checkout session was never created, so it does not
/// linger as `pending` on the customer's dashboard.
fn discard_order(state: &AppState, order_id: &str) {
    let removed = state
        .db
        .get()
        .map_err(AppError::from)
        .and_then(|conn| queries::delete_pending_order(&conn, order_id));
    if let Err(e) = removed {
        tracing::error!("Failed to discard order {} after checkout failure: {}", order_id, e);
    }
}
