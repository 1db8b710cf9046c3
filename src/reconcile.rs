//! Order reconciliation: applying verified payment events to orders.
//!
//! Every event performs at most one conditional write keyed by the payment
//! intent. The status guard lives in the `WHERE` clause, so repeated or
//! racing deliveries cannot double-apply, and a failure that arrives after
//! success never downgrades a paid order. A read is only issued afterwards,
//! when nothing changed, to tell "already there" apart from "no such order".

use rusqlite::Connection;
use thiserror::Error;

use crate::db::queries;
use crate::error::AppError;
use crate::models::{Order, OrderStatus};
use crate::payments::{CheckoutCompleted, PaymentIntentEvent, WebhookEvent};

/// Storage failure while reconciling. The event was authentic, so the sender
/// should retry.
#[derive(Error, Debug)]
#[error("persistence error: {0}")]
pub struct PersistenceError(#[source] pub AppError);

impl From<AppError> for PersistenceError {
    fn from(err: AppError) -> Self {
        PersistenceError(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A row changed to `status`
    Applied { order_id: String, status: OrderStatus },
    /// The order exists but the event was a repeat or guarded out
    Unchanged { order_id: String, status: OrderStatus },
    /// No order for this payment intent (yet)
    NotFound { payment_intent_id: String },
    /// Event kind this service does not act on
    Ignored,
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied { .. } => "applied",
            ReconcileOutcome::Unchanged { .. } => "unchanged",
            ReconcileOutcome::NotFound { .. } => "order_not_found",
            ReconcileOutcome::Ignored => "ignored",
        }
    }
}

/// Apply `event` to the order store using the current time.
pub fn reconcile(conn: &Connection, event: &WebhookEvent) -> Result<ReconcileOutcome, PersistenceError> {
    reconcile_at(conn, event, chrono::Utc::now().timestamp())
}

/// Apply `event`, stamping `updated_at` with `now` on an accepted transition.
pub fn reconcile_at(
    conn: &Connection,
    event: &WebhookEvent,
    now: i64,
) -> Result<ReconcileOutcome, PersistenceError> {
    let outcome = match event {
        WebhookEvent::CheckoutCompleted(data) => apply_checkout_completed(conn, data, now)?,
        WebhookEvent::PaymentSucceeded(data) => apply_payment_succeeded(conn, data, now)?,
        WebhookEvent::PaymentFailed(data) => apply_payment_failed(conn, data, now)?,
        WebhookEvent::Unhandled { kind, event_id } => {
            tracing::debug!("Ignoring unhandled webhook event: kind={}, id={:?}", kind, event_id);
            ReconcileOutcome::Ignored
        }
    };

    match &outcome {
        ReconcileOutcome::Applied { order_id, status } => tracing::info!(
            "Order {} -> {} ({}, payment_intent={:?})",
            order_id,
            status.as_str(),
            event.kind(),
            event.payment_intent_id()
        ),
        ReconcileOutcome::Unchanged { order_id, status } => tracing::info!(
            "Order {} left {} on {} (payment_intent={:?})",
            order_id,
            status.as_str(),
            event.kind(),
            event.payment_intent_id()
        ),
        ReconcileOutcome::NotFound { payment_intent_id } => tracing::warn!(
            "No order for payment_intent={} on {}, skipping",
            payment_intent_id,
            event.kind()
        ),
        ReconcileOutcome::Ignored => {}
    }

    Ok(outcome)
}

fn apply_checkout_completed(
    conn: &Connection,
    data: &CheckoutCompleted,
    now: i64,
) -> Result<ReconcileOutcome, PersistenceError> {
    let session_id = data.checkout_session_id.as_deref();

    if let Some(order_id) = queries::mark_checkout_paid(conn, &data.payment_intent_id, session_id, now)? {
        return Ok(ReconcileOutcome::Applied {
            order_id,
            status: OrderStatus::Paid,
        });
    }

    let existing = queries::find_order_for_checkout(conn, &data.payment_intent_id, session_id)?;
    Ok(unchanged_or_missing(existing, &data.payment_intent_id))
}

fn apply_payment_succeeded(
    conn: &Connection,
    data: &PaymentIntentEvent,
    now: i64,
) -> Result<ReconcileOutcome, PersistenceError> {
    if let Some(order_id) = queries::mark_order_paid(conn, &data.payment_intent_id, now)? {
        return Ok(ReconcileOutcome::Applied {
            order_id,
            status: OrderStatus::Paid,
        });
    }

    let existing = queries::get_order_by_payment_intent(conn, &data.payment_intent_id)?;
    Ok(unchanged_or_missing(existing, &data.payment_intent_id))
}

fn apply_payment_failed(
    conn: &Connection,
    data: &PaymentIntentEvent,
    now: i64,
) -> Result<ReconcileOutcome, PersistenceError> {
    if let Some(order_id) = queries::mark_order_failed(conn, &data.payment_intent_id, now)? {
        if let Some(reason) = &data.failure_message {
            tracing::info!("Payment failed for order {}: {}", order_id, reason);
        }
        return Ok(ReconcileOutcome::Applied {
            order_id,
            status: OrderStatus::Failed,
        });
    }

    let existing = queries::get_order_by_payment_intent(conn, &data.payment_intent_id)?;
    if let Some(order) = existing.as_ref().filter(|o| o.status == OrderStatus::Paid) {
        tracing::info!(
            "Ignoring late payment failure for paid order {} (payment_intent={})",
            order.id,
            data.payment_intent_id
        );
    }
    Ok(unchanged_or_missing(existing, &data.payment_intent_id))
}

fn unchanged_or_missing(
    existing: Option<Order>,
    payment_intent_id: &str,
) -> ReconcileOutcome {
    match existing {
        Some(order) => ReconcileOutcome::Unchanged {
            order_id: order.id,
            status: order.status,
        },
        None => ReconcileOutcome::NotFound {
            payment_intent_id: payment_intent_id.to_string(),
        },
    }
}
