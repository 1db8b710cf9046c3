//! Stripe webhook authentication and event decoding.
//!
//! [`WebhookVerifier`] checks the `stripe-signature` header against the raw
//! request body and only then decodes the body into a [`WebhookEvent`]. It
//! performs no I/O.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the provider's signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_INTENT_FAILED: &str = "payment_intent.payment_failed";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// No signature header at all; usually a misconfigured sender
    #[error("missing signature header")]
    MissingSignature,

    /// Header present but malformed, stale, or not matching the body
    #[error("signature does not match payload")]
    SignatureInvalid,

    /// Authentic body that is not a usable event
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Fields of a completed hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCompleted {
    pub event_id: Option<String>,
    pub payment_intent_id: String,
    /// Checkout session id (cs_xxx), used to find orders created before the
    /// payment intent existed
    pub checkout_session_id: Option<String>,
    pub customer_email: Option<String>,
}

/// Fields of a payment-intent lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntentEvent {
    pub event_id: Option<String>,
    pub payment_intent_id: String,
    pub failure_message: Option<String>,
}

/// A verified provider event. Kinds this service does not act on decode to
/// `Unhandled` so they can be acknowledged and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    CheckoutCompleted(CheckoutCompleted),
    PaymentSucceeded(PaymentIntentEvent),
    PaymentFailed(PaymentIntentEvent),
    Unhandled {
        event_id: Option<String>,
        kind: String,
    },
}

impl WebhookEvent {
    pub fn kind(&self) -> &str {
        match self {
            WebhookEvent::CheckoutCompleted(_) => CHECKOUT_SESSION_COMPLETED,
            WebhookEvent::PaymentSucceeded(_) => PAYMENT_INTENT_SUCCEEDED,
            WebhookEvent::PaymentFailed(_) => PAYMENT_INTENT_FAILED,
            WebhookEvent::Unhandled { kind, .. } => kind,
        }
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        match self {
            WebhookEvent::CheckoutCompleted(data) => Some(&data.payment_intent_id),
            WebhookEvent::PaymentSucceeded(data) | WebhookEvent::PaymentFailed(data) => {
                Some(&data.payment_intent_id)
            }
            WebhookEvent::Unhandled { .. } => None,
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        match self {
            WebhookEvent::CheckoutCompleted(data) => data.event_id.as_deref(),
            WebhookEvent::PaymentSucceeded(data) | WebhookEvent::PaymentFailed(data) => {
                data.event_id.as_deref()
            }
            WebhookEvent::Unhandled { event_id, .. } => event_id.as_deref(),
        }
    }
}

// ============ Stripe envelope ============

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: Option<String>,
    payment_intent: Option<String>,
    customer_email: Option<String>,
    customer_details: Option<StripeCustomerDetails>,
}

#[derive(Debug, Deserialize)]
struct StripeCustomerDetails {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    last_payment_error: Option<StripePaymentError>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentError {
    message: Option<String>,
}

/// Verifies `stripe-signature` headers and decodes authentic bodies.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    /// Maximum age of a signed timestamp (Stripe recommends 5 minutes).
    pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

    /// Allowed clock skew for timestamps from the future.
    const FUTURE_SKEW_SECS: i64 = 60;

    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: Self::DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Authenticate `body` against the claimed `signature` header and decode it.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookEvent, VerifyError> {
        self.verify_at(body, signature, chrono::Utc::now().timestamp())
    }

    /// Like [`verify`](Self::verify) with an explicit current time.
    pub fn verify_at(
        &self,
        body: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> Result<WebhookEvent, VerifyError> {
        let header = signature.ok_or(VerifyError::MissingSignature)?;
        self.verify_signature(body, header, now)?;
        parse_event(body)
    }

    /// Check a `t=<unix>,v1=<hex>[,v1=<hex>...]` header against the raw body.
    pub fn verify_signature(&self, body: &[u8], header: &str, now: i64) -> Result<(), VerifyError> {
        let mut timestamp = None;
        let mut candidates = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", t)) => timestamp = Some(t),
                Some(("v1", sig)) => candidates.push(sig),
                _ => {}
            }
        }

        let timestamp_str = timestamp.ok_or(VerifyError::SignatureInvalid)?;
        if candidates.is_empty() {
            return Err(VerifyError::SignatureInvalid);
        }

        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| VerifyError::SignatureInvalid)?;

        // `t` is unauthenticated at this point and may be any i64
        let age = now
            .checked_sub(timestamp)
            .ok_or(VerifyError::SignatureInvalid)?;
        if age > self.tolerance_secs {
            tracing::warn!(
                "Webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                self.tolerance_secs
            );
            return Err(VerifyError::SignatureInvalid);
        }
        if age < -Self::FUTURE_SKEW_SECS {
            tracing::warn!("Webhook rejected: timestamp in the future (age={}s)", age);
            return Err(VerifyError::SignatureInvalid);
        }

        let expected = self.compute(timestamp_str, body)?;

        // Several v1 entries are sent while a secret is being rolled
        let matched = candidates.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|provided| {
                    provided.len() == expected.len()
                        && bool::from(expected.as_slice().ct_eq(provided.as_slice()))
                })
                .unwrap_or(false)
        });

        if matched {
            Ok(())
        } else {
            Err(VerifyError::SignatureInvalid)
        }
    }

    /// Build a header value signing `body` at `timestamp`.
    pub fn sign(&self, body: &[u8], timestamp: i64) -> Result<String, VerifyError> {
        let timestamp = timestamp.to_string();
        let mac = self.compute(&timestamp, body)?;
        Ok(format!("t={},v1={}", timestamp, hex::encode(mac)))
    }

    /// HMAC-SHA256 over `"<timestamp>." || body`, using the body bytes as received.
    fn compute(&self, timestamp: &str, body: &[u8]) -> Result<Vec<u8>, VerifyError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| VerifyError::SignatureInvalid)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Decode an authenticated body into an event.
pub fn parse_event(body: &[u8]) -> Result<WebhookEvent, VerifyError> {
    let event: StripeEvent = serde_json::from_slice(body).map_err(|e| {
        tracing::error!("Failed to parse Stripe webhook: {}", e);
        VerifyError::InvalidPayload("malformed event envelope".into())
    })?;

    match event.event_type.as_str() {
        CHECKOUT_SESSION_COMPLETED => parse_checkout_completed(event),
        PAYMENT_INTENT_SUCCEEDED => {
            parse_payment_intent(event).map(WebhookEvent::PaymentSucceeded)
        }
        PAYMENT_INTENT_FAILED => parse_payment_intent(event).map(WebhookEvent::PaymentFailed),
        _ => Ok(WebhookEvent::Unhandled {
            event_id: event.id,
            kind: event.event_type,
        }),
    }
}

fn parse_checkout_completed(event: StripeEvent) -> Result<WebhookEvent, VerifyError> {
    let session: StripeCheckoutSession =
        serde_json::from_value(event.data.object).map_err(|e| {
            tracing::error!("Failed to parse checkout session: {}", e);
            VerifyError::InvalidPayload("invalid checkout session".into())
        })?;

    let payment_intent_id = session
        .payment_intent
        .ok_or_else(|| VerifyError::InvalidPayload("checkout session has no payment_intent".into()))?;

    let customer_email = session
        .customer_details
        .and_then(|d| d.email)
        .or(session.customer_email);

    Ok(WebhookEvent::CheckoutCompleted(CheckoutCompleted {
        event_id: event.id,
        payment_intent_id,
        checkout_session_id: session.id,
        customer_email,
    }))
}

fn parse_payment_intent(event: StripeEvent) -> Result<PaymentIntentEvent, VerifyError> {
    let intent: StripePaymentIntent = serde_json::from_value(event.data.object).map_err(|e| {
        tracing::error!("Failed to parse payment intent: {}", e);
        VerifyError::InvalidPayload("invalid payment intent".into())
    })?;

    Ok(PaymentIntentEvent {
        event_id: event.id,
        payment_intent_id: intent.id,
        failure_message: intent.last_payment_error.and_then(|e| e.message),
    })
}
