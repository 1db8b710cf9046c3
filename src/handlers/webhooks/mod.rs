pub mod stripe;

pub use stripe::{WebhookAck, WebhookError, handle_stripe_webhook};

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/stripe", post(handle_stripe_webhook))
}
