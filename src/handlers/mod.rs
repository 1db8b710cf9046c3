pub mod account;
pub mod public;
pub mod webhooks;

use axum::Router;

use crate::db::AppState;
use crate::rate_limit;

/// Build the full route table. `rate_limit_rpm` of 0 disables limiting on
/// the account routes.
pub fn router(state: AppState, rate_limit_rpm: u32) -> Router<AppState> {
    let mut account = account::router(state);
    if let Some(layer) = rate_limit::standard_layer(rate_limit_rpm) {
        account = account.layer(layer);
    }

    Router::new()
        // Public endpoints (no auth)
        .merge(public::router())
        // Webhook endpoints (signature auth)
        .merge(webhooks::router())
        // Account endpoints (session auth)
        .merge(account)
}
