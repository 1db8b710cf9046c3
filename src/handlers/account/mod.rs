mod access;
mod checkout;
mod orders;

pub use access::*;
pub use checkout::*;
pub use orders::*;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::db::AppState;
use crate::middleware::session_auth;

/// Routes that require a session bearer token.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/me/access", get(get_access))
        .route("/me/orders", get(list_my_orders))
        .route("/checkout", post(create_checkout))
        .layer(middleware::from_fn_with_state(state, session_auth))
}
