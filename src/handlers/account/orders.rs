use axum::{Extension, extract::State};

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::Json;
use crate::middleware::SessionContext;
use crate::models::Order;

/// List the caller's orders, newest first.
pub async fn list_my_orders(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Json<Vec<Order>>> {
    let conn = state.db.get()?;
    let orders = queries::list_orders_for_user(&conn, &ctx.identity.user_id)?;
    Ok(Json(orders))
}
