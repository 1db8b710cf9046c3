use axum::{Extension, extract::State, http::HeaderMap};

use crate::access::{ResolvedAccess, RoleSource};
use crate::db::AppState;
use crate::extractors::Json;
use crate::middleware::SessionContext;
use crate::models::{ActorType, AuditAction};
use crate::util::AuditLogBuilder;

/// Resolve the caller's role and capabilities.
///
/// Never fails once the session is valid: storage trouble yields the default
/// role.
pub async fn get_access(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    headers: HeaderMap,
) -> Json<ResolvedAccess> {
    let access = state.access.resolve(&state.db, &ctx.identity).await;

    if access.source == RoleSource::Bootstrap {
        record_bootstrap(&state, &headers, &access);
    }

    Json(access)
}

fn record_bootstrap(state: &AppState, headers: &HeaderMap, access: &ResolvedAccess) {
    let audit_conn = match state.audit.get() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!("Audit DB connection error: {}", e);
            return;
        }
    };

    let details = serde_json::json!({ "role": access.role.as_str() });

    if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, headers)
        .actor(ActorType::System, None)
        .action(AuditAction::BootstrapAdmin)
        .resource("user", &access.user_id)
        .details(&details)
        .save()
    {
        tracing::warn!("Failed to write bootstrap audit log: {}", e);
    }
}
