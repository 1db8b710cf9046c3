//! Shared utility functions.

use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{ActorType, AuditAction, AuditLog};

/// Extract client IP address and user-agent from request headers.
///
/// Tries `x-forwarded-for` first (for proxied requests), then `x-real-ip`.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns None if the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Builder for creating audit log entries.
///
/// # Example
/// ```ignore
/// AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
///     .actor(ActorType::User, Some(&user_id))
///     .action(AuditAction::CreateCheckout)
///     .resource("order", &order.id)
///     .save()?;
/// ```
pub struct AuditLogBuilder<'a> {
    conn: &'a Connection,
    enabled: bool,
    headers: &'a HeaderMap,
    actor_type: ActorType,
    actor_id: Option<&'a str>,
    action: AuditAction,
    resource_type: &'a str,
    resource_id: &'a str,
    details: Option<&'a serde_json::Value>,
}

impl<'a> AuditLogBuilder<'a> {
    pub fn new(conn: &'a Connection, enabled: bool, headers: &'a HeaderMap) -> Self {
        Self {
            conn,
            enabled,
            headers,
            actor_type: ActorType::System,
            actor_id: None,
            action: AuditAction::ReconcileOrder,
            resource_type: "",
            resource_id: "",
            details: None,
        }
    }

    pub fn actor(mut self, actor_type: ActorType, actor_id: Option<&'a str>) -> Self {
        self.actor_type = actor_type;
        self.actor_id = actor_id;
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = action;
        self
    }

    pub fn resource(mut self, resource_type: &'a str, resource_id: &'a str) -> Self {
        self.resource_type = resource_type;
        self.resource_id = resource_id;
        self
    }

    pub fn details(mut self, details: &'a serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn save(self) -> Result<AuditLog> {
        let (ip, ua) = extract_request_info(self.headers);
        queries::create_audit_log(
            self.conn,
            self.enabled,
            self.actor_type,
            self.actor_id,
            self.action.as_ref(),
            self.resource_type,
            self.resource_id,
            self.details,
            ip.as_deref(),
            ua.as_deref(),
        )
    }
}
