use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{ORDER_COLS, ROLE_ASSIGNMENT_COLS, query_all, query_one};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Orders ============

pub fn create_order(conn: &Connection, input: &CreateOrder) -> Result<Order> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO orders (id, user_id, customer_email, status, stripe_payment_intent_id, price_id, quantity, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?7, ?7)",
        params![
            &id,
            &input.user_id,
            &input.customer_email,
            &input.stripe_payment_intent_id,
            &input.price_id,
            input.quantity,
            now
        ],
    )?;

    Ok(Order {
        id,
        user_id: input.user_id.clone(),
        customer_email: input.customer_email.clone(),
        status: OrderStatus::Pending,
        stripe_checkout_session_id: None,
        stripe_payment_intent_id: input.stripe_payment_intent_id.clone(),
        price_id: input.price_id.clone(),
        quantity: input.quantity,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_order_by_id(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )
}

pub fn get_order_by_payment_intent(conn: &Connection, payment_intent_id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE stripe_payment_intent_id = ?1",
            ORDER_COLS
        ),
        &[&payment_intent_id],
    )
}

/// Orders a checkout event may refer to: the one carrying the payment intent,
/// or one still waiting on its intent that carries the checkout session.
const CHECKOUT_MATCH: &str = "stripe_payment_intent_id = ?1
    OR (stripe_payment_intent_id IS NULL AND ?2 IS NOT NULL AND stripe_checkout_session_id = ?2)";

/// When both candidates exist, the order already carrying the intent wins.
const CHECKOUT_PREFERENCE: &str = "ORDER BY stripe_payment_intent_id IS ?1 DESC, created_at LIMIT 1";

/// Find the order a checkout event refers to: by payment intent, or by the
/// checkout session when the intent has not been stamped yet.
pub fn find_order_for_checkout(
    conn: &Connection,
    payment_intent_id: &str,
    checkout_session_id: Option<&str>,
) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE {} {}",
            ORDER_COLS, CHECKOUT_MATCH, CHECKOUT_PREFERENCE
        ),
        &[&payment_intent_id, &checkout_session_id],
    )
}

pub fn list_orders_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Order>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE user_id = ?1 ORDER BY created_at DESC, id",
            ORDER_COLS
        ),
        &[&user_id],
    )
}

/// Record the hosted checkout session created for an order.
pub fn set_order_checkout_session(conn: &Connection, order_id: &str, session_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET stripe_checkout_session_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![session_id, now(), order_id],
    )?;
    Ok(affected > 0)
}

/// SQL `IN` list of the statuses allowed to move to `next`.
fn status_guard(next: OrderStatus) -> String {
    OrderStatus::sources_of(next)
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Conditionally mark the order for a completed checkout as paid, stamping the
/// payment intent. Returns the order id when a row changed.
///
/// Single statement: the status guard and the write happen atomically, so two
/// racing deliveries cannot both apply. At most one row is targeted, so the
/// intent is never stamped onto a second order.
pub fn mark_checkout_paid(
    conn: &Connection,
    payment_intent_id: &str,
    checkout_session_id: Option<&str>,
    at: i64,
) -> Result<Option<String>> {
    conn.query_row(
        &format!(
            "UPDATE orders
             SET status = 'paid', stripe_payment_intent_id = ?1, updated_at = ?3
             WHERE id = (SELECT id FROM orders WHERE {} {})
               AND status IN ({})
             RETURNING id",
            CHECKOUT_MATCH,
            CHECKOUT_PREFERENCE,
            status_guard(OrderStatus::Paid)
        ),
        params![payment_intent_id, checkout_session_id, at],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

/// Conditionally mark an order paid. Already-paid orders are left untouched,
/// including their `updated_at`.
pub fn mark_order_paid(conn: &Connection, payment_intent_id: &str, at: i64) -> Result<Option<String>> {
    conn.query_row(
        &format!(
            "UPDATE orders SET status = 'paid', updated_at = ?2
             WHERE stripe_payment_intent_id = ?1 AND status IN ({})
             RETURNING id",
            status_guard(OrderStatus::Paid)
        ),
        params![payment_intent_id, at],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

/// Conditionally mark an order failed. Only pending orders move; a failure
/// arriving after success never downgrades a paid order.
pub fn mark_order_failed(conn: &Connection, payment_intent_id: &str, at: i64) -> Result<Option<String>> {
    conn.query_row(
        &format!(
            "UPDATE orders SET status = 'failed', updated_at = ?2
             WHERE stripe_payment_intent_id = ?1 AND status IN ({})
             RETURNING id",
            status_guard(OrderStatus::Failed)
        ),
        params![payment_intent_id, at],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

/// Remove an order that never reached the payment provider.
pub fn delete_pending_order(conn: &Connection, order_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM orders WHERE id = ?1 AND status = 'pending' AND stripe_payment_intent_id IS NULL",
        params![order_id],
    )?;
    Ok(affected > 0)
}

// ============ Roles ============

pub fn get_role_assignment(conn: &Connection, user_id: &str) -> Result<Option<RoleAssignment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM user_roles WHERE user_id = ?1",
            ROLE_ASSIGNMENT_COLS
        ),
        &[&user_id],
    )
}

pub fn count_admins(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM user_roles WHERE role = 'admin'",
        [],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

/// Assign a role explicitly (seeding and administrative tooling).
pub fn assign_role(conn: &Connection, user_id: &str, role: Role) -> Result<RoleAssignment> {
    let now = now();
    conn.execute(
        "INSERT INTO user_roles (user_id, role, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET role = excluded.role",
        params![user_id, role.as_str(), now],
    )?;
    Ok(RoleAssignment {
        user_id: user_id.to_string(),
        role,
        created_at: now,
    })
}

/// Atomically promote `user_id` to admin if no admin exists and the bootstrap
/// has never been claimed. Returns whether this call performed the promotion.
///
/// The marker insert is conditional on zero admin rows and guarded by the
/// marker's fixed primary key, all inside an immediate transaction, so
/// concurrent first users cannot both be promoted.
pub fn try_bootstrap_admin(conn: &mut Connection, user_id: &str) -> Result<bool> {
    let now = now();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let claimed = tx.execute(
        "INSERT INTO admin_bootstrap (id, user_id, created_at)
         SELECT 1, ?1, ?2 WHERE NOT EXISTS (SELECT 1 FROM user_roles WHERE role = 'admin')
         ON CONFLICT(id) DO NOTHING",
        params![user_id, now],
    )?;

    if claimed == 0 {
        // Nothing written; dropping the transaction rolls back
        return Ok(false);
    }

    tx.execute(
        "INSERT INTO user_roles (user_id, role, created_at) VALUES (?1, 'admin', ?2)
         ON CONFLICT(user_id) DO UPDATE SET role = 'admin'",
        params![user_id, now],
    )?;
    tx.commit()?;
    Ok(true)
}

// ============ Audit Logs ============

#[allow(clippy::too_many_arguments)]
pub fn create_audit_log(
    conn: &Connection,
    enabled: bool,
    actor_type: ActorType,
    actor_id: Option<&str>,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    details: Option<&serde_json::Value>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<AuditLog> {
    let id = gen_id();
    let timestamp = now();

    let log = AuditLog {
        id,
        timestamp,
        actor_type,
        actor_id: actor_id.map(String::from),
        action: action.to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        details: details.cloned(),
        ip_address: ip_address.map(String::from),
        user_agent: user_agent.map(String::from),
    };

    // Skip database insert if audit logging is disabled
    if !enabled {
        return Ok(log);
    }

    conn.execute(
        "INSERT INTO audit_logs (id, timestamp, actor_type, actor_id, action, resource_type, resource_id, details, ip_address, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &log.id,
            log.timestamp,
            actor_type.as_ref(),
            &log.actor_id,
            &log.action,
            &log.resource_type,
            &log.resource_id,
            details.map(|d| d.to_string()),
            &log.ip_address,
            &log.user_agent,
        ],
    )?;

    Ok(log)
}

pub fn count_audit_logs(conn: &Connection, action: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM audit_logs WHERE action = ?1",
        params![action],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

/// Delete audit logs older than the retention period. Returns rows removed.
pub fn purge_old_audit_logs(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now().saturating_sub(retention_days.saturating_mul(86400));
    let deleted = conn.execute(
        "DELETE FROM audit_logs WHERE timestamp < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
