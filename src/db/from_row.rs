//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const ORDER_COLS: &str = "id, user_id, customer_email, status, stripe_checkout_session_id, stripe_payment_intent_id, price_id, quantity, created_at, updated_at";

pub const ROLE_ASSIGNMENT_COLS: &str = "user_id, role, created_at";

// ============ FromRow Implementations ============

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            user_id: row.get(1)?,
            customer_email: row.get(2)?,
            status: parse_enum(row, 3, "status")?,
            stripe_checkout_session_id: row.get(4)?,
            stripe_payment_intent_id: row.get(5)?,
            price_id: row.get(6)?,
            quantity: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl FromRow for RoleAssignment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(RoleAssignment {
            user_id: row.get(0)?,
            role: parse_enum(row, 1, "role")?,
            created_at: row.get(2)?,
        })
    }
}
