use rusqlite::Connection;

/// Initialize the main database schema (orders and roles)
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Orders created at checkout and reconciled from payment webhooks.
        -- status only moves forward: pending -> paid | failed, failed -> paid.
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            customer_email TEXT,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'paid', 'failed')),
            stripe_checkout_session_id TEXT,
            stripe_payment_intent_id TEXT,
            price_id TEXT,
            quantity INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        -- At most one order per payment intent (the reconciliation key)
        CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_payment_intent
            ON orders(stripe_payment_intent_id) WHERE stripe_payment_intent_id IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_checkout_session
            ON orders(stripe_checkout_session_id) WHERE stripe_checkout_session_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id, created_at);

        -- One current role per user. Never deleted by the service.
        CREATE TABLE IF NOT EXISTS user_roles (
            user_id TEXT PRIMARY KEY,
            role TEXT NOT NULL CHECK (role IN ('admin', 'editor', 'catalog_manager', 'partners_manager', 'user', 'reader')),
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_user_roles_role ON user_roles(role);

        -- Single-row marker claimed by the first-admin bootstrap. The fixed
        -- primary key makes a second promotion impossible at the storage layer.
        CREATE TABLE IF NOT EXISTS admin_bootstrap (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            user_id TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        "#,
    )
}

/// Initialize the audit log schema (separate database file)
pub fn init_audit_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            actor_type TEXT NOT NULL CHECK (actor_type IN ('user', 'payment_provider', 'system')),
            actor_id TEXT,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            details TEXT,
            ip_address TEXT,
            user_agent TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_resource ON audit_logs(resource_type, resource_id);
        "#,
    )
}
