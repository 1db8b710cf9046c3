mod from_row;
pub mod queries;
mod schema;

pub use schema::{init_audit_db, init_db};

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::access::AccessResolver;
use crate::config::StripeConfig;
use crate::email::OrderEmailService;
use crate::jwt::SessionVerifier;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding database pools and configuration
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (orders, roles)
    pub db: DbPool,
    /// Audit log database pool (separate file to isolate growth)
    pub audit: DbPool,
    pub audit_log_enabled: bool,
    pub stripe: StripeConfig,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub sessions: Arc<SessionVerifier>,
    pub access: Arc<AccessResolver>,
    pub email_service: Arc<OrderEmailService>,
    pub http_client: reqwest::Client,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    // Bootstrap promotion takes an immediate write lock; wait instead of failing
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
    Pool::builder().max_size(10).build(manager)
}
