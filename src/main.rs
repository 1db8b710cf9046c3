use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;

use storefront::access::AccessResolver;
use storefront::config::Config;
use storefront::db::{AppState, create_pool, init_audit_db, init_db, queries};
use storefront::email::OrderEmailService;
use storefront::handlers;
use storefront::jwt::SessionVerifier;
use storefront::models::CreateOrder;

/// Lifetime of the dev session token printed by --seed
const DEV_TOKEN_TTL_SECS: u64 = 60 * 60 * 24;

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Payment webhook reconciliation and role resolution for the storefront")]
struct Cli {
    /// Seed the database with sample orders and print a dev session token
    #[arg(long)]
    seed: bool,

    /// Delete databases on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let user_id = "dev-user";
    let email = "dev@storefront.local";

    let existing = queries::list_orders_for_user(&conn, user_id).expect("Failed to list orders");
    if !existing.is_empty() {
        tracing::info!("Dev data already seeded, skipping");
    } else {
        for (pi, price) in [("pi_dev_pending", "price_dev_book"), ("pi_dev_second", "price_dev_print")] {
            let order = queries::create_order(
                &conn,
                &CreateOrder {
                    user_id: Some(user_id.to_string()),
                    customer_email: Some(email.to_string()),
                    price_id: Some(price.to_string()),
                    quantity: 1,
                    stripe_payment_intent_id: Some(pi.to_string()),
                },
            )
            .expect("Failed to seed order");
            tracing::info!("Seeded order {} (payment intent {})", order.id, pi);
        }
    }

    match state.sessions.issue(user_id, Some(email), DEV_TOKEN_TTL_SECS) {
        Ok(token) => {
            println!();
            println!("Dev session token for {} (valid 24h):", email);
            println!("  {}", token);
            println!();
        }
        Err(e) => tracing::warn!("Could not issue dev session token: {}", e),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.stripe.webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set: webhooks will be answered with 500");
    }

    // Create database connection pools
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    let audit_pool =
        create_pool(&config.audit_database_path).expect("Failed to create audit database pool");

    // Initialize database schemas
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }
    {
        let conn = audit_pool.get().expect("Failed to get audit connection");
        init_audit_db(&conn).expect("Failed to initialize audit database");
    }

    let http_client = reqwest::Client::new();

    let state = AppState {
        db: db_pool,
        audit: audit_pool,
        audit_log_enabled: config.audit_log_enabled,
        stripe: config.stripe.clone(),
        checkout_success_url: config.checkout_success_url.clone(),
        checkout_cancel_url: config.checkout_cancel_url.clone(),
        sessions: Arc::new(SessionVerifier::new(
            &config.session_jwt_secret,
            config.session_jwt_audience.clone(),
        )),
        access: Arc::new(AccessResolver::new(
            config.operator_emails.clone(),
            config.bootstrap_settle_delay,
        )),
        email_service: Arc::new(OrderEmailService::new(
            http_client.clone(),
            config.resend_api_key.clone(),
            config.email_from.clone(),
        )),
        http_client,
    };

    // Purge old audit logs on startup (0 = never purge)
    if config.audit_log_retention_days > 0 {
        let conn = state.audit.get().expect("Failed to get audit connection for purge");
        match queries::purge_old_audit_logs(&conn, config.audit_log_retention_days) {
            Ok(count) if count > 0 => {
                tracing::info!(
                    "Purged {} audit log entries older than {} days",
                    count,
                    config.audit_log_retention_days
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to purge old audit logs: {}", e);
            }
        }
    }

    // Seed dev data if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set STOREFRONT_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = handlers::router(state.clone(), config.rate_limit_standard_rpm)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    let audit_path = config.audit_database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: databases will be deleted on exit");
    }

    tracing::info!("Storefront server listening on {}", addr);

    // Peer addresses are needed by the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral databases...");
        for path in [&db_path, &audit_path] {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove {}: {}", path, e);
            } else {
                tracing::info!("Removed {}", path);
            }
            let _ = std::fs::remove_file(format!("{}-wal", path));
            let _ = std::fs::remove_file(format!("{}-shm", path));
        }
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
