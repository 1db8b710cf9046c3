use std::env;
use std::time::Duration;

/// Stripe credentials. The webhook secret and API key are configured
/// independently so a deployment can reconcile without creating checkouts.
pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    /// REST base, overridable for a local mock
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    pub audit_log_enabled: bool,
    /// Days to keep audit rows (0 = never purge)
    pub audit_log_retention_days: i64,
    pub base_url: String,
    pub dev_mode: bool,
    pub stripe: StripeConfig,
    /// HS256 secret the auth backend signs session tokens with
    pub session_jwt_secret: String,
    pub session_jwt_audience: Option<String>,
    /// Emails that always resolve to admin, lowercased
    pub operator_emails: Vec<String>,
    pub bootstrap_settle_delay: Duration,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    /// Requests per minute for authenticated routes (0 = disabled)
    pub rate_limit_standard_rpm: u32,
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a comma-separated allow-list into trimmed, lowercased entries.
pub fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("STOREFRONT_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url = env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let session_jwt_secret = match env_opt("SESSION_JWT_SECRET") {
            Some(secret) => secret,
            None if dev_mode => {
                tracing::warn!("SESSION_JWT_SECRET not set, using insecure dev secret");
                "storefront-dev-session-secret".to_string()
            }
            None => {
                tracing::error!("SESSION_JWT_SECRET not set, all session tokens will be rejected");
                String::new()
            }
        };

        let bootstrap_settle_ms: u64 = env::var("BOOTSTRAP_SETTLE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(250);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "storefront.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "storefront_audit.db".to_string()),
            audit_log_enabled: env::var("AUDIT_LOG_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            audit_log_retention_days: env::var("AUDIT_LOG_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            stripe: StripeConfig {
                secret_key: env_opt("STRIPE_SECRET_KEY"),
                webhook_secret: env_opt("STRIPE_WEBHOOK_SECRET"),
                api_base: env::var("STRIPE_API_BASE")
                    .unwrap_or_else(|_| DEFAULT_STRIPE_API_BASE.to_string()),
            },
            session_jwt_secret,
            session_jwt_audience: env_opt("SESSION_JWT_AUDIENCE"),
            operator_emails: env::var("OPERATOR_EMAILS")
                .map(|v| parse_email_list(&v))
                .unwrap_or_default(),
            bootstrap_settle_delay: Duration::from_millis(bootstrap_settle_ms),
            resend_api_key: env_opt("RESEND_API_KEY"),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "orders@storefront.local".to_string()),
            checkout_success_url: env::var("CHECKOUT_SUCCESS_URL")
                .unwrap_or_else(|_| format!("{}/checkout/success", base_url)),
            checkout_cancel_url: env::var("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|_| format!("{}/checkout/cancel", base_url)),
            rate_limit_standard_rpm: env::var("RATE_LIMIT_STANDARD_RPM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            base_url,
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_email_list_normalizes_entries() {
        let emails = parse_email_list(" Ops@Example.com, ,second@example.com ");
        assert_eq!(emails, vec!["ops@example.com", "second@example.com"]);
    }

    #[test]
    fn test_parse_email_list_empty() {
        assert!(parse_email_list("").is_empty());
    }
}
