//! Order confirmation emails.
//!
//! Sent via the Resend API when a key is configured; otherwise delivery is
//! disabled and only logged.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;

use crate::db::{DbPool, queries};
use crate::error::{AppError, Result};
use crate::models::{Order, OrderStatus};

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Format a Unix timestamp as a human-readable date (e.g., "Jan 15, 2024")
fn format_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "Unknown date".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    Sent,
    /// No API key configured
    Disabled,
    /// Order has no address or is not paid
    Skipped,
}

#[derive(Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    text: String,
}

pub struct OrderEmailService {
    client: Client,
    api_key: Option<String>,
    from_email: String,
}

impl OrderEmailService {
    pub fn new(client: Client, api_key: Option<String>, from_email: String) -> Self {
        Self {
            client,
            api_key,
            from_email,
        }
    }

    /// Send the confirmation for a paid order.
    pub async fn send_order_confirmation(&self, order: &Order) -> Result<EmailSendResult> {
        if order.status != OrderStatus::Paid {
            return Ok(EmailSendResult::Skipped);
        }
        let Some(to) = order.customer_email.as_deref() else {
            tracing::warn!("Order {} has no customer email, confirmation not sent", order.id);
            return Ok(EmailSendResult::Skipped);
        };
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::info!("Email disabled, would send confirmation for order {} to {}", order.id, to);
            return Ok(EmailSendResult::Disabled);
        };

        let email = ResendEmail {
            from: &self.from_email,
            to: [to],
            subject: format!("Order confirmed ({})", short_id(&order.id)),
            text: confirmation_text(order),
        };

        let mut last_error = None;
        for (attempt, delay) in std::iter::once(&0).chain(RETRY_DELAYS).enumerate() {
            if *delay > 0 {
                tokio::time::sleep(Duration::from_secs(*delay)).await;
            }
            match self.post(api_key, &email).await {
                Ok(()) => {
                    tracing::info!("Order confirmation sent for {}", order.id);
                    return Ok(EmailSendResult::Sent);
                }
                Err(e) => {
                    tracing::warn!(
                        "Order confirmation attempt {} failed for {}: {}",
                        attempt + 1,
                        order.id,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::Internal("Email delivery failed".into())))
    }

    async fn post(&self, api_key: &str, email: &ResendEmail<'_>) -> Result<()> {
        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(email)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Resend API error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!("Resend API error {}: {}", status, body)));
        }
        Ok(())
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn confirmation_text(order: &Order) -> String {
    format!(
        "Thanks for your order!\n\nOrder: {}\nQuantity: {}\nPaid on: {}\n",
        order.id,
        order.quantity,
        format_date(order.updated_at)
    )
}

/// Read the order back and send its confirmation in the background.
pub fn spawn_order_confirmation(
    service: std::sync::Arc<OrderEmailService>,
    db: DbPool,
    order_id: String,
) {
    tokio::spawn(async move {
        let order = match db.get().map_err(AppError::from).and_then(|conn| {
            queries::get_order_by_id(&conn, &order_id)
        }) {
            Ok(Some(order)) => order,
            Ok(None) => {
                tracing::warn!("Confirmation skipped: order {} disappeared", order_id);
                return;
            }
            Err(e) => {
                tracing::warn!("Confirmation skipped: failed to load order {}: {}", order_id, e);
                return;
            }
        };

        if let Err(e) = service.send_order_confirmation(&order).await {
            tracing::error!("Order confirmation for {} failed: {}", order_id, e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus, email: Option<&str>) -> Order {
        Order {
            id: "order-1234567890".into(),
            user_id: None,
            customer_email: email.map(String::from),
            status,
            stripe_checkout_session_id: None,
            stripe_payment_intent_id: Some("pi_1".into()),
            price_id: None,
            quantity: 1,
            created_at: 0,
            updated_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_unpaid_order_is_skipped() {
        let service = OrderEmailService::new(Client::new(), Some("key".into()), "from@x.test".into());
        let result = service
            .send_order_confirmation(&order(OrderStatus::Pending, Some("a@x.test")))
            .await
            .unwrap();
        assert_eq!(result, EmailSendResult::Skipped);
    }

    #[tokio::test]
    async fn test_without_api_key_is_disabled() {
        let service = OrderEmailService::new(Client::new(), None, "from@x.test".into());
        let result = service
            .send_order_confirmation(&order(OrderStatus::Paid, Some("a@x.test")))
            .await
            .unwrap();
        assert_eq!(result, EmailSendResult::Disabled);
    }

    #[test]
    fn test_confirmation_text_mentions_order() {
        let text = confirmation_text(&order(OrderStatus::Paid, None));
        assert!(text.contains("order-1234567890"));
        assert!(text.contains("Nov 14, 2023"));
        assert_eq!(short_id("order-1234567890"), "order-12");
    }
}
