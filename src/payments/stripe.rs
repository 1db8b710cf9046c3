use reqwest::Client;
use serde::Deserialize;

use crate::config::StripeConfig;
use crate::error::{AppError, Result, msg};

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: String,
}

/// Parameters for a hosted checkout.
#[derive(Debug)]
pub struct CheckoutRequest<'a> {
    pub order_id: &'a str,
    /// Stripe Price ID (price_xxx) configured in the dashboard
    pub price_id: &'a str,
    pub quantity: i64,
    pub customer_email: Option<&'a str>,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

/// A created hosted checkout page.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(client: Client, config: &StripeConfig) -> Result<Self> {
        let secret_key = config
            .secret_key
            .clone()
            .ok_or_else(|| AppError::BadRequest(msg::STRIPE_NOT_CONFIGURED.into()))?;
        Ok(Self {
            client,
            secret_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Create a Stripe checkout session for an order.
    ///
    /// The order id travels as `client_reference_id` and in metadata on both the
    /// session and its payment intent, so the dashboard can cross-reference.
    pub async fn create_checkout_session(&self, req: &CheckoutRequest<'_>) -> Result<CheckoutSession> {
        let quantity = req.quantity.to_string();
        let mut form = vec![
            ("mode", "payment"),
            ("success_url", req.success_url),
            ("cancel_url", req.cancel_url),
            ("line_items[0][price]", req.price_id),
            ("line_items[0][quantity]", quantity.as_str()),
            ("client_reference_id", req.order_id),
            ("metadata[order_id]", req.order_id),
            ("payment_intent_data[metadata][order_id]", req.order_id),
        ];
        if let Some(email) = req.customer_email {
            form.push(("customer_email", email));
        }

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Stripe API error: {}",
                error_text
            )));
        }

        let session: CreateCheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::DEFAULT_STRIPE_API_BASE;

    fn config(secret_key: Option<&str>, api_base: &str) -> StripeConfig {
        StripeConfig {
            secret_key: secret_key.map(String::from),
            webhook_secret: None,
            api_base: api_base.to_string(),
        }
    }

    #[test]
    fn test_client_requires_secret_key() {
        let err = StripeClient::new(Client::new(), &config(None, DEFAULT_STRIPE_API_BASE)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(StripeClient::new(Client::new(), &config(Some("sk_test_x"), DEFAULT_STRIPE_API_BASE)).is_ok());
    }

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        let client =
            StripeClient::new(Client::new(), &config(Some("sk_test_x"), "http://localhost:12111/v1/")).unwrap();
        assert_eq!(client.api_base, "http://localhost:12111/v1");
    }
}
