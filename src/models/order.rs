use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Order status. Transitions only move forward: `pending` may become `paid`
/// or `failed`, `failed` may heal to `paid`, and `paid` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 3] = [OrderStatus::Pending, OrderStatus::Paid, OrderStatus::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
        }
    }

    /// Whether moving from `self` to `next` is an accepted, state-changing transition.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Pending, OrderStatus::Failed)
                | (OrderStatus::Failed, OrderStatus::Paid)
        )
    }

    /// Every status an order may be in for a transition to `next` to apply.
    /// The conditional updates in `db::queries` guard on exactly this set.
    pub fn sources_of(next: OrderStatus) -> Vec<OrderStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(next))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Session subject of the customer who started checkout
    pub user_id: Option<String>,
    pub customer_email: Option<String>,
    pub status: OrderStatus,
    pub stripe_checkout_session_id: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
    pub price_id: Option<String>,
    pub quantity: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateOrder {
    pub user_id: Option<String>,
    pub customer_email: Option<String>,
    pub price_id: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    /// Known up front only when the intent is created outside hosted checkout
    #[serde(default)]
    pub stripe_payment_intent_id: Option<String>,
}

fn default_quantity() -> i64 {
    1
}
