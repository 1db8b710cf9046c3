mod stripe;
pub mod webhook;

pub use stripe::*;
pub use webhook::{
    CheckoutCompleted, PaymentIntentEvent, SIGNATURE_HEADER, VerifyError, WebhookEvent,
    WebhookVerifier,
};
