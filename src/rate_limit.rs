//! Per-IP rate limiting for the authenticated account endpoints.
//!
//! The webhook route is not limited: Stripe retries on 429 and a burst of
//! deliveries after an outage is expected.
//!
//! Configure via RATE_LIMIT_STANDARD_RPM (default: 30, 0 disables).

use std::sync::Arc;
use std::time::Duration;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;

/// Rate limiter layer type alias using governor types directly
pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Creates the standard-tier limiter, or `None` when limiting is disabled.
///
/// Keys on the peer address, so the server must be run with
/// `into_make_service_with_connect_info`.
pub fn standard_layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    if requests_per_minute == 0 {
        return None;
    }

    let period_secs = 60 / requests_per_minute as u64;
    let config = GovernorConfigBuilder::default()
        .period(Duration::from_secs(period_secs.max(1)))
        .burst_size(requests_per_minute)
        .finish()?;

    Some(GovernorLayer::new(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_disables_limiter() {
        assert!(standard_layer(0).is_none());
    }

    #[test]
    fn test_positive_rate_builds_layer() {
        assert!(standard_layer(30).is_some());
        assert!(standard_layer(120).is_some());
    }
}
