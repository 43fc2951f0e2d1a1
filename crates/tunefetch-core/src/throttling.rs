use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tracing::debug;

use crate::orchestrator::Endpoint;

type KeyedRateLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Per-endpoint request budget shared by every orchestrator clone.
#[derive(Clone)]
pub struct UpstreamThrottle {
    limiter: Arc<KeyedRateLimiter>,
}

impl UpstreamThrottle {
    pub fn new(quota_window: Duration, quota_limit: u32) -> Self {
        let quota = quota_from_window(quota_window, quota_limit);
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    pub fn per_minute(requests: u32) -> Self {
        Self::new(Duration::from_secs(60), requests)
    }

    /// Takes one unit of budget for `endpoint` if available right now.
    pub fn try_acquire(&self, endpoint: &Endpoint) -> bool {
        self.limiter
            .check_key(&endpoint.as_str().to_owned())
            .is_ok()
    }

    /// Waits until `endpoint` has budget, then consumes it.
    pub async fn until_ready(&self, endpoint: &Endpoint) {
        let key = endpoint.as_str().to_owned();
        if self.limiter.check_key(&key).is_ok() {
            return;
        }
        debug!(endpoint = %endpoint, "upstream quota exhausted, waiting");
        self.limiter.until_key_ready(&key).await;
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = quota_limit.max(1);
    let burst = NonZeroU32::new(safe_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budgets_are_tracked_per_endpoint() {
        let throttle = UpstreamThrottle::new(Duration::from_secs(60), 2);
        let first = Endpoint::parse("https://a.test").expect("valid");
        let second = Endpoint::parse("https://b.test").expect("valid");

        assert!(throttle.try_acquire(&first));
        assert!(throttle.try_acquire(&first));
        assert!(!throttle.try_acquire(&first));

        assert!(throttle.try_acquire(&second));
    }

    #[tokio::test]
    async fn until_ready_returns_immediately_with_budget() {
        let throttle = UpstreamThrottle::per_minute(10);
        let endpoint = Endpoint::parse("https://a.test").expect("valid");

        throttle.until_ready(&endpoint).await;
        assert!(throttle.try_acquire(&endpoint));
    }
}
