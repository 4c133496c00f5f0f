//! Minimum spacing between calls to one provider.

use governor::{DefaultDirectRateLimiter, Quota};
use std::sync::Arc;
use std::time::Duration;

/// Limiter shared by every fetch that hits the same provider: one permit per
/// `min_spacing`, burst of one. `None` when the spacing is zero.
pub fn provider_limiter(min_spacing: Duration) -> Option<Arc<DefaultDirectRateLimiter>> {
    Quota::with_period(min_spacing).map(|quota| Arc::new(DefaultDirectRateLimiter::direct(quota)))
}
