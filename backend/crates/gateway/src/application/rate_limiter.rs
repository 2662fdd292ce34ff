//! Rate Limiter
//!
//! Gate in front of send-code and verify-code. Counting is delegated to the
//! store so windows are shared by every gateway instance.

use std::sync::Arc;

use chrono::Utc;
use platform::rate_limit::RateLimitConfig;

use crate::domain::repository::RateLimitRepository;
use crate::domain::value_objects::RateLimitAction;
use crate::error::GatewayResult;

pub struct RateLimiter<R>
where
    R: RateLimitRepository,
{
    repo: Arc<R>,
}

impl<R> RateLimiter<R>
where
    R: RateLimitRepository,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Count one request for `(key, action)`; true when it is admitted
    pub async fn check(
        &self,
        key: &str,
        action: RateLimitAction,
        config: &RateLimitConfig,
    ) -> GatewayResult<bool> {
        self.check_at(key, action, config, Utc::now().timestamp_millis())
            .await
    }

    pub async fn check_at(
        &self,
        key: &str,
        action: RateLimitAction,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> GatewayResult<bool> {
        let result = self.repo.check(key, action, config, now_ms).await?;

        if !result.allowed {
            tracing::warn!(
                action = action.as_str(),
                max = config.max_requests,
                reset_at_ms = result.reset_at_ms,
                "Rate limit exceeded"
            );
        }

        Ok(result.allowed)
    }

    /// Delete windows that ended more than `retention_ms` ago.
    /// `window_ms` is the longest configured window.
    pub async fn cleanup_old(
        &self,
        now_ms: i64,
        window_ms: i64,
        retention_ms: i64,
        batch: u32,
    ) -> GatewayResult<u64> {
        let cutoff = now_ms - window_ms - retention_ms;
        let mut total = 0;
        loop {
            let deleted = self.repo.delete_stale(cutoff, batch).await?;
            total += deleted;
            if deleted < batch as u64 {
                break;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::InMemoryGatewayRepository;

    const NOW: i64 = 1_700_000_000_000;

    fn limiter() -> RateLimiter<InMemoryGatewayRepository> {
        RateLimiter::new(Arc::new(InMemoryGatewayRepository::new()))
    }

    #[tokio::test]
    async fn test_limit_then_block() {
        let limiter = limiter();
        let config = RateLimitConfig::new(3, 60);
        for i in 0..3 {
            assert!(
                limiter
                    .check_at("a@example.com", RateLimitAction::SendCode, &config, NOW + i)
                    .await
                    .unwrap()
            );
        }
        assert!(
            !limiter
                .check_at("a@example.com", RateLimitAction::SendCode, &config, NOW + 10)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_new_window_after_expiry() {
        let limiter = limiter();
        let config = RateLimitConfig::new(1, 60);
        let key = "a@example.com";
        assert!(limiter.check_at(key, RateLimitAction::VerifyCode, &config, NOW).await.unwrap());
        assert!(!limiter.check_at(key, RateLimitAction::VerifyCode, &config, NOW + 59_999).await.unwrap());
        assert!(limiter.check_at(key, RateLimitAction::VerifyCode, &config, NOW + 60_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_actions_and_keys_are_independent() {
        let limiter = limiter();
        let config = RateLimitConfig::new(1, 60);
        assert!(limiter.check_at("k1", RateLimitAction::SendCode, &config, NOW).await.unwrap());
        assert!(limiter.check_at("k1", RateLimitAction::VerifyCode, &config, NOW).await.unwrap());
        assert!(limiter.check_at("k2", RateLimitAction::SendCode, &config, NOW).await.unwrap());
        assert!(!limiter.check_at("k1", RateLimitAction::SendCode, &config, NOW).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_old_in_batches() {
        let limiter = limiter();
        let config = RateLimitConfig::new(5, 60);
        for i in 0..5 {
            let key = format!("k{}", i);
            limiter.check_at(&key, RateLimitAction::SendCode, &config, NOW).await.unwrap();
        }
        limiter.check_at("fresh", RateLimitAction::SendCode, &config, NOW + 200_000).await.unwrap();

        let deleted = limiter
            .cleanup_old(NOW + 200_000, 60_000, 60_000, 2)
            .await
            .unwrap();
        assert_eq!(deleted, 5);
    }
}
