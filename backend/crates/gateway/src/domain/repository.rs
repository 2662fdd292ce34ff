//! Repository Traits
//!
//! Interfaces for the shared store. Implementations are in the infra layer.
//! Every counter mutation is a single atomic storage operation.

use kernel::id::OtpTokenId;
use platform::rate_limit::{RateLimitConfig, RateLimitResult};

use crate::domain::entities::{Account, AttemptRecord, OtpToken};
use crate::domain::value_objects::{Email, Identity, RateLimitAction};
use crate::error::GatewayResult;

/// OTP token repository trait
#[trait_variant::make(OtpRepository: Send)]
pub trait LocalOtpRepository {
    /// Mark every outstanding token for the email used and insert `token`,
    /// in one transaction. Concurrent calls for one email are serialized.
    async fn replace(&self, token: &OtpToken) -> GatewayResult<()>;

    /// Count one attempt against the newest unused token for the email.
    /// The increment stops at `max_attempts`. `None` when no unused token exists.
    async fn record_attempt(&self, email: &Email) -> GatewayResult<Option<AttemptRecord>>;

    /// Flip `used` to true and retire every other outstanding token for the
    /// same email. Returns false if the token was already terminal.
    async fn mark_used(&self, token_id: OtpTokenId) -> GatewayResult<bool>;

    /// Delete up to `batch` tokens that expired before `cutoff_ms`
    async fn delete_expired(&self, cutoff_ms: i64, batch: u32) -> GatewayResult<u64>;
}

/// Rate limit repository trait
#[trait_variant::make(RateLimitRepository: Send)]
pub trait LocalRateLimitRepository {
    /// Read-or-create the current window for `(key, action)`, increment it
    /// and compare against the limit, atomically
    async fn check(
        &self,
        key: &str,
        action: RateLimitAction,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> GatewayResult<RateLimitResult>;

    /// Delete up to `batch` windows that started before `cutoff_ms`
    async fn delete_stale(&self, cutoff_ms: i64, batch: u32) -> GatewayResult<u64>;
}

/// Account repository trait
#[trait_variant::make(AccountRepository: Send)]
pub trait LocalAccountRepository {
    async fn find_by_email(&self, email: &Email) -> GatewayResult<Option<Account>>;

    /// Create the account if missing, otherwise attach identity fields that
    /// are still empty. Existing identity fields are never overwritten.
    async fn link_identity(&self, email: &Email, identity: &Identity) -> GatewayResult<Account>;
}

/// Everything the gateway needs from its store
pub trait GatewayRepository:
    OtpRepository + RateLimitRepository + AccountRepository + Clone + Send + Sync + 'static
{
}

impl<T> GatewayRepository for T where
    T: OtpRepository + RateLimitRepository + AccountRepository + Clone + Send + Sync + 'static
{
}
