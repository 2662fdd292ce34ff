//! Domain Entities

use chrono::{DateTime, Utc};
use kernel::id::{AccountId, OtpTokenId};

use crate::domain::value_objects::{Email, Identity, RateLimitAction};

/// Account linked to an email once the upstream identity is known
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub email: Email,
    pub did: Option<String>,
    pub handle: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(email: Email, identity: &Identity) -> Self {
        Self {
            id: AccountId::new(),
            email,
            did: Some(identity.did.clone()),
            handle: identity.handle.clone(),
            created_at: Utc::now(),
        }
    }

    /// Identity fields, if the upstream system has returned them
    pub fn identity(&self) -> Option<Identity> {
        self.did.as_ref().map(|did| Identity {
            did: did.clone(),
            handle: self.handle.clone(),
        })
    }
}

/// One issued code. Only the keyed hash of the code is kept.
#[derive(Debug, Clone)]
pub struct OtpToken {
    pub id: OtpTokenId,
    pub email: Email,
    pub token_hash: Vec<u8>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub expires_at_ms: i64,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl OtpToken {
    pub fn new(email: Email, token_hash: Vec<u8>, max_attempts: u32, ttl_ms: i64) -> Self {
        let now = Utc::now();
        Self {
            id: OtpTokenId::new(),
            email,
            token_hash,
            attempts: 0,
            max_attempts,
            expires_at_ms: now.timestamp_millis() + ttl_ms,
            used: false,
            created_at: now,
        }
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Valid iff unused, under the attempt budget and not expired
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        !self.used && self.attempts < self.max_attempts && !self.is_expired_at(now_ms)
    }
}

/// Outcome of the atomic attempt increment: the token after the increment
/// plus the attempt count it had before.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub token: OtpToken,
    pub prior_attempts: u32,
}

/// Counter row for one `(key, action)` window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub key: String,
    pub action: RateLimitAction,
    pub count: u32,
    pub window_start_ms: i64,
}
