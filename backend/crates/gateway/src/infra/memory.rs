//! In-memory Repository
//!
//! Same semantics as the Postgres repository with one process-wide lock
//! standing in for row locks. For tests and single-process development.

use std::collections::HashMap;
use std::sync::Arc;

use kernel::id::OtpTokenId;
use platform::rate_limit::{FixedWindow, RateLimitConfig, RateLimitResult};
use tokio::sync::Mutex;

use crate::domain::entities::{Account, AttemptRecord, OtpToken, RateLimitEntry};
use crate::domain::repository::{AccountRepository, OtpRepository, RateLimitRepository};
use crate::domain::value_objects::{Email, Identity, RateLimitAction};
use crate::error::GatewayResult;

#[derive(Default)]
struct MemoryState {
    accounts: Vec<Account>,
    tokens: Vec<OtpToken>,
    rate_limits: HashMap<(String, RateLimitAction), RateLimitEntry>,
}

impl MemoryState {
    /// Newest unused token for the email
    fn active_token_mut(&mut self, email: &Email) -> Option<&mut OtpToken> {
        self.tokens
            .iter_mut()
            .filter(|t| &t.email == email && !t.used)
            .max_by_key(|t| t.created_at)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryGatewayRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryGatewayRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently issued token for the email, used or not
    pub async fn latest_token(&self, email: &Email) -> Option<OtpToken> {
        let state = self.state.lock().await;
        state
            .tokens
            .iter()
            .filter(|t| &t.email == email)
            .max_by_key(|t| t.created_at)
            .cloned()
    }
}

impl OtpRepository for InMemoryGatewayRepository {
    async fn replace(&self, token: &OtpToken) -> GatewayResult<()> {
        let mut state = self.state.lock().await;
        for existing in state.tokens.iter_mut().filter(|t| t.email == token.email) {
            existing.used = true;
        }
        state.tokens.push(token.clone());
        Ok(())
    }

    async fn record_attempt(&self, email: &Email) -> GatewayResult<Option<AttemptRecord>> {
        let mut state = self.state.lock().await;
        Ok(state.active_token_mut(email).map(|token| {
            let prior_attempts = token.attempts;
            if token.attempts < token.max_attempts {
                token.attempts += 1;
            }
            AttemptRecord {
                token: token.clone(),
                prior_attempts,
            }
        }))
    }

    async fn mark_used(&self, token_id: OtpTokenId) -> GatewayResult<bool> {
        let mut state = self.state.lock().await;
        let email = match state.tokens.iter_mut().find(|t| t.id == token_id && !t.used) {
            Some(token) => {
                token.used = true;
                token.email.clone()
            }
            None => return Ok(false),
        };
        for sibling in state.tokens.iter_mut().filter(|t| t.email == email) {
            sibling.used = true;
        }
        Ok(true)
    }

    async fn delete_expired(&self, cutoff_ms: i64, batch: u32) -> GatewayResult<u64> {
        let mut state = self.state.lock().await;
        let mut remaining = batch as usize;
        state.tokens.retain(|t| {
            if remaining > 0 && t.expires_at_ms < cutoff_ms {
                remaining -= 1;
                false
            } else {
                true
            }
        });
        Ok((batch as usize - remaining) as u64)
    }
}

impl RateLimitRepository for InMemoryGatewayRepository {
    async fn check(
        &self,
        key: &str,
        action: RateLimitAction,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> GatewayResult<RateLimitResult> {
        let mut state = self.state.lock().await;
        let slot = (key.to_string(), action);

        let current = state.rate_limits.get(&slot).map(|e| FixedWindow {
            count: e.count,
            window_start_ms: e.window_start_ms,
        });
        let window = FixedWindow::advance(current, now_ms, config.window_ms());

        state.rate_limits.insert(
            slot,
            RateLimitEntry {
                key: key.to_string(),
                action,
                count: window.count,
                window_start_ms: window.window_start_ms,
            },
        );

        Ok(RateLimitResult::from_window(window, config))
    }

    async fn delete_stale(&self, cutoff_ms: i64, batch: u32) -> GatewayResult<u64> {
        let mut state = self.state.lock().await;
        let stale: Vec<_> = state
            .rate_limits
            .iter()
            .filter(|(_, e)| e.window_start_ms < cutoff_ms)
            .map(|(slot, _)| slot.clone())
            .take(batch as usize)
            .collect();
        for slot in &stale {
            state.rate_limits.remove(slot);
        }
        Ok(stale.len() as u64)
    }
}

impl AccountRepository for InMemoryGatewayRepository {
    async fn find_by_email(&self, email: &Email) -> GatewayResult<Option<Account>> {
        let state = self.state.lock().await;
        Ok(state.accounts.iter().find(|a| &a.email == email).cloned())
    }

    async fn link_identity(&self, email: &Email, identity: &Identity) -> GatewayResult<Account> {
        let mut state = self.state.lock().await;
        if let Some(account) = state.accounts.iter_mut().find(|a| &a.email == email) {
            if account.did.is_none() {
                account.did = Some(identity.did.clone());
            }
            if account.handle.is_none() {
                account.handle = identity.handle.clone();
            }
            return Ok(account.clone());
        }

        let account = Account::new(email.clone(), identity);
        state.accounts.push(account.clone());
        Ok(account)
    }
}
