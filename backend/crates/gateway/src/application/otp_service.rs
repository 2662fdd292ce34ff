//! OTP Service
//!
//! Issues codes and verifies them against the newest unused token for an
//! email. The attempt is counted by the store before the code is compared.

use std::sync::Arc;

use chrono::Utc;

use crate::application::config::GatewayConfig;
use crate::domain::entities::OtpToken;
use crate::domain::repository::OtpRepository;
use crate::domain::services::{evaluate_attempt, generate_code, hash_code};
use crate::domain::value_objects::{Email, OtpCode};
use crate::error::{GatewayError, GatewayResult, OtpFailure};

/// A freshly issued code. The only place the raw code exists.
#[derive(Debug, Clone)]
pub struct GeneratedOtp {
    pub code: OtpCode,
    pub expires_at_ms: i64,
}

pub struct OtpService<R>
where
    R: OtpRepository,
{
    repo: Arc<R>,
    config: Arc<GatewayConfig>,
}

impl<R> OtpService<R>
where
    R: OtpRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<GatewayConfig>) -> Self {
        Self { repo, config }
    }

    /// Issue a new code, superseding any outstanding one for the email
    pub async fn generate_otp(&self, email: &Email) -> GatewayResult<GeneratedOtp> {
        let code = generate_code(self.config.otp_length, self.config.otp_charset);
        let hash = hash_code(&self.config.otp_pepper, email, &code);
        let token = OtpToken::new(
            email.clone(),
            hash.to_vec(),
            self.config.otp_max_attempts,
            self.config.otp_ttl_ms(),
        );

        self.repo.replace(&token).await?;

        tracing::info!(
            token_id = %token.id,
            email = %email.masked(),
            expires_at_ms = token.expires_at_ms,
            "Issued OTP"
        );

        Ok(GeneratedOtp {
            code,
            expires_at_ms: token.expires_at_ms,
        })
    }

    /// `Err(GatewayError::Otp(reason))` on any verification failure
    pub async fn verify_otp(&self, email: &Email, code: &OtpCode) -> GatewayResult<()> {
        let record = self
            .repo
            .record_attempt(email)
            .await?
            .ok_or(OtpFailure::NoActiveToken)
            .inspect_err(|reason| {
                tracing::info!(email = %email.masked(), reason = %reason, "OTP rejected");
            })?;

        let now_ms = Utc::now().timestamp_millis();
        let supplied = hash_code(&self.config.otp_pepper, email, code);

        if let Err(reason) = evaluate_attempt(&record, now_ms, &supplied) {
            tracing::info!(
                token_id = %record.token.id,
                email = %email.masked(),
                attempts = record.token.attempts,
                reason = %reason,
                "OTP rejected"
            );
            return Err(GatewayError::Otp(reason));
        }

        // A concurrent success may have consumed the token first.
        if !self.repo.mark_used(record.token.id).await? {
            tracing::info!(token_id = %record.token.id, "OTP already consumed");
            return Err(GatewayError::Otp(OtpFailure::NoActiveToken));
        }

        tracing::info!(
            token_id = %record.token.id,
            email = %email.masked(),
            "OTP verified"
        );
        Ok(())
    }

    /// Purge tokens that expired more than the retention margin ago
    pub async fn cleanup_expired(&self, now_ms: i64) -> GatewayResult<u64> {
        let cutoff = now_ms - self.config.retention_ms();
        let batch = self.config.cleanup_batch_size;
        let mut total = 0;
        loop {
            let deleted = self.repo.delete_expired(cutoff, batch).await?;
            total += deleted;
            if deleted < batch as u64 {
                break;
            }
        }
        Ok(total)
    }
}
