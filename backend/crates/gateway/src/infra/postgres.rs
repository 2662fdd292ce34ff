//! PostgreSQL Repository Implementations
//!
//! Each counter mutation is one statement, so concurrent gateway instances
//! sharing the database cannot lose updates.

use chrono::{DateTime, Utc};
use kernel::id::{AccountId, OtpTokenId};
use platform::rate_limit::{FixedWindow, RateLimitConfig, RateLimitResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{Account, AttemptRecord, OtpToken};
use crate::domain::repository::{AccountRepository, OtpRepository, RateLimitRepository};
use crate::domain::value_objects::{Email, Identity, RateLimitAction};
use crate::error::GatewayResult;

/// PostgreSQL-backed repository
#[derive(Clone)]
pub struct PgGatewayRepository {
    pool: PgPool,
}

impl PgGatewayRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl OtpRepository for PgGatewayRepository {
    async fn replace(&self, token: &OtpToken) -> GatewayResult<()> {
        let mut tx = self.pool.begin().await?;

        // Sends for the same email queue here until the holder commits, so
        // each UPDATE sees every token inserted before it.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(token.email.as_str())
            .execute(&mut *tx)
            .await?;

        let superseded =
            sqlx::query("UPDATE otp_tokens SET used = TRUE WHERE email = $1 AND used = FALSE")
                .bind(token.email.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO otp_tokens (
                id,
                email,
                token_hash,
                attempts,
                max_attempts,
                expires_at_ms,
                used,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(token.id.into_uuid())
        .bind(token.email.as_str())
        .bind(&token.token_hash)
        .bind(token.attempts as i32)
        .bind(token.max_attempts as i32)
        .bind(token.expires_at_ms)
        .bind(token.used)
        .bind(token.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            token_id = %token.id,
            superseded = superseded,
            "OTP token stored"
        );

        Ok(())
    }

    async fn record_attempt(&self, email: &Email) -> GatewayResult<Option<AttemptRecord>> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            WITH target AS (
                SELECT id, attempts AS prior_attempts
                FROM otp_tokens
                WHERE email = $1 AND used = FALSE
                ORDER BY created_at DESC, id DESC
                LIMIT 1
                FOR UPDATE
            )
            UPDATE otp_tokens t
            SET attempts = CASE
                WHEN t.attempts < t.max_attempts THEN t.attempts + 1
                ELSE t.attempts
            END
            FROM target
            WHERE t.id = target.id
            RETURNING
                t.id,
                t.email,
                t.token_hash,
                t.attempts,
                t.max_attempts,
                t.expires_at_ms,
                t.used,
                t.created_at,
                target.prior_attempts
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AttemptRow::into_record))
    }

    async fn mark_used(&self, token_id: OtpTokenId) -> GatewayResult<bool> {
        // The winner also retires every other outstanding code for the email.
        let won: i64 = sqlx::query_scalar(
            r#"
            WITH won AS (
                UPDATE otp_tokens
                SET used = TRUE
                WHERE id = $1 AND used = FALSE
                RETURNING email
            ),
            retired AS (
                UPDATE otp_tokens o
                SET used = TRUE
                FROM won
                WHERE o.email = won.email AND o.used = FALSE AND o.id <> $1
            )
            SELECT COUNT(*) FROM won
            "#,
        )
        .bind(token_id.into_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(won == 1)
    }

    async fn delete_expired(&self, cutoff_ms: i64, batch: u32) -> GatewayResult<u64> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM otp_tokens
            WHERE id IN (
                SELECT id FROM otp_tokens
                WHERE expires_at_ms < $1
                LIMIT $2
            )
            "#,
        )
        .bind(cutoff_ms)
        .bind(batch as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted)
    }
}

impl RateLimitRepository for PgGatewayRepository {
    async fn check(
        &self,
        key: &str,
        action: RateLimitAction,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> GatewayResult<RateLimitResult> {
        let (count, window_start_ms) = sqlx::query_as::<_, (i32, i64)>(
            r#"
            INSERT INTO rate_limit_entries (key, action, count, window_start_ms)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (key, action) DO UPDATE SET
                count = CASE
                    WHEN $3 - rate_limit_entries.window_start_ms < $4
                        THEN rate_limit_entries.count + 1
                    ELSE 1
                END,
                window_start_ms = CASE
                    WHEN $3 - rate_limit_entries.window_start_ms < $4
                        THEN rate_limit_entries.window_start_ms
                    ELSE $3
                END
            RETURNING count, window_start_ms
            "#,
        )
        .bind(key)
        .bind(action.as_str())
        .bind(now_ms)
        .bind(config.window_ms())
        .fetch_one(&self.pool)
        .await?;

        let window = FixedWindow {
            count: count.max(0) as u32,
            window_start_ms,
        };

        Ok(RateLimitResult::from_window(window, config))
    }

    async fn delete_stale(&self, cutoff_ms: i64, batch: u32) -> GatewayResult<u64> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM rate_limit_entries
            WHERE id IN (
                SELECT id FROM rate_limit_entries
                WHERE window_start_ms < $1
                LIMIT $2
            )
            "#,
        )
        .bind(cutoff_ms)
        .bind(batch as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted)
    }
}

impl AccountRepository for PgGatewayRepository {
    async fn find_by_email(&self, email: &Email) -> GatewayResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, did, handle, created_at FROM accounts WHERE email = $1",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AccountRow::into_account))
    }

    async fn link_identity(&self, email: &Email, identity: &Identity) -> GatewayResult<Account> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO accounts (id, email, did, handle)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE SET
                did = COALESCE(accounts.did, EXCLUDED.did),
                handle = COALESCE(accounts.handle, EXCLUDED.handle)
            RETURNING id, email, did, handle, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email.as_str())
        .bind(&identity.did)
        .bind(identity.handle.as_deref())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(account_id = %row.id, "Account identity linked");

        Ok(row.into_account())
    }
}

// Internal row types for sqlx mapping
#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    email: String,
    token_hash: Vec<u8>,
    attempts: i32,
    max_attempts: i32,
    expires_at_ms: i64,
    used: bool,
    created_at: DateTime<Utc>,
    prior_attempts: i32,
}

impl AttemptRow {
    fn into_record(self) -> AttemptRecord {
        AttemptRecord {
            token: OtpToken {
                id: OtpTokenId::from_uuid(self.id),
                email: Email::from_db(self.email),
                token_hash: self.token_hash,
                attempts: self.attempts.max(0) as u32,
                max_attempts: self.max_attempts.max(0) as u32,
                expires_at_ms: self.expires_at_ms,
                used: self.used,
                created_at: self.created_at,
            },
            prior_attempts: self.prior_attempts.max(0) as u32,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    did: Option<String>,
    handle: Option<String>,
    created_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self) -> Account {
        Account {
            id: AccountId::from_uuid(self.id),
            email: Email::from_db(self.email),
            did: self.did,
            handle: self.handle,
            created_at: self.created_at,
        }
    }
}
