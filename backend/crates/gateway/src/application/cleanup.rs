//! Cleanup Worker
//!
//! Periodic sweep of expired OTP tokens and stale rate-limit windows, run
//! as its own task so request handling never waits on it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::application::config::GatewayConfig;
use crate::application::otp_service::OtpService;
use crate::application::rate_limiter::RateLimiter;
use crate::domain::repository::GatewayRepository;
use crate::error::GatewayResult;

/// Rows removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub otp_tokens: u64,
    pub rate_limits: u64,
}

/// One sweep over both tables
pub struct CleanupTask<R>
where
    R: GatewayRepository,
{
    otp: OtpService<R>,
    limiter: RateLimiter<R>,
    config: Arc<GatewayConfig>,
}

impl<R> CleanupTask<R>
where
    R: GatewayRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<GatewayConfig>) -> Self {
        Self {
            otp: OtpService::new(repo.clone(), config.clone()),
            limiter: RateLimiter::new(repo),
            config,
        }
    }

    pub async fn run_once(&self, now_ms: i64) -> GatewayResult<CleanupReport> {
        let otp_tokens = self.otp.cleanup_expired(now_ms).await?;

        let longest_window = [
            &self.config.send_code_email_limit,
            &self.config.send_code_ip_limit,
            &self.config.verify_code_email_limit,
        ]
        .iter()
        .map(|limit| limit.window_ms())
        .max()
        .unwrap_or_default();

        let rate_limits = self
            .limiter
            .cleanup_old(
                now_ms,
                longest_window,
                self.config.retention_ms(),
                self.config.cleanup_batch_size,
            )
            .await?;

        tracing::info!(
            otp_tokens = otp_tokens,
            rate_limits = rate_limits,
            "Cleaned up expired gateway data"
        );

        Ok(CleanupReport {
            otp_tokens,
            rate_limits,
        })
    }
}

/// Handle to the running sweep task
pub struct CleanupWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CleanupWorker {
    /// Spawn the sweep loop. The first sweep runs one `interval` from now.
    pub fn start<R>(task: CleanupTask<R>, interval: Duration) -> Self
    where
        R: GatewayRepository,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = task.run_once(Utc::now().timestamp_millis()).await {
                            tracing::error!(error = %e, "Cleanup sweep failed");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            tracing::info!("Cleanup worker stopped");
        });

        Self { shutdown, handle }
    }

    /// Signal the loop and wait for it to finish its current sweep
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Cleanup worker panicked");
        }
    }
}
