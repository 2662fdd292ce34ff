//! Send Code Use Case
//!
//! Every outcome after the client-address gate looks the same to the
//! caller: the masked email and nothing else.

use std::net::IpAddr;
use std::sync::Arc;

use crate::application::config::GatewayConfig;
use crate::application::otp_service::OtpService;
use crate::application::rate_limiter::RateLimiter;
use crate::domain::collaborators::Mailer;
use crate::domain::repository::GatewayRepository;
use crate::domain::value_objects::{Email, RateLimitAction};
use crate::error::{GatewayError, GatewayResult};

/// Input DTO for send code
#[derive(Debug, Clone)]
pub struct SendCodeInput {
    pub email: String,
    pub client_ip: Option<IpAddr>,
}

/// Output DTO for send code
#[derive(Debug, Clone)]
pub struct SendCodeOutput {
    pub email: Email,
    pub masked_email: String,
}

/// Send Code Use Case
pub struct SendCodeUseCase<R, M>
where
    R: GatewayRepository,
    M: Mailer,
{
    otp: OtpService<R>,
    limiter: RateLimiter<R>,
    mailer: Arc<M>,
    config: Arc<GatewayConfig>,
}

impl<R, M> SendCodeUseCase<R, M>
where
    R: GatewayRepository,
    M: Mailer,
{
    pub fn new(repo: Arc<R>, mailer: Arc<M>, config: Arc<GatewayConfig>) -> Self {
        Self {
            otp: OtpService::new(repo.clone(), config.clone()),
            limiter: RateLimiter::new(repo),
            mailer,
            config,
        }
    }

    pub async fn execute(&self, input: SendCodeInput) -> GatewayResult<SendCodeOutput> {
        let ip_key = platform::client::client_key(input.client_ip);
        if !self
            .limiter
            .check(&ip_key, RateLimitAction::SendCode, &self.config.send_code_ip_limit)
            .await?
        {
            return Err(GatewayError::RateLimited);
        }

        let email = Email::parse(&input.email)?;
        let output = SendCodeOutput {
            masked_email: email.masked(),
            email: email.clone(),
        };

        if !self
            .limiter
            .check(
                email.as_str(),
                RateLimitAction::SendCode,
                &self.config.send_code_email_limit,
            )
            .await?
        {
            tracing::info!(email = %email.masked(), "Send suppressed by per-email limit");
            return Ok(output);
        }

        let otp = self.otp.generate_otp(&email).await?;

        if let Err(e) = self.mailer.send_otp(&email, &otp.code).await {
            tracing::error!(email = %email.masked(), error = %e, "OTP mail delivery failed");
        }

        Ok(output)
    }
}
