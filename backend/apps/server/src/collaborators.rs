//! Runtime choice of mailer and identity resolver

use gateway::GatewayConfig;
use gateway::domain::collaborators::{IdentityResolver, Mailer};
use gateway::domain::value_objects::{Email, Identity, OtpCode};
use gateway::identity::{NoIdentityResolver, PdsIdentityResolver};
use gateway::mailer::{HttpMailer, LogMailer};
use gateway::GatewayResult;

use crate::config::MailSettings;

pub enum AppMailer {
    Log(LogMailer),
    Http(HttpMailer),
}

impl AppMailer {
    pub fn from_settings(settings: &MailSettings, config: &GatewayConfig) -> anyhow::Result<Self> {
        Ok(match settings {
            MailSettings::Log => {
                tracing::warn!("MAIL_API_URL not set, OTP codes will only be logged");
                AppMailer::Log(LogMailer)
            }
            MailSettings::Http {
                api_url,
                api_key,
                from,
            } => AppMailer::Http(HttpMailer::new(
                api_url.clone(),
                api_key.clone(),
                from.clone(),
                config.otp_ttl,
            )?),
        })
    }
}

impl Mailer for AppMailer {
    async fn send_otp(&self, email: &Email, code: &OtpCode) -> GatewayResult<()> {
        match self {
            AppMailer::Log(mailer) => mailer.send_otp(email, code).await,
            AppMailer::Http(mailer) => mailer.send_otp(email, code).await,
        }
    }
}

pub enum AppIdentityResolver {
    None(NoIdentityResolver),
    Pds(PdsIdentityResolver),
}

impl AppIdentityResolver {
    pub fn from_settings(pds_url: &str, admin_password: Option<&str>) -> anyhow::Result<Self> {
        Ok(match admin_password {
            Some(password) => AppIdentityResolver::Pds(PdsIdentityResolver::new(pds_url, password)?),
            None => {
                tracing::info!("PDS_ADMIN_PASSWORD not set, identity lookup disabled");
                AppIdentityResolver::None(NoIdentityResolver)
            }
        })
    }
}

impl IdentityResolver for AppIdentityResolver {
    async fn resolve(&self, email: &Email) -> GatewayResult<Option<Identity>> {
        match self {
            AppIdentityResolver::None(resolver) => resolver.resolve(email).await,
            AppIdentityResolver::Pds(resolver) => resolver.resolve(email).await,
        }
    }
}
