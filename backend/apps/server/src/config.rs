//! Server Configuration
//!
//! Reads the environment (after `.env` is loaded) into the gateway config
//! and the choice of mail and identity collaborators.

use std::env;
use std::net::SocketAddr;

use anyhow::{Context, bail};
use gateway::GatewayConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:31113";

/// Where OTP mail goes
pub enum MailSettings {
    /// Log the code (development only)
    Log,
    Http {
        api_url: String,
        api_key: Option<String>,
        from: String,
    },
}

pub struct ServerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub gateway: GatewayConfig,
    pub mail: MailSettings,
    /// Enables identity lookup against the PDS admin API
    pub pds_admin_password: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let database_max_connections = optional("DATABASE_MAX_CONNECTIONS")
            .map(|v| v.parse::<u32>())
            .transpose()
            .context("DATABASE_MAX_CONNECTIONS must be a number")?
            .unwrap_or(5);

        let bind_addr = optional("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR must be host:port")?;

        let mut gateway = if cfg!(debug_assertions) {
            GatewayConfig::development()
        } else {
            GatewayConfig::default()
        };

        for (name, slot) in [
            ("SESSION_SECRET", &mut gateway.session_secret),
            ("CALLBACK_SECRET", &mut gateway.callback_secret),
            ("OTP_PEPPER", &mut gateway.otp_pepper),
        ] {
            match secret(name)? {
                Some(value) => *slot = value,
                None if cfg!(debug_assertions) => {
                    tracing::warn!(name, "Secret not set, using a random one");
                }
                None => bail!("{} must be set in production", name),
            }
        }

        if let Some(pds_url) = optional("PDS_URL") {
            gateway.pds_url = pds_url;
        }
        if let Some(issuer) = optional("GATEWAY_ISSUER") {
            gateway.issuer = issuer;
        }
        if let Some(hops) = optional("TRUSTED_PROXY_HOPS") {
            gateway.trusted_proxy_hops = hops
                .parse()
                .context("TRUSTED_PROXY_HOPS must be a number")?;
        }

        let mail = match optional("MAIL_API_URL") {
            Some(api_url) => MailSettings::Http {
                api_url,
                api_key: optional("MAIL_API_KEY"),
                from: optional("MAIL_FROM").context("MAIL_FROM must be set with MAIL_API_URL")?,
            },
            None if cfg!(debug_assertions) => MailSettings::Log,
            None => bail!("MAIL_API_URL must be set in production"),
        };

        Ok(Self {
            database_url,
            database_max_connections,
            bind_addr,
            gateway,
            mail,
            pds_admin_password: optional("PDS_ADMIN_PASSWORD"),
        })
    }
}

/// Unset and empty are the same
fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Base64 (standard alphabet) encoded 32-byte key
fn secret(name: &str) -> anyhow::Result<Option<[u8; 32]>> {
    let Some(encoded) = optional(name) else {
        return Ok(None);
    };
    let bytes = platform::crypto::from_base64(encoded.trim())
        .with_context(|| format!("{} must be base64", name))?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("{} must decode to 32 bytes", name))?;
    Ok(Some(key))
}
