//! Application Configuration
//!
//! Configuration for the OTP gateway application layer.

use std::time::Duration;

use platform::cookie::CookieConfig;
use platform::rate_limit::RateLimitConfig;

pub use crate::domain::services::OtpCharset;
/// Re-export SameSite from platform
pub use platform::cookie::SameSite;

/// Gateway application configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Cookie carrying the signed flow state
    pub session_cookie_name: String,
    /// Script-readable double-submit cookie
    pub csrf_cookie_name: String,
    /// Header that must echo the CSRF cookie on state-changing requests
    pub csrf_header_name: String,
    /// Lifetime of both cookies and of the signed flow state
    pub cookie_ttl: Duration,
    /// Whether to require Secure cookie
    pub cookie_secure: bool,
    /// SameSite policy
    pub cookie_same_site: SameSite,
    /// HMAC key for the session cookie (32 bytes)
    pub session_secret: [u8; 32],
    /// HMAC key for callback assertions (32 bytes)
    pub callback_secret: [u8; 32],
    /// Key for the stored OTP hash (32 bytes)
    pub otp_pepper: [u8; 32],
    pub otp_length: usize,
    pub otp_charset: OtpCharset,
    pub otp_ttl: Duration,
    pub otp_max_attempts: u32,
    /// send-code, keyed by email
    pub send_code_email_limit: RateLimitConfig,
    /// send-code, keyed by client address
    pub send_code_ip_limit: RateLimitConfig,
    /// verify-code, keyed by email
    pub verify_code_email_limit: RateLimitConfig,
    /// Reverse proxies in front of the gateway that append to
    /// `X-Forwarded-For`. 0 keys limits on the socket peer.
    pub trusted_proxy_hops: usize,
    /// Validity of the callback assertion handed to the PDS
    pub assertion_ttl: Duration,
    /// `iss` of callback assertions
    pub issuer: String,
    /// PDS base URL, also the assertion audience
    pub pds_url: String,
    /// PDS path that completes the authorize step
    pub pds_authorize_path: String,
    /// How long expired rows are kept before the sweep deletes them
    pub retention: Duration,
    pub cleanup_interval: Duration,
    /// Rows deleted per sweep statement
    pub cleanup_batch_size: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            session_cookie_name: "auth-session".to_string(),
            csrf_cookie_name: "csrf-token".to_string(),
            csrf_header_name: "x-csrf-token".to_string(),
            cookie_ttl: Duration::from_secs(600),
            cookie_secure: true,
            cookie_same_site: SameSite::Lax,
            session_secret: [0u8; 32],
            callback_secret: [0u8; 32],
            otp_pepper: [0u8; 32],
            otp_length: 6,
            otp_charset: OtpCharset::Numeric,
            otp_ttl: Duration::from_secs(600),
            otp_max_attempts: 5,
            send_code_email_limit: RateLimitConfig::new(5, 900),
            send_code_ip_limit: RateLimitConfig::new(20, 900),
            verify_code_email_limit: RateLimitConfig::new(10, 900),
            trusted_proxy_hops: 0,
            assertion_ttl: Duration::from_secs(60),
            issuer: "http://localhost:3000".to_string(),
            pds_url: "http://localhost:2583".to_string(),
            pds_authorize_path: "/oauth/authorize".to_string(),
            retention: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(300),
            cleanup_batch_size: 1000,
        }
    }
}

impl GatewayConfig {
    /// Create config with random secrets (for development)
    pub fn with_random_secrets() -> Self {
        Self {
            session_secret: random_secret(),
            callback_secret: random_secret(),
            otp_pepper: random_secret(),
            ..Default::default()
        }
    }

    /// Create config for development (insecure cookie)
    pub fn development() -> Self {
        Self {
            cookie_secure: false,
            ..Self::with_random_secrets()
        }
    }

    pub fn cookie_ttl_ms(&self) -> i64 {
        self.cookie_ttl.as_millis() as i64
    }

    pub fn otp_ttl_ms(&self) -> i64 {
        self.otp_ttl.as_millis() as i64
    }

    pub fn assertion_ttl_secs(&self) -> i64 {
        self.assertion_ttl.as_secs() as i64
    }

    pub fn retention_ms(&self) -> i64 {
        self.retention.as_millis() as i64
    }

    /// httpOnly cookie holding the signed flow state
    pub fn session_cookie(&self) -> CookieConfig {
        CookieConfig {
            name: self.session_cookie_name.clone(),
            secure: self.cookie_secure,
            http_only: true,
            same_site: self.cookie_same_site,
            path: "/".to_string(),
            max_age_secs: Some(self.cookie_ttl.as_secs() as i64),
        }
    }

    /// Script-readable CSRF cookie
    pub fn csrf_cookie(&self) -> CookieConfig {
        CookieConfig {
            http_only: false,
            name: self.csrf_cookie_name.clone(),
            ..self.session_cookie()
        }
    }

    /// Absolute URL of the PDS authorize endpoint
    pub fn pds_authorize_url(&self) -> String {
        format!(
            "{}{}",
            self.pds_url.trim_end_matches('/'),
            self.pds_authorize_path
        )
    }
}

fn random_secret() -> [u8; 32] {
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&platform::crypto::random_bytes(32));
    secret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.otp_length, 6);
        assert_eq!(config.otp_max_attempts, 5);
        assert_eq!(config.otp_ttl_ms(), 600_000);
        assert_eq!(config.session_cookie_name, "auth-session");
        assert_eq!(config.csrf_header_name, "x-csrf-token");
        assert!(config.cookie_secure);
    }

    #[test]
    fn test_random_secrets_differ() {
        let config = GatewayConfig::with_random_secrets();
        assert_ne!(config.session_secret, [0u8; 32]);
        assert_ne!(config.session_secret, config.callback_secret);
        assert_ne!(config.callback_secret, config.otp_pepper);
    }

    #[test]
    fn test_cookie_configs() {
        let config = GatewayConfig::development();
        let session = config.session_cookie();
        let csrf = config.csrf_cookie();
        assert!(session.http_only);
        assert!(!csrf.http_only);
        assert!(!csrf.secure);
        assert_eq!(csrf.name, "csrf-token");
        assert_eq!(csrf.max_age_secs, Some(600));
    }

    #[test]
    fn test_pds_authorize_url() {
        let config = GatewayConfig {
            pds_url: "https://pds.example/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.pds_authorize_url(), "https://pds.example/oauth/authorize");
    }
}
