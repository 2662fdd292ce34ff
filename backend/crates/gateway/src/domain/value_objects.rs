//! Domain Value Objects
//!
//! Immutable value types for the OTP gateway domain.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GatewayError, GatewayResult};

/// Maximum email length (per RFC 5321)
const EMAIL_MAX_LENGTH: usize = 254;

/// Upper bound on a submitted code; anything longer is malformed input
const CODE_MAX_LENGTH: usize = 32;

/// Normalized email address.
///
/// Validation is deliberately loose: any trimmed, lowercased string with an
/// `@` is accepted so that malformed-but-plausible addresses get the same
/// response as real ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> GatewayResult<Self> {
        let email = raw.trim().to_lowercase();

        if email.is_empty() {
            return Err(GatewayError::Validation("email is required".to_string()));
        }
        if email.len() > EMAIL_MAX_LENGTH {
            return Err(GatewayError::Validation("email is too long".to_string()));
        }
        if !email.contains('@') || email.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(GatewayError::Validation("email is malformed".to_string()));
        }

        Ok(Self(email))
    }

    /// Whether a `login_hint` should be treated as an email address
    pub fn looks_like_email(raw: &str) -> bool {
        let raw = raw.trim();
        match raw.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.'),
            None => false,
        }
    }

    /// Create from database value (assumed already normalized)
    pub fn from_db(email: impl Into<String>) -> Self {
        Self(email.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display form that hides the local part: `a***@example.com`
    pub fn masked(&self) -> String {
        let (local, domain) = self.0.split_once('@').unwrap_or((self.0.as_str(), ""));
        let first: String = local.chars().take(1).collect();
        format!("{}***@{}", first, domain)
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A one-time code as typed by the user or produced by the generator
#[derive(Clone, PartialEq, Eq)]
pub struct OtpCode(String);

impl OtpCode {
    /// Accept user input: spaces and dashes are stripped (codes are often
    /// pasted as `123 456` or `123-456`).
    pub fn parse(raw: &str) -> GatewayResult<Self> {
        let code: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();

        if code.is_empty() {
            return Err(GatewayError::Validation("code is required".to_string()));
        }
        if code.len() > CODE_MAX_LENGTH {
            return Err(GatewayError::Validation("code is malformed".to_string()));
        }

        Ok(Self(code.to_uppercase()))
    }

    pub(crate) fn from_generated(code: String) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Codes never appear in Debug output (logs, panics).
impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OtpCode").field(&"[REDACTED]").finish()
    }
}

/// Operation class a rate limit window counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    SendCode,
    VerifyCode,
}

impl RateLimitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAction::SendCode => "send-code",
            RateLimitAction::VerifyCode => "verify-code",
        }
    }
}

/// Short-lived authorize flow state carried in the signed session cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    pub request_uri: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl FlowState {
    pub fn new(request_uri: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            request_uri: request_uri.into(),
            client_id: client_id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: &Email) -> Self {
        self.email = Some(email.as_str().to_string());
        self
    }
}

/// Identity the upstream PDS knows for an email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub did: String,
    pub handle: Option<String>,
}
