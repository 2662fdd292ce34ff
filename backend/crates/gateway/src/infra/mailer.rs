//! Mailer Implementations

use std::time::Duration;

use serde::Serialize;

use crate::domain::collaborators::Mailer;
use crate::domain::value_objects::{Email, OtpCode};
use crate::error::{GatewayError, GatewayResult};

const SUBJECT: &str = "Your sign-in code";

/// Local dev mailer that logs the code instead of sending it
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    async fn send_otp(&self, email: &Email, code: &OtpCode) -> GatewayResult<()> {
        tracing::info!(to = %email, code = code.as_str(), "OTP mail (not sent)");
        Ok(())
    }
}

#[derive(Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: String,
}

/// Transactional mail API client: one JSON POST per message
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
    code_ttl: Duration,
}

impl HttpMailer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        from: impl Into<String>,
        code_ttl: Duration,
    ) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Internal(format!("mail client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
            from: from.into(),
            code_ttl,
        })
    }
}

fn message_text(code: &OtpCode, ttl: Duration) -> String {
    format!(
        "Your sign-in code is {}.\n\nIt expires in {} minutes. If you did not request it, you can ignore this email.",
        code.as_str(),
        ttl.as_secs().div_ceil(60)
    )
}

impl Mailer for HttpMailer {
    async fn send_otp(&self, email: &Email, code: &OtpCode) -> GatewayResult<()> {
        let body = MailRequest {
            from: &self.from,
            to: email.as_str(),
            subject: SUBJECT,
            text: message_text(code, self.code_ttl),
        };

        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Mail(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Mail(format!(
                "API returned status: {}",
                response.status()
            )));
        }

        tracing::debug!(to = %email.masked(), "OTP mail accepted");
        Ok(())
    }
}

/// Test double capturing every delivered code. Clones share one outbox.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: std::sync::Arc<std::sync::Mutex<Vec<(String, String)>>>,
    fail: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(test)]
impl RecordingMailer {
    /// Make later deliveries return an error
    pub fn fail_deliveries(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_code(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }
}

#[cfg(test)]
impl Mailer for RecordingMailer {
    async fn send_otp(&self, email: &Email, code: &OtpCode) -> GatewayResult<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(GatewayError::Mail("delivery disabled".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((email.as_str().to_string(), code.as_str().to_string()));
        Ok(())
    }
}
