//! Verify Code Use Case
//!
//! On success the caller gets a redirect to the PDS authorize endpoint
//! carrying a fresh callback assertion. Every failure is `GatewayError::Otp`
//! or `RateLimited`; handlers collapse both into one generic body.

use std::sync::Arc;

use chrono::Utc;
use url::Url;

use crate::application::callback_signer::CallbackSigner;
use crate::application::config::GatewayConfig;
use crate::application::otp_service::OtpService;
use crate::application::rate_limiter::RateLimiter;
use crate::domain::collaborators::IdentityResolver;
use crate::domain::repository::{AccountRepository, GatewayRepository};
use crate::domain::value_objects::{Email, FlowState, Identity, OtpCode, RateLimitAction};
use crate::error::{GatewayError, GatewayResult, OtpFailure};

/// Input DTO for verify code
#[derive(Debug, Clone)]
pub struct VerifyCodeInput {
    pub email: String,
    pub code: String,
    /// Flow state from the verified session cookie
    pub state: FlowState,
}

/// Output DTO for verify code
#[derive(Debug, Clone)]
pub struct VerifyCodeOutput {
    pub redirect: String,
    pub identity: Option<Identity>,
}

/// Verify Code Use Case
pub struct VerifyCodeUseCase<R, I>
where
    R: GatewayRepository,
    I: IdentityResolver,
{
    repo: Arc<R>,
    otp: OtpService<R>,
    limiter: RateLimiter<R>,
    resolver: Arc<I>,
    signer: CallbackSigner,
    config: Arc<GatewayConfig>,
}

impl<R, I> VerifyCodeUseCase<R, I>
where
    R: GatewayRepository,
    I: IdentityResolver,
{
    pub fn new(repo: Arc<R>, resolver: Arc<I>, config: Arc<GatewayConfig>) -> Self {
        Self {
            otp: OtpService::new(repo.clone(), config.clone()),
            limiter: RateLimiter::new(repo.clone()),
            signer: CallbackSigner::new(
                config.callback_secret,
                config.issuer.clone(),
                config.pds_url.clone(),
                config.assertion_ttl_secs(),
            ),
            repo,
            resolver,
            config,
        }
    }

    pub async fn execute(&self, input: VerifyCodeInput) -> GatewayResult<VerifyCodeOutput> {
        let email = Email::parse(&input.email)?;
        let code = OtpCode::parse(&input.code)?;

        if !self
            .limiter
            .check(
                email.as_str(),
                RateLimitAction::VerifyCode,
                &self.config.verify_code_email_limit,
            )
            .await?
        {
            return Err(GatewayError::RateLimited);
        }

        // The code must be redeemed in the flow that requested it.
        if input.state.email.as_deref() != Some(email.as_str()) {
            tracing::info!(email = %email.masked(), "Verify email does not match session");
            return Err(GatewayError::Otp(OtpFailure::NoActiveToken));
        }

        self.otp.verify_otp(&email, &code).await?;

        let identity = self.resolve_identity(&email).await;
        let now_secs = Utc::now().timestamp();
        let claims = self
            .signer
            .claims_for(&email, identity.as_ref(), &input.state, now_secs);
        let assertion = self.signer.sign(&claims)?;

        let mut redirect = Url::parse(&self.config.pds_authorize_url())
            .map_err(|e| GatewayError::Internal(format!("PDS authorize URL: {}", e)))?;
        redirect
            .query_pairs_mut()
            .append_pair("request_uri", &input.state.request_uri)
            .append_pair("client_id", &input.state.client_id)
            .append_pair("otp_assertion", &assertion);

        tracing::info!(
            email = %email.masked(),
            jti = %claims.jti,
            linked = identity.is_some(),
            "Issued callback assertion"
        );

        Ok(VerifyCodeOutput {
            redirect: redirect.into(),
            identity,
        })
    }

    /// Known account identity, else ask upstream and link lazily.
    /// Lookup failures never fail the verification.
    async fn resolve_identity(&self, email: &Email) -> Option<Identity> {
        match self.repo.find_by_email(email).await {
            Ok(Some(account)) => {
                if let Some(identity) = account.identity() {
                    return Some(identity);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Account lookup failed");
                return None;
            }
        }

        let identity = match self.resolver.resolve(email).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(email = %email.masked(), error = %e, "Identity resolution failed");
                return None;
            }
        };

        match self.repo.link_identity(email, &identity).await {
            Ok(account) => {
                tracing::info!(account_id = %account.id, did = %identity.did, "Linked account identity");
                account.identity().or(Some(identity))
            }
            Err(e) => {
                tracing::error!(error = %e, "Linking account identity failed");
                Some(identity)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::identity::StaticIdentityResolver;
    use crate::infra::memory::InMemoryGatewayRepository;
    use platform::rate_limit::RateLimitConfig;

    struct Fixture {
        repo: Arc<InMemoryGatewayRepository>,
        config: Arc<GatewayConfig>,
        use_case: VerifyCodeUseCase<InMemoryGatewayRepository, StaticIdentityResolver>,
    }

    fn fixture(config: GatewayConfig, resolver: StaticIdentityResolver) -> Fixture {
        let repo = Arc::new(InMemoryGatewayRepository::new());
        let config = Arc::new(config);
        let use_case = VerifyCodeUseCase::new(repo.clone(), Arc::new(resolver), config.clone());
        Fixture {
            repo,
            config,
            use_case,
        }
    }

    fn state() -> FlowState {
        FlowState::new("urn:req:1", "https://app.example/client.json")
            .with_email(&Email::parse("a@example.com").unwrap())
    }

    fn input(code: &str) -> VerifyCodeInput {
        VerifyCodeInput {
            email: "a@example.com".to_string(),
            code: code.to_string(),
            state: state(),
        }
    }

    async fn issue(f: &Fixture) -> OtpCode {
        OtpService::new(f.repo.clone(), f.config.clone())
            .generate_otp(&Email::parse("a@example.com").unwrap())
            .await
            .unwrap()
            .code
    }

    #[tokio::test]
    async fn test_success_redirects_with_assertion() {
        let f = fixture(GatewayConfig::with_random_secrets(), StaticIdentityResolver::empty());
        let code = issue(&f).await;
        let output = f.use_case.execute(input(code.as_str())).await.unwrap();

        let url = Url::parse(&output.redirect).unwrap();
        assert!(output.redirect.starts_with("http://localhost:2583/oauth/authorize?"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("request_uri".to_string(), "urn:req:1".to_string())));
        let assertion = &pairs.iter().find(|(k, _)| k == "otp_assertion").unwrap().1;

        let signer = CallbackSigner::new(
            f.config.callback_secret,
            f.config.issuer.clone(),
            f.config.pds_url.clone(),
            60,
        );
        let claims = signer.verify(assertion, Utc::now().timestamp()).unwrap();
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.client_id, "https://app.example/client.json");
    }

    #[tokio::test]
    async fn test_identity_is_resolved_and_linked() {
        let identity = Identity {
            did: "did:plc:alice".to_string(),
            handle: Some("alice.test".to_string()),
        };
        let f = fixture(
            GatewayConfig::with_random_secrets(),
            StaticIdentityResolver::with("a@example.com", identity.clone()),
        );
        let code = issue(&f).await;
        let output = f.use_case.execute(input(code.as_str())).await.unwrap();
        assert_eq!(output.identity, Some(identity.clone()));

        let account = f
            .repo
            .find_by_email(&Email::parse("a@example.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.identity(), Some(identity));
    }

    #[tokio::test]
    async fn test_wrong_code_fails() {
        let f = fixture(GatewayConfig::with_random_secrets(), StaticIdentityResolver::empty());
        let code = issue(&f).await;
        let wrong = if code.as_str() == "000000" { "111111" } else { "000000" };
        assert!(matches!(
            f.use_case.execute(input(wrong)).await,
            Err(GatewayError::Otp(OtpFailure::Mismatch))
        ));
    }

    #[tokio::test]
    async fn test_session_email_must_match() {
        let f = fixture(GatewayConfig::with_random_secrets(), StaticIdentityResolver::empty());
        let code = issue(&f).await;
        let mut input = input(code.as_str());
        input.state = FlowState::new("urn:req:1", "client");
        assert!(matches!(
            f.use_case.execute(input).await,
            Err(GatewayError::Otp(OtpFailure::NoActiveToken))
        ));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let config = GatewayConfig {
            verify_code_email_limit: RateLimitConfig::new(1, 900),
            ..GatewayConfig::with_random_secrets()
        };
        let f = fixture(config, StaticIdentityResolver::empty());
        let code = issue(&f).await;
        let _ = f.use_case.execute(input("999999")).await;
        assert!(matches!(
            f.use_case.execute(input(code.as_str())).await,
            Err(GatewayError::RateLimited)
        ));
    }
}
